// src/saml/mod.rs
//! SAML message handling: XML tree, signatures, wire bindings and the
//! builders for queries and responses.

pub mod codec;
pub mod query_builder;
pub mod response_builder;
pub mod signature;
pub mod xml;

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats an instant the way it appears in SAML messages (UTC, milliseconds).
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an `xs:dateTime` value.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|instant| instant.with_timezone(&Utc))
}

/// Drops sub-millisecond precision so an instant survives a trip through
/// [`format_instant`] and [`parse_instant`] unchanged.
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_instant_format() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_instant(instant), "2024-05-01T12:00:00.000Z");
        assert_eq!(parse_instant("2024-05-01T14:00:00+02:00"), Some(instant));
        assert_eq!(parse_instant("yesterday"), None);
    }

    #[test]
    fn test_truncated_instant_survives_formatting() {
        let now = truncate_to_millis(Utc::now());
        assert_eq!(parse_instant(&format_instant(now)), Some(now));
    }
}
