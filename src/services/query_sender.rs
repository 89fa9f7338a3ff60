// src/services/query_sender.rs
//! Test client: sends an extended attribute query to an authority and reads
//! back what it answered.

use crate::config::Binding;
use crate::models::attribute::AttributeSpec;
use crate::saml::codec::{decode_response, encode_query, ParsedResponse};
use crate::saml::query_builder::QueryBuilder;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;

/// What came back for one query.
#[derive(Debug)]
pub struct SendOutcome {
    pub http_status: u16,
    /// Decoded SAML response, if the body held one
    pub response: Option<ParsedResponse>,
    pub body: String,
}

pub struct QuerySender {
    client: reqwest::Client,
    url: String,
    binding: Binding,
    builder: QueryBuilder,
}

impl QuerySender {
    pub fn new(url: impl Into<String>, binding: Binding, builder: QueryBuilder) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            binding,
            builder,
        }
    }

    /// Builds, signs and posts one query.
    ///
    /// # Arguments
    /// * `subject_id` - Subject the attributes are requested for
    /// * `attributes` - Requested attributes
    /// * `embed_assertion` - Whether to include an authentication assertion
    ///
    /// # Returns
    /// The HTTP status and, when the body could be decoded, the response.
    /// Transport failures are errors.
    pub async fn send(
        &self,
        subject_id: &str,
        attributes: &[AttributeSpec],
        embed_assertion: bool,
    ) -> anyhow::Result<SendOutcome> {
        let query = self
            .builder
            .build(subject_id, attributes, embed_assertion, Utc::now())?;
        let payload = encode_query(&query, self.binding)?;
        debug!("Sending query:\n{}", payload.body);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, payload.content_type)
            .body(payload.body)
            .send()
            .await?;
        let http_status = response.status().as_u16();
        let body = response.text().await?;
        info!("Authority at {} answered with HTTP {}", self.url, http_status);

        // rejections are always SOAP, whatever the binding
        let binding = if http_status == 200 { self.binding } else { Binding::Soap };
        let decoded = if http_status == 500 {
            warn!("Authority reported a failure: {}", body.trim());
            None
        } else {
            match decode_response(body.as_bytes(), binding) {
                Ok(parsed) => {
                    info!("Response status: {:?}", parsed.response.status_codes());
                    Some(parsed)
                }
                Err(e) => {
                    warn!("Cannot decode response: {}", e);
                    None
                }
            }
        };

        Ok(SendOutcome {
            http_status,
            response: decoded,
            body,
        })
    }
}
