// src/directory/ldap.rs
//! LDAP-backed directory.
//!
//! One connection is shared by all requests. Before each lookup the
//! connection is checked and, if it was never opened or has dropped, it is
//! reopened and bound again. Only that check-and-reconnect step holds the
//! lock; searches run on a clone of the multiplexed handle, so concurrent
//! requests do not queue behind each other.

use crate::config::LdapSettings;
use crate::directory::{Directory, DirectoryError};
use async_trait::async_trait;
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct LdapDirectory {
    settings: LdapSettings,
    connection: Mutex<Option<Ldap>>,
}

impl LdapDirectory {
    /// Creates the directory. No connection is made until the first lookup.
    pub fn new(settings: LdapSettings) -> Self {
        Self {
            settings,
            connection: Mutex::new(None),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    /// Returns a live handle, reconnecting when needed.
    async fn ensure_connected(&self) -> Result<Ldap, DirectoryError> {
        reuse_or_connect(&self.connection, &self.settings.url, Ldap::is_closed, || {
            self.connect()
        })
        .await
    }

    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        debug!("Connecting to LDAP server at {}", self.settings.url);
        let conn_settings = LdapConnSettings::new().set_conn_timeout(self.timeout());
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.settings.url)
            .await
            .map_err(|e| {
                DirectoryError::Backend(format!("cannot connect to {}: {}", self.settings.url, e))
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {}", e);
            }
        });

        ldap.with_timeout(self.timeout())
            .simple_bind(&self.settings.bind_dn, &self.settings.bind_password)
            .await
            .and_then(|result| result.success())
            .map_err(|e| {
                DirectoryError::Backend(format!("bind as {} failed: {}", self.settings.bind_dn, e))
            })?;

        info!("LDAP connection to {} established", self.settings.url);
        Ok(ldap)
    }

    fn search_filter(&self, subject_id: &str) -> String {
        self.settings
            .filter
            .replace("%s", &ldap_escape(subject_id))
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn fetch_attributes(
        &self,
        subject_id: &str,
        names: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError> {
        let mut ldap = self.ensure_connected().await?;
        let filter = self.search_filter(subject_id);
        debug!("Searching {} for {}", self.settings.base_dn, filter);

        let (entries, _) = ldap
            .with_timeout(self.timeout())
            .search(&self.settings.base_dn, Scope::Subtree, &filter, names.to_vec())
            .await
            .and_then(|result| result.success())
            .map_err(|e| DirectoryError::Backend(format!("search for {} failed: {}", filter, e)))?;

        let entry = entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .ok_or_else(|| DirectoryError::SubjectNotFound(subject_id.to_string()))?;

        Ok(values_for(&entry.attrs, names))
    }
}

/// Hands out a clone of the handle in `slot`, opening a new one when the
/// slot is empty or `is_closed` says the handle has dropped.
///
/// Concurrent callers wait on the lock, so a dropped connection is
/// reopened once rather than by every request that notices it. A failed
/// attempt leaves the slot as it was and the next caller tries again.
async fn reuse_or_connect<C, F, Fut>(
    slot: &Mutex<Option<C>>,
    target: &str,
    is_closed: impl Fn(&mut C) -> bool,
    connect: F,
) -> Result<C, DirectoryError>
where
    C: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<C, DirectoryError>>,
{
    let mut guard = slot.lock().await;
    if let Some(handle) = guard.as_mut() {
        if !is_closed(handle) {
            return Ok(handle.clone());
        }
        warn!("LDAP connection to {} was closed, reconnecting", target);
    }

    let handle = connect().await?;
    *guard = Some(handle.clone());
    Ok(handle)
}

/// Picks the first value of each requested attribute.
///
/// Servers may return attribute names in a different case than requested.
fn values_for(attrs: &HashMap<String, Vec<String>>, names: &[String]) -> HashMap<String, String> {
    names
        .iter()
        .map(|name| {
            let value = attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .and_then(|(_, values)| values.first().cloned())
                .unwrap_or_default();
            (name.clone(), value)
        })
        .collect()
}
