// src/bin/query_sender.rs

//! Sends one extended attribute query and prints the answer.
//!
//! Usage: `query-sender [URL]`. Everything else comes from the
//! `query_sender` section of the configuration; the URL argument overrides
//! `query_sender.url`.

use anyhow::Context;
use attribute_authority::config::Settings;
use attribute_authority::credentials::KeyStore;
use attribute_authority::models::response::Response;
use attribute_authority::saml::query_builder::QueryBuilder;
use attribute_authority::services::query_sender::QuerySender;
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load()?;
    let sender_settings = &settings.query_sender;
    let url = std::env::args()
        .nth(1)
        .or_else(|| sender_settings.url.clone())
        .context("no authority URL: pass one as argument or set query_sender.url")?;

    let credentials = Arc::new(KeyStore::from_settings(&settings.credentials)?);
    let builder = QueryBuilder::new(&settings.saml, sender_settings, credentials);
    let sender = QuerySender::new(url, sender_settings.binding, builder);

    let attributes = sender_settings.attribute_specs()?;
    let outcome = sender
        .send(
            &sender_settings.subject_id,
            &attributes,
            sender_settings.embed_assertion,
        )
        .await?;

    match outcome.response.as_ref().map(|parsed| &parsed.response) {
        Some(Response::Attributes(response)) => {
            for attribute in &response.attributes {
                info!("{}", attribute);
            }
        }
        Some(Response::Status(outcome)) => info!("Status: {:?}", outcome.status_codes),
        None => info!("Body:\n{}", outcome.body),
    }
    Ok(())
}
