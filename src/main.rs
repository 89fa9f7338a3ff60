// src/main.rs

//! # Attribute Authority - Main Entry Point
//!
//! Loads configuration, assembles the attribute pipeline and starts the
//! HTTP server.
//!
//! ## Environment
//! - `AA_CONFIG`: configuration file (default `aa.toml`)
//! - `AA__<SECTION>__<KEY>`: overrides for single settings
//! - `RUST_LOG`: log filter (default `info`)

use attribute_authority::config::Settings;
use attribute_authority::services::api_server::ApiServer;
use attribute_authority::services::attribute_service::AttributeService;
use log::info;
use std::net::SocketAddr;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load configuration
/// 2. Load credentials and connect the backends
/// 3. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load()?;
    let service = AttributeService::from_settings(&settings)?;
    let addr: SocketAddr = settings.server.bind_address.parse()?;

    info!("Starting Attribute Authority {}", settings.saml.issuer);
    ApiServer::new(service).run(addr).await
}
