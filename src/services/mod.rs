// src/services/mod.rs
pub mod api_server;
pub mod attribute_service;
pub mod query_sender;
pub mod verifier;
