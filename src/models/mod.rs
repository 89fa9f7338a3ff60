// src/models/mod.rs
pub mod attribute;
pub mod query;
pub mod response;
