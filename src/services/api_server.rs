// src/services/api_server.rs
//! HTTP front end of the Attribute Authority.
//!
//! Endpoints:
//! - `GET /` - informational page
//! - `POST /` - attribute query in the configured binding
//!
//! Status mapping for `POST`:
//! - 200 with the signed attribute response
//! - 400 with a signed status response (SOAP)
//! - 500 with a plain-text diagnostic when the directory is unavailable or
//!   no signed response could be produced

use crate::error::ServiceError;
use crate::services::attribute_service::{AttributeService, Reply};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;

const INFO_PAGE: &str = "<!DOCTYPE html>\n\
<html>\n\
<head><title>Attribute Authority</title></head>\n\
<body>\n\
<h1>Welcome to the Attribute Authority!</h1>\n\
<p>This service is up and running, accepting attribute requests via HTTP POST.</p>\n\
</body>\n\
</html>\n";

/// API server state containing the attribute pipeline
#[derive(Clone)]
pub struct ApiServer {
    /// Pipeline answering attribute queries
    service: Arc<AttributeService>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `service` - Fully assembled attribute pipeline
    pub fn new(service: AttributeService) -> Self {
        ApiServer {
            service: Arc::new(service),
        }
    }

    /// Builds the router serving both endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::info_handler).post(Self::query_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves requests until the process stops
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind
    ///
    /// # Errors
    /// Returns `Err` if the address cannot be bound or the server fails
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Attribute Authority listening on http://{}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Informational page
    ///
    /// # Endpoint
    /// GET /
    async fn info_handler() -> Html<&'static str> {
        Html(INFO_PAGE)
    }

    /// Answers one attribute query
    ///
    /// # Endpoint
    /// POST /
    ///
    /// # Request Body
    /// SOAP envelope or `SAMLRequest` form, per the configured binding
    ///
    /// # Responses
    /// - 200 OK: signed attribute response
    /// - 400 Bad Request: signed status response
    /// - 500 Internal Server Error: plain-text diagnostic
    async fn query_handler(State(state): State<Arc<ApiServer>>, body: Bytes) -> Response {
        let received_at = Utc::now();
        match state.service.handle(&body, received_at).await {
            Ok(Reply::Success(payload)) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, payload.content_type)],
                payload.body,
            )
                .into_response(),
            Ok(Reply::Rejected(payload)) => (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, payload.content_type)],
                payload.body,
            )
                .into_response(),
            Err(e) => {
                error!("Attribute query failed: {}", e);
                let message = match &e {
                    ServiceError::BackendUnavailable(_) => {
                        "Error while fetching attributes from the directory"
                    }
                    ServiceError::ResponseConstruction(_) => "Error while building the response",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    format!("{}: {}\n", message, e),
                )
                    .into_response()
            }
        }
    }
}
