pub mod b64;
pub mod backend;
pub mod bridge;
pub mod chat;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod mqtt;
pub mod presence;
pub mod tenant;
pub mod upload;
pub mod ws;

use axum::{
    http::{header, HeaderName, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use gateway::{Collaborators, Gateway};

/// Build the HTTP router: a health probe and the websocket endpoint.
pub fn create_router(gateway: Arc<Gateway>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-site"),
        ]);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ws", get(ws::handler::ws_handler))
        .with_state(gateway)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
