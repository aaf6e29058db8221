//! HTTP shell over one [`Session`]. Mirrors the UI actions: add, remove,
//! clear, pan/zoom, and read back the whole state.

mod handlers;
mod state;

use axum::routing::{delete, get, put};
use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::Session;

pub fn build_router(session: Session) -> Router {
    let state = Arc::new(AppState { session });

    Router::new()
        .route("/api/state", get(handlers::session_state))
        .route("/api/cities", delete(handlers::clear_cities).post(handlers::add_city))
        .route("/api/cities/{name}", delete(handlers::remove_city))
        .route("/api/viewport", put(handlers::set_viewport))
        .route("/api/builtin-cities", get(handlers::builtin_cities))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(session: Session, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(session);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "meetpoint server listening");
    eprintln!("  Meetpoint server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}
