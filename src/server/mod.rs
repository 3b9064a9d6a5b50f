// Server module
// HTTP API and the bundled question page


pub mod errors;
pub mod handlers;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::Result;
use crate::rag::AnswerPipeline;

pub use errors::ApiError;
pub use validation::{AskRequest, ValidQuestion};

/// All routes, with `/static` mounted only when `<base_dir>/static` exists
#[inline]
pub fn router(pipeline: Arc<AnswerPipeline>) -> Router {
    let static_dir = pipeline.config().static_path();

    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/ask", post(handlers::ask))
        .route("/api/rebuild", post(handlers::rebuild));

    if static_dir.is_dir() {
        info!("Serving static files from {}", static_dir.display());
        app = app.nest_service("/static", ServeDir::new(static_dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(pipeline)
}

/// Bind `address` and serve until Ctrl-C
#[inline]
pub async fn serve(pipeline: Arc<AnswerPipeline>, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address).await?;
    let local = listener.local_addr()?;

    info!("Knowledge base Q&A listening on http://{}", local);
    info!("Health check: http://{}/health", local);
    info!("Press Ctrl+C to stop the server");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
