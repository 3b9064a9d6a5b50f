use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Html;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::errors::ApiError;
use super::validation::{AskRequest, ValidQuestion};
use crate::rag::{Answer, AnswerPipeline, RebuildReport};

/// Page served at `/` when `static/index.html` does not exist
pub const DEFAULT_INDEX_HTML: &str = include_str!("index.html");

#[inline]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[inline]
pub async fn ask(
    State(pipeline): State<Arc<AnswerPipeline>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let valid = ValidQuestion::try_from(request)?;

    debug!(
        "Question received ({} chars, top_k = {:?})",
        valid.question.chars().count(),
        valid.top_k
    );
    let answer = pipeline
        .answer_question(&valid.question, valid.top_k)
        .await?;
    Ok(Json(answer))
}

#[inline]
pub async fn rebuild(
    State(pipeline): State<Arc<AnswerPipeline>>,
) -> Result<Json<RebuildReport>, ApiError> {
    let report = pipeline.rebuild_index().await?;
    info!(
        "Rebuild finished: {} documents, {} chunks",
        report.documents, report.chunks
    );
    Ok(Json(report))
}

#[inline]
pub async fn index(State(pipeline): State<Arc<AnswerPipeline>>) -> Html<String> {
    let page = pipeline.config().static_path().join("index.html");
    if tokio::fs::try_exists(&page).await.unwrap_or(false) {
        match tokio::fs::read_to_string(&page).await {
            Ok(html) => return Html(html),
            Err(e) => warn!("Failed to read {}: {}", page.display(), e),
        }
    }
    Html(DEFAULT_INDEX_HTML.to_string())
}
