use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use volt_core::{decode, Normalizer};

use crate::error::ApiError;
use crate::routes::chat::relay_chat;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConversationsQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/conversations",
        get(read_conversations).post(post_conversations),
    )
}

async fn read_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<Value>, ApiError> {
    let library = state.conversations.load().await;

    if let Some(id) = query.id.as_deref().filter(|id| !id.trim().is_empty()) {
        let thread = library.find(id).ok_or(ApiError::NotFound)?;
        return Ok(Json(json!({ "ok": true, "thread": thread })));
    }

    let summaries = library.summaries(query.q.as_deref().unwrap_or_default());
    let body = if library.is_sample() {
        json!({ "ok": true, "sample": true, "conversations": summaries })
    } else {
        json!({ "ok": true, "conversations": summaries })
    };
    Ok(Json(body))
}

async fn post_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
    body: String,
) -> Result<Response, ApiError> {
    match query.action.as_deref().unwrap_or("chat") {
        "chat" => Ok(relay_chat(&state, &body).await?.into_response()),
        "normalize" => {
            let decoded = decode(&body)?;
            let normalized = Normalizer::new().normalize_decoded(&decoded);
            tracing::info!(
                shape = normalized.shape.as_str(),
                count = normalized.conversations.len(),
                "normalized upload"
            );
            Ok(Json(json!({
                "ok": true,
                "shape": normalized.shape,
                "conversations": normalized.conversations,
            }))
            .into_response())
        }
        other => Err(ApiError::BadRequest(format!("Unknown action: {other}"))),
    }
}
