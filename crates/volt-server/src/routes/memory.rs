use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use volt_schema::SaveConversationRequest;

use crate::error::{parse_json_body, ApiError};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MemoryQuery {
    #[serde(default)]
    pub action: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/memory", get(read_memory).post(save_memory))
}

async fn read_memory(
    State(state): State<AppState>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let action = query
        .action
        .as_deref()
        .filter(|a| !a.is_empty())
        .unwrap_or("list");

    let data = match action {
        "latest-context" => {
            let latest = state.memory.fetch_latest_context().await?;
            json!(latest)
        }
        "list" => {
            let entries = state.memory.list_entries().await?;
            json!(entries)
        }
        "generate-context" => {
            let context = state.memory.generate_context().await?;
            json!({ "context": context })
        }
        other => return Err(ApiError::BadRequest(format!("Unknown action: {other}"))),
    };

    Ok(Json(json!({ "status": "success", "data": data })))
}

async fn save_memory(State(state): State<AppState>, body: String) -> Result<Json<Value>, ApiError> {
    let value: Value = parse_json_body(&body)?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or("undefined");

    let ack = match kind {
        "context" => {
            let content = value.get("content").and_then(Value::as_str).unwrap_or_default();
            state.memory.save_context(content).await?
        }
        "conversation" => {
            let request: SaveConversationRequest = serde_json::from_value(value.clone())
                .map_err(|e| ApiError::BadRequest(format!("Invalid conversation: {e}")))?;
            state.memory.save_conversation(request).await?
        }
        other => return Err(ApiError::BadRequest(format!("Unknown type: {other}"))),
    };

    Ok(Json(json!({
        "status": "success",
        "message": "Saved successfully",
        "data": ack,
    })))
}
