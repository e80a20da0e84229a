use axum::{extract::State, routing::post, Json, Router};
use volt_schema::{ChatReply, ChatRequest};

use crate::error::{parse_json_body, ApiError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/ask", post(chat))
}

async fn chat(State(state): State<AppState>, body: String) -> Result<Json<ChatReply>, ApiError> {
    relay_chat(&state, &body).await
}

/// Shared by `/chat`, `/ask` and `POST /conversations?action=chat`.
pub(crate) async fn relay_chat(state: &AppState, body: &str) -> Result<Json<ChatReply>, ApiError> {
    let request: ChatRequest = parse_json_body(body)?;
    let reply = state.relay.reply(request).await?;
    tracing::info!(status = ?reply.status, model = %reply.model, "chat reply");
    Ok(Json(reply))
}
