pub mod chat;
pub mod conversations;
pub mod memory;
pub mod ping;

use axum::Router;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(chat::router())
        .merge(conversations::router())
        .merge(memory::router())
        .merge(ping::router())
}
