use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use volt_schema::iso_timestamp;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Pong {
    pub ok: bool,
    pub msg: &'static str,
    pub time: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ping", get(ping))
}

async fn ping() -> Json<Pong> {
    Json(Pong {
        ok: true,
        msg: "pong",
        time: iso_timestamp(Utc::now()),
    })
}
