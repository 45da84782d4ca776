mod stats;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
        .route("/stats", get(stats::stats))
        .route("/health", get(stats::health))
}
