use axum::{debug_handler, extract::State, Json};

use crate::hub::{Hub, HubSnapshot};

#[debug_handler(state = crate::AppState)]
pub async fn stats(State(hub): State<Hub>) -> Json<HubSnapshot> {
    Json(hub.snapshot())
}

#[debug_handler]
pub async fn health() -> &'static str {
    "ok"
}
