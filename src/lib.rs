pub mod config;
pub mod event;
pub mod hub;
pub mod rooms;

use axum::{extract::FromRef, http::Method, Router};
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};

use crate::hub::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Hub,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .merge(rooms::router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
