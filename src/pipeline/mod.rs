use crate::config::AppConfig;
use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod services;

pub fn router(config: &AppConfig) -> Router<AppState> {
    Router::new().merge(handlers::write_routes(config))
}
