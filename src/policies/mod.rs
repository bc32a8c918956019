use crate::state::AppState;
use axum::Router;

pub mod cache;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
