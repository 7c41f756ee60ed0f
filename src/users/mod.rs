use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod memory;
pub mod model;
pub mod repo;

pub use model::{Role, User};
pub use repo::UserStore;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
