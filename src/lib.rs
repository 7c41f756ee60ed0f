pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod logging;
pub mod state;
pub mod users;

pub use error::AppError;
pub use state::AppState;
