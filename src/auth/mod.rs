use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod cookies;
pub mod credentials;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod store;

pub use extractors::AuthUser;
pub use repo_types::PublicUser;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::user_routes())
}
