use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod chat;
pub mod doc;
pub mod generation;
pub mod health;
pub mod memofiches;
pub mod newsletter;
pub mod params;
pub mod progress;
pub mod users;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/memofiches", memofiches::router())
        .nest("/progress", progress::router())
        .nest("/generate", generation::router())
        .nest("/chat", chat::router())
        .nest("/newsletter", newsletter::router())
        .nest("/admin", admin::router())
}
