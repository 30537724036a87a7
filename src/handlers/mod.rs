mod chat;
mod contact;
mod health;
pub mod limit;
mod metrics;
mod projects;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use crate::state::AppState;

pub use chat::chat_handler;
pub use contact::contact_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use projects::{list_projects_handler, project_handler};

pub const CONTACT_ROUTE: &str = "/api/contact";
pub const CHAT_ROUTE: &str = "/api/chat";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/projects", get(list_projects_handler))
        .route("/api/projects/{slug}", get(project_handler))
        .route(CONTACT_ROUTE, post(contact_handler))
        .route(CHAT_ROUTE, post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
