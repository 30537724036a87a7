use std::sync::Arc;
use crate::config::RouteLimits;
use crate::content::ContentLoader;
use crate::rate_limit::RateLimiter;

/// Chat completion backend settings.
#[derive(Clone, Debug)]
pub struct ChatUpstream {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

// app's shared state, built once at startup and handed to every handler
pub struct AppState {
    pub client: reqwest::Client,
    pub limiter: Arc<RateLimiter>,
    pub limits: RouteLimits,
    pub content: ContentLoader,
    pub chat: Option<ChatUpstream>,
}
