use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "portfolio-site")]
#[command(about = "API server for the portfolio site: projects, contact form and chat")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    // Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    // Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Fetch and print projects from a running server
    Projects(ProjectsArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Directory holding the project markdown files
    #[arg(long, env = "CONTENT_DIR", default_value = "content/projects")]
    pub content_dir: PathBuf,

    // Seconds between rate limiter sweeps
    #[arg(long, default_value_t = 60)]
    pub sweep_interval_secs: u64,

    // Contact form: max submissions per window
    #[arg(long, default_value_t = 3)]
    pub contact_max: u32,

    // Contact form window in seconds
    #[arg(long, default_value_t = 900)]
    pub contact_window_secs: u64,

    // Chat: max messages per window
    #[arg(long, default_value_t = 10)]
    pub chat_max: u32,

    // Chat window in seconds
    #[arg(long, default_value_t = 60)]
    pub chat_window_secs: u64,

    // OpenAI-compatible base URL for chat completions
    #[arg(long, env = "CHAT_UPSTREAM")]
    pub chat_upstream: Option<String>,

    #[arg(long, env = "CHAT_API_KEY", hide_env_values = true)]
    pub chat_api_key: Option<String>,

    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub chat_model: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ProjectsArgs {
    // Base URL of a running server
    #[arg(long, default_value = "http://localhost:8080")]
    pub base_url: String,

    // Only featured projects
    #[arg(long, default_value_t = false)]
    pub featured: bool,

    // Cache TTL in seconds
    #[arg(long, default_value_t = 300)]
    pub cache_ttl_secs: u64,

    // Maximum number of cached responses
    #[arg(long, default_value_t = 256)]
    pub cache_capacity: usize,
}

impl ServeArgs {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn route_limits(&self) -> RouteLimits {
        RouteLimits {
            contact: RateLimitConfig::new(
                Duration::from_secs(self.contact_window_secs),
                self.contact_max,
            ),
            chat: RateLimitConfig::new(Duration::from_secs(self.chat_window_secs), self.chat_max),
        }
    }
}

/// Quotas for the rate-limited routes.
#[derive(Debug, Clone, Copy)]
pub struct RouteLimits {
    pub contact: RateLimitConfig,
    pub chat: RateLimitConfig,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            contact: RateLimitConfig::contact(),
            chat: RateLimitConfig::chat(),
        }
    }
}
