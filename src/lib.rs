//! Backend for a personal portfolio site.
//!
//! - fixed-window rate limiting for the contact and chat endpoints
//! - a TTL response cache with in-flight request deduplication and batching
//! - a markdown + frontmatter loader for project pages
//! - the axum routes tying them together

pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod worker;

pub use cache::ResponseCache;
pub use content::{ContentLoader, Project, ProjectRecord};
pub use error::{ApiError, FetchError, LimiterError};
pub use fetch::{FetchOptions, HttpTransport, RequestClient, Transport};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use worker::BatchProcessor;
