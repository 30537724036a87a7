use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "portfolio_requests_total",
        "Total number of API requests",
        &["route"]
    )
    .unwrap();
    pub static ref RATE_LIMITED_TOTAL: CounterVec = register_counter_vec!(
        "portfolio_rate_limited_total",
        "Requests rejected by the rate limiter",
        &["route"]
    )
    .unwrap();
    pub static ref LIMITER_FAIL_OPEN: Counter = register_counter!(
        "portfolio_rate_limiter_fail_open_total",
        "Requests admitted because the rate limiter was unavailable"
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("portfolio_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("portfolio_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("portfolio_cache_size", "Current number of items in cache").unwrap();
    pub static ref DEDUP_JOINS: Counter = register_counter!(
        "portfolio_dedup_joins_total",
        "Callers that joined an in-flight request instead of issuing their own"
    )
    .unwrap();
}

/// Render every registered metric in the text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
