use axum::{
    Json,
    extract::State,
    http::{Extensions, HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use crate::error::{ApiError, FetchError};
use crate::handlers::CHAT_ROUTE;
use crate::handlers::limit::{self, Admission};
use crate::metrics::REQUEST_TOTAL;
use crate::models::{
    ChatRequest, ChatResponse, CompletionMessage, CompletionRequest, CompletionResponse,
};
use crate::state::{AppState, ChatUpstream};

const SYSTEM_PROMPT: &str =
    "You are the assistant on a personal portfolio site. Answer questions about the site owner's \
     experience, skills and projects briefly and politely.";

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(payload): Json<ChatRequest>,
) -> Response {
    REQUEST_TOTAL.with_label_values(&[CHAT_ROUTE]).inc();

    let ip = limit::client_ip(&headers, &extensions);
    if let Admission::Rejected(decision) =
        limit::admit(&state, &ip, CHAT_ROUTE, &state.limits.chat)
    {
        let retry_ms = decision.retry_after(Utc::now()).as_millis() as u64;
        let body = serde_json::json!({
            "error": "Too many messages. Please slow down and try again shortly.",
            "retryAfter": retry_ms,
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from(limit::retry_after_secs(&decision)),
        );
        return (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response();
    }

    match answer(&state, &payload).await {
        Ok(reply) => Json(ChatResponse { reply }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn answer(state: &AppState, payload: &ChatRequest) -> Result<String, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let upstream = state.chat.as_ref().ok_or(ApiError::Unavailable)?;

    let start = Instant::now();
    let reply = complete(&state.client, upstream, payload.message.trim())
        .await
        .map_err(ApiError::Upstream)?;
    debug!(latency_ms = start.elapsed().as_millis() as u64, "chat completion");
    Ok(reply)
}

// OpenAI-compatible chat completions call
async fn complete(
    client: &reqwest::Client,
    upstream: &ChatUpstream,
    message: &str,
) -> Result<String, FetchError> {
    let url = format!(
        "{}/v1/chat/completions",
        upstream.base_url.trim_end_matches('/')
    );
    let body = CompletionRequest {
        model: &upstream.model,
        messages: vec![
            CompletionMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            CompletionMessage {
                role: "user",
                content: message,
            },
        ],
    };

    let mut req = client.post(&url).json(&body);
    if let Some(key) = &upstream.api_key {
        req = req.bearer_auth(key);
    }
    let res = req.send().await?;
    let status = res.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url,
            status: status.as_u16(),
        });
    }

    let completion = res
        .json::<CompletionResponse>()
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))?;
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| FetchError::Decode("completion had no choices".to_string()))
}
