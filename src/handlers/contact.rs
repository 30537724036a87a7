use axum::{
    Json,
    extract::State,
    http::{Extensions, HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;
use crate::handlers::limit::{self, Admission};
use crate::handlers::CONTACT_ROUTE;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{ContactRequest, ContactResponse};
use crate::state::AppState;

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(payload): Json<ContactRequest>,
) -> Response {
    REQUEST_TOTAL.with_label_values(&[CONTACT_ROUTE]).inc();

    let ip = limit::client_ip(&headers, &extensions);
    let decision = match limit::admit(&state, &ip, CONTACT_ROUTE, &state.limits.contact) {
        Admission::Admitted(decision) => decision,
        Admission::Rejected(decision) => {
            let retry_secs = limit::retry_after_secs(&decision);
            let mut headers = limit::rate_limit_headers(&decision);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
            let minutes = retry_secs.div_ceil(60);
            let body = serde_json::json!({
                "error": format!(
                    "Too many messages. Please try again in {minutes} minute{}.",
                    if minutes == 1 { "" } else { "s" }
                ),
            });
            return (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response();
        }
    };

    let headers = decision
        .as_ref()
        .map(limit::rate_limit_headers)
        .unwrap_or_default();

    // bots get the same answer as people, their message just goes nowhere
    if payload.is_spam() {
        info!(client = %limit::fingerprint(&ip), "honeypot triggered, dropping submission");
        return (StatusCode::OK, headers, Json(ContactResponse { success: true })).into_response();
    }

    if let Err(message) = payload.validate() {
        let body = serde_json::json!({ "error": message });
        return (StatusCode::BAD_REQUEST, headers, Json(body)).into_response();
    }

    info!(
        client = %limit::fingerprint(&ip),
        name = %payload.name,
        email = %payload.email,
        chars = payload.message.chars().count(),
        "contact submission received"
    );

    (StatusCode::OK, headers, Json(ContactResponse { success: true })).into_response()
}
