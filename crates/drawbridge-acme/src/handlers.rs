//! HTTP routes answering HTTP-01 probes

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::debug;

use crate::challenge::Http01Challenge;
use crate::validation::canonical_domain;

/// Routes serving `/.well-known/acme-challenge/{token}`.
///
/// Mount them on the plain-HTTP listener named in the challenge
/// configuration; the CA always probes port 80.
pub fn routes(challenge: Arc<Http01Challenge>) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(serve_challenge))
        .with_state(challenge)
}

async fn serve_challenge(
    State(challenge): State<Arc<Http01Challenge>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let host = match headers.get(HOST).and_then(|value| value.to_str().ok()) {
        Some(value) => canonical_domain(strip_port(value)),
        None => return (StatusCode::BAD_REQUEST, String::new()),
    };

    match challenge.key_authorization(&token, &host).await {
        Ok(key_auth) => {
            debug!("Answering HTTP-01 probe for {}", host);
            (StatusCode::OK, key_auth)
        }
        Err(err) => {
            debug!("HTTP-01 probe for {} has no answer: {}", host, err);
            (StatusCode::NOT_FOUND, String::new())
        }
    }
}

/// Drops a numeric `:port` suffix from a Host header value. Bracketed
/// IPv6 literals keep their brackets.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
