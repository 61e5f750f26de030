//! Bearer / `X-API-Key` auth middleware, keyed off the `API_KEY`
//! environment variable (via [`crate::config::ServerConfig`]) rather
//! than a generated token file — there is no local daemon token to
//! bootstrap here, only a single shared secret the operator sets.
//! When `API_KEY` is unset, auth is disabled entirely.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

use super::ApiState;

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        return Some(v.to_owned());
    }
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Returns the rate-limiter bucket key for this request: `"key:<token>"`
/// when authenticated, `"ip:<host>"` otherwise.
pub fn bucket_key(headers: &HeaderMap, remote_ip: &str) -> String {
    match extract_token(headers) {
        Some(token) => format!("key:{token}"),
        None => format!("ip:{remote_ip}"),
    }
}

pub async fn auth_middleware(
    State(state): State<ApiState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match &state.config.server.api_key {
        None => Ok(next.run(request).await),
        Some(expected) => match extract_token(&headers) {
            Some(token) if &token == expected => Ok(next.run(request).await),
            _ => Err(ApiError::Unauthorized),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn extracts_x_api_key_header() {
        let h = headers_with("X-API-Key", "secret");
        assert_eq!(extract_token(&h), Some("secret".to_owned()));
    }

    #[test]
    fn extracts_bearer_token() {
        let h = headers_with("Authorization", "Bearer secret");
        assert_eq!(extract_token(&h), Some("secret".to_owned()));
    }

    #[test]
    fn bucket_key_falls_back_to_ip_when_unauthenticated() {
        let h = HeaderMap::new();
        assert_eq!(bucket_key(&h, "10.0.0.1"), "ip:10.0.0.1");
    }

    #[test]
    fn bucket_key_prefers_token_when_present() {
        let h = headers_with("X-API-Key", "secret");
        assert_eq!(bucket_key(&h, "10.0.0.1"), "key:secret");
    }
}
