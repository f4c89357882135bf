use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::ApiConfig;

#[derive(Clone)]
pub struct AuthState {
    pub config: ApiConfig,
}

pub fn create_auth_state(config: ApiConfig) -> Arc<AuthState> {
    Arc::new(AuthState { config })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response()
}

/// Every request carries either an `x-api-key` header or a `Bearer` token
/// in `Authorization`, checked against the configured key in constant time.
/// CORS preflight (`OPTIONS`) is let through unauthenticated so browsers can
/// complete the preflight handshake.
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();

    let provided_key = if let Some(header_value) = headers.get("x-api-key") {
        header_value.to_str().map_err(|_| unauthorized())?
    } else if let Some(header_value) = headers.get("authorization") {
        let auth_str = header_value.to_str().map_err(|_| unauthorized())?;
        auth_str.strip_prefix("Bearer ").ok_or_else(unauthorized)?
    } else {
        warn!(path, "missing API key");
        return Err(unauthorized());
    };

    if provided_key
        .as_bytes()
        .ct_eq(auth_state.config.api_key.as_bytes())
        .into()
    {
        Ok(next.run(request).await)
    } else {
        warn!(path, "authentication failed: invalid key");
        Err(unauthorized())
    }
}
