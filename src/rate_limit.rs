use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};
use tracing::warn;

pub const REQUESTS_PER_MINUTE: u32 = 60;
pub const TASK_REQUESTS_PER_MINUTE: u32 = 10;

#[derive(Clone)]
pub struct RateLimitConfig {
    pub general_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    pub task_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        let general_quota = Quota::per_minute(NonZeroU32::new(REQUESTS_PER_MINUTE).unwrap());
        let task_quota = Quota::per_minute(NonZeroU32::new(TASK_REQUESTS_PER_MINUTE).unwrap());
        Self {
            general_limiter: Arc::new(RateLimiter::direct(general_quota)),
            task_limiter: Arc::new(RateLimiter::direct(task_quota)),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limits): axum::extract::State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let limiter = if request.uri().path().starts_with("/tasks") && request.method() == "POST" {
        &limits.task_limiter
    } else {
        &limits.general_limiter
    };

    if limiter.check().is_err() {
        warn!(ip = %addr.ip(), path = request.uri().path(), "rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_initial_requests() {
        let config = RateLimitConfig::new();
        assert!(config.general_limiter.check().is_ok());
        assert!(config.task_limiter.check().is_ok());
    }

    #[test]
    fn task_limiter_is_more_restrictive() {
        let config = RateLimitConfig::new();
        let mut task_allowed = 0;
        for _ in 0..(TASK_REQUESTS_PER_MINUTE + 5) {
            if config.task_limiter.check().is_ok() {
                task_allowed += 1;
            }
        }
        assert_eq!(task_allowed, TASK_REQUESTS_PER_MINUTE as usize);
    }
}
