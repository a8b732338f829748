/// Request throttling
use crate::{
    context::AppContext,
    error::{DispatchError, DispatchResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Global request limiter
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    limiter: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &crate::config::RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        // Bursts of up to two seconds' worth of traffic
        let burst = per_second.saturating_mul(NonZeroU32::new(2).unwrap_or(NonZeroU32::MIN));

        Self {
            enabled: config.enabled,
            limiter: Arc::new(GovernorLimiter::direct(
                Quota::per_second(per_second).allow_burst(burst),
            )),
        }
    }

    /// Consume one unit of quota
    pub fn check(&self) -> DispatchResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.limiter
            .check()
            .map_err(|_| DispatchError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = ctx.rate_limiter.check() {
        tracing::warn!("Rate limit exceeded for {}", request.uri().path());
        return e.into_response();
    }

    next.run(request).await
}
