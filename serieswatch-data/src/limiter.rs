use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota};

/// Shared throttle applied to every outgoing provider request.
#[derive(Clone)]
pub struct RequestLimiter {
    inner: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RequestLimiter {
    /// Allow at most `per_second` requests per second; `0` disables throttling.
    pub fn per_second(per_second: u32) -> Self {
        Self {
            inner: NonZeroU32::new(per_second)
                .map(|rate| Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(rate)))),
        }
    }

    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    pub async fn until_ready(&self) {
        if let Some(inner) = &self.inner {
            inner.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("throttled", &self.inner.is_some())
            .finish()
    }
}
