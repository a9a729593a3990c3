//! Per-tenant rate limiting
//!
//! A fixed-window token bucket built from the cache store's counter
//! primitives: `increment` opens or bumps the window counter, `set_expiry`
//! closes the window. Cache failures fail open - an unreachable cache must
//! not take the gateway down with it.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use recbridge_core::config::RateLimitConfig;
use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::TenantId;
use recbridge_core::ports::cache_store::ICacheStore;

/// Request class with its own window budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    Read,
    Write,
    Batch,
}

impl WindowClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowClass::Read => "read",
            WindowClass::Write => "write",
            WindowClass::Batch => "batch",
        }
    }
}

/// Fixed-window rate limiter over the cache store
pub struct RateLimiter {
    cache: Arc<dyn ICacheStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn ICacheStore>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    fn budget(&self, class: WindowClass) -> u64 {
        match class {
            WindowClass::Read => self.config.read_per_window,
            WindowClass::Write => self.config.write_per_window,
            WindowClass::Batch => self.config.batch_per_window,
        }
    }

    /// Admit or reject one request for `tenant` in `class`
    ///
    /// The first hit of a window sets its expiry; subsequent hits ride the
    /// same counter until it lapses.
    pub async fn check(&self, tenant: &TenantId, class: WindowClass) -> Result<(), GatewayError> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = format!("rate:{tenant}:{}", class.as_str());
        let window = Duration::from_secs(self.config.window_secs);

        let count = match self.cache.increment(&key, 1).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, key, "Rate-limit counter unavailable, admitting request");
                return Ok(());
            }
        };

        if count == 1 {
            if let Err(e) = self.cache.set_expiry(&key, window).await {
                warn!(error = %e, key, "Failed to arm rate-limit window");
            }
        }

        if count as u64 > self.budget(class) {
            return Err(GatewayError::RateLimited {
                retry_after_secs: self.config.window_secs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recbridge_store::MemoryCacheStore;

    fn limiter(read_budget: u64) -> RateLimiter {
        let config = RateLimitConfig {
            enabled: true,
            window_secs: 60,
            read_per_window: read_budget,
            write_per_window: 2,
            batch_per_window: 1,
        };
        RateLimiter::new(Arc::new(MemoryCacheStore::new()), config)
    }

    #[tokio::test]
    async fn test_budget_admits_then_rejects() {
        let limiter = limiter(3);
        let tenant = TenantId::new();

        for _ in 0..3 {
            limiter.check(&tenant, WindowClass::Read).await.unwrap();
        }
        let err = limiter.check(&tenant, WindowClass::Read).await.unwrap_err();
        assert_eq!(err.status_code(), 429);
    }

    #[tokio::test]
    async fn test_classes_have_independent_windows() {
        let limiter = limiter(1);
        let tenant = TenantId::new();

        limiter.check(&tenant, WindowClass::Read).await.unwrap();
        limiter.check(&tenant, WindowClass::Write).await.unwrap();
        assert!(limiter.check(&tenant, WindowClass::Read).await.is_err());
        limiter.check(&tenant, WindowClass::Write).await.unwrap();
        assert!(limiter.check(&tenant, WindowClass::Write).await.is_err());
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let limiter = limiter(1);
        let a = TenantId::new();
        let b = TenantId::new();

        limiter.check(&a, WindowClass::Read).await.unwrap();
        assert!(limiter.check(&a, WindowClass::Read).await.is_err());
        limiter.check(&b, WindowClass::Read).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_limiter_admits_everything() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(Arc::new(MemoryCacheStore::new()), config);
        let tenant = TenantId::new();
        for _ in 0..1000 {
            limiter.check(&tenant, WindowClass::Batch).await.unwrap();
        }
    }
}
