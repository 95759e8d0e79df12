//! Retry/cache wrapper turning an unreliable subprocess channel into a
//! dependable call surface.
//!
//! This is the only layer that decides retry-vs-surface: transient failures
//! (transport, timeout, decode) consume the attempt budget with exponential
//! backoff; protocol errors surface after exactly one attempt. The cache
//! check precedes any transport activity.

use crate::cache::{cache_key, CacheConfig, ToolCache};
use nimbus_core::{ToolCaller, WeatherError, WeatherResult};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configures retry behaviour, independent of the cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Whether transient failures are retried at all (default: true).
    /// When false every call gets exactly one attempt.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Total attempts per call, including the first (default: 3).
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Cap for the backoff delay in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    200
}
fn default_backoff_max() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

/// Backoff delay for a given zero-based attempt, capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(policy.backoff_max_ms)
}

/// Wraps a [`ToolCaller`] with bounded retries and a time-bounded cache.
pub struct ToolInvoker {
    caller: Arc<dyn ToolCaller>,
    retry: RetryPolicy,
    /// `None` when caching is disabled in the configuration.
    cache: Option<ToolCache>,
}

impl ToolInvoker {
    /// Build an invoker around `caller` with the given policies.
    ///
    /// Retry and cache are independently toggleable: disabling one never
    /// changes the behaviour of the other.
    pub fn new(caller: Arc<dyn ToolCaller>, retry: RetryPolicy, cache: CacheConfig) -> Self {
        let cache = cache
            .enabled
            .then(|| ToolCache::new(Duration::from_secs(cache.ttl_secs)));
        Self {
            caller,
            retry,
            cache,
        }
    }

    /// Invoke a tool: cache lookup, then up to `max_attempts` calls.
    ///
    /// Exhausting the budget returns [`WeatherError::Operation`] wrapping the
    /// last transient cause; non-transient errors surface immediately.
    pub async fn invoke(&self, tool: &str, args: Value) -> WeatherResult<Value> {
        let key = cache_key(tool, &args);
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.get(&key) {
                debug!(tool, "cache hit");
                return Ok(value);
            }
            debug!(tool, "cache miss");
        }

        let attempts = if self.retry.enabled {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut last_err: Option<WeatherError> = None;
        for attempt in 0..attempts {
            match self.caller.call_tool(tool, args.clone()).await {
                Ok(value) => {
                    if let Some(cache) = &self.cache {
                        cache.put(key, value.clone());
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    debug!(tool, error = %e, "non-retryable failure");
                    return Err(e);
                }
                Err(e) => {
                    warn!(tool, attempt, error = %e, "transient failure");
                    if attempt + 1 < attempts {
                        let delay = compute_backoff(&self.retry, attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        let source = last_err
            .map(Box::new)
            .unwrap_or_else(|| Box::new(WeatherError::Transport("no attempt was made".into())));
        Err(WeatherError::Operation { attempts, source })
    }

    /// Drop every cached entry (no-op when caching is disabled).
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
