//! Time-bounded cache for tool results, keyed by (tool, normalized args).

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache configuration, independent of the retry settings.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CacheConfig {
    /// Whether caching is used at all (default: true). When false the
    /// invoker skips both lookup and store.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Time-to-live for entries in seconds (default: 300).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl(),
        }
    }
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Expiry-based cache of decoded tool results.
///
/// The map is behind a non-async mutex and the lock is never held across an
/// await point. Expired entries are dropped lazily on lookup; one entry
/// expiring never affects the others.
pub struct ToolCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ToolCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the live value for `key`, dropping it if expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                debug!(key, "cache entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key` with expiry now + TTL.
    pub fn put(&self, key: String, value: Value) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(key, entry);
    }

    /// Number of entries currently stored (live or not yet swept).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Build the canonical cache key for a tool call.
///
/// Argument objects are re-serialized through `serde_json` (sorted keys), and
/// the `location` argument is lowercased with inner whitespace collapsed so
/// "New York", "new york" and "NEW  YORK" share one entry.
pub fn cache_key(tool: &str, args: &Value) -> String {
    let normalized = normalize_args(args);
    format!("{tool}:{normalized}")
}

fn normalize_args(args: &Value) -> String {
    let mut args = args.clone();
    if let Some(location) = args.get_mut("location") {
        if let Some(s) = location.as_str() {
            let canonical = s
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            *location = Value::String(canonical);
        }
    }
    args.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_within_ttl() {
        let cache = ToolCache::new(Duration::from_secs(60));
        cache.put("k".into(), json!({"temperature": 9.4}));
        assert_eq!(cache.get("k").unwrap()["temperature"], 9.4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn miss_after_expiry() {
        let cache = ToolCache::new(Duration::ZERO);
        cache.put("k".into(), json!(1));
        assert!(cache.get("k").is_none());
        // The expired entry was swept on lookup.
        assert!(cache.is_empty());
    }

    #[test]
    fn entries_expire_independently() {
        let cache = ToolCache::new(Duration::from_secs(60));
        cache.put("live".into(), json!("a"));
        {
            // Force one entry to be already expired.
            let mut entries = cache.entries.lock();
            entries.insert(
                "dead".into(),
                CacheEntry {
                    value: json!("b"),
                    expires_at: Instant::now() - Duration::from_secs(1),
                },
            );
        }
        assert!(cache.get("dead").is_none());
        assert_eq!(cache.get("live").unwrap(), json!("a"));
    }

    #[test]
    fn key_normalizes_location_case_and_whitespace() {
        let a = cache_key("get_current_weather", &json!({"location": "New York", "units": "metric"}));
        let b = cache_key("get_current_weather", &json!({"location": "new   YORK", "units": "metric"}));
        assert_eq!(a, b);

        let other_tool = cache_key("get_forecast", &json!({"location": "new york", "units": "metric"}));
        assert_ne!(a, other_tool);

        let other_args = cache_key("get_current_weather", &json!({"location": "new york", "units": "imperial"}));
        assert_ne!(a, other_args);
    }

    #[test]
    fn key_is_stable_under_argument_order() {
        let a: Value = serde_json::from_str(r#"{"location":"Lima","days":3}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"days":3,"location":"Lima"}"#).unwrap();
        assert_eq!(cache_key("get_forecast", &a), cache_key("get_forecast", &b));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = ToolCache::new(Duration::from_secs(60));
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        cache.clear();
        assert!(cache.is_empty());
    }
}
