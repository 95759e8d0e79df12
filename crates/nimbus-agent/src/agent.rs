//! Typed weather operations over the retry/cache invoker.
//!
//! Each operation maps to one tool name and argument shape, delegates to the
//! invoker, and narrows the untyped JSON payload into a record. The agent
//! itself never retries; it only decodes or surfaces what the invoker
//! returns.

use crate::cache::CacheConfig;
use crate::invoker::{RetryPolicy, ToolInvoker};
use nimbus_core::records::{AirQuality, CurrentConditions, ForecastDay, WeatherAlert};
use nimbus_core::{ToolCaller, WeatherError, WeatherResult};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Tool names exposed by the weather server.
const TOOL_CURRENT: &str = "get_current_weather";
const TOOL_FORECAST: &str = "get_forecast";
const TOOL_ALERTS: &str = "get_alerts";
const TOOL_AIR_QUALITY: &str = "get_air_quality";

/// Agent-level configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentConfig {
    /// Measurement system: "metric", "imperial" or "standard".
    #[serde(default = "default_units")]
    pub units: String,
    /// Default forecast length in days.
    #[serde(default = "default_days")]
    pub forecast_days: u32,
}

fn default_units() -> String {
    "metric".to_string()
}
fn default_days() -> u32 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            units: default_units(),
            forecast_days: default_days(),
        }
    }
}

/// Result of [`WeatherAgent::analyze`]: whatever succeeded, plus which
/// operations failed and why. Never fails as a whole because one tool did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WeatherAnalysis {
    /// Location the analysis was requested for.
    pub location: String,
    /// Current conditions, when that operation succeeded.
    pub current: Option<CurrentConditions>,
    /// Forecast, when that operation succeeded.
    pub forecast: Option<Vec<ForecastDay>>,
    /// Active alerts, when that operation succeeded.
    pub alerts: Option<Vec<WeatherAlert>>,
    /// Air quality, when that operation succeeded.
    pub air_quality: Option<AirQuality>,
    /// Failed operation name → error message.
    pub failures: BTreeMap<String, String>,
}

impl WeatherAnalysis {
    /// How many of the four operations produced a value.
    pub fn succeeded(&self) -> usize {
        [
            self.current.is_some(),
            self.forecast.is_some(),
            self.alerts.is_some(),
            self.air_quality.is_some(),
        ]
        .into_iter()
        .filter(|ok| *ok)
        .count()
    }

    /// Whether every operation succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The weather domain layer: four typed operations plus a combined analysis.
pub struct WeatherAgent {
    invoker: ToolInvoker,
    config: AgentConfig,
}

impl WeatherAgent {
    /// Build an agent over any [`ToolCaller`] with the given policies.
    pub fn new(
        caller: Arc<dyn ToolCaller>,
        config: AgentConfig,
        retry: RetryPolicy,
        cache: CacheConfig,
    ) -> Self {
        Self {
            invoker: ToolInvoker::new(caller, retry, cache),
            config,
        }
    }

    /// Current conditions for a location.
    pub async fn get_current_weather(&self, location: &str) -> WeatherResult<CurrentConditions> {
        let args = json!({"location": location, "units": self.config.units});
        self.invoke_decoded(TOOL_CURRENT, args).await
    }

    /// Multi-day forecast; `days` falls back to the configured default.
    pub async fn get_forecast(
        &self,
        location: &str,
        days: Option<u32>,
    ) -> WeatherResult<Vec<ForecastDay>> {
        let days = days.unwrap_or(self.config.forecast_days);
        let args = json!({"location": location, "days": days, "units": self.config.units});
        self.invoke_decoded(TOOL_FORECAST, args).await
    }

    /// Active weather alerts for a location; often empty.
    pub async fn get_alerts(&self, location: &str) -> WeatherResult<Vec<WeatherAlert>> {
        let args = json!({"location": location});
        self.invoke_decoded(TOOL_ALERTS, args).await
    }

    /// Air quality reading for a location.
    pub async fn get_air_quality(&self, location: &str) -> WeatherResult<AirQuality> {
        let args = json!({"location": location});
        self.invoke_decoded(TOOL_AIR_QUALITY, args).await
    }

    /// Run all four operations and aggregate the outcome.
    ///
    /// Partial failure is reported per operation in
    /// [`WeatherAnalysis::failures`] while the remaining values are kept.
    pub async fn analyze(&self, location: &str) -> WeatherAnalysis {
        info!(location, "weather analysis started");
        let mut analysis = WeatherAnalysis {
            location: location.to_string(),
            current: None,
            forecast: None,
            alerts: None,
            air_quality: None,
            failures: BTreeMap::new(),
        };

        match self.get_current_weather(location).await {
            Ok(v) => analysis.current = Some(v),
            Err(e) => record_failure(&mut analysis, "current_weather", &e),
        }
        match self.get_forecast(location, None).await {
            Ok(v) => analysis.forecast = Some(v),
            Err(e) => record_failure(&mut analysis, "forecast", &e),
        }
        match self.get_alerts(location).await {
            Ok(v) => analysis.alerts = Some(v),
            Err(e) => record_failure(&mut analysis, "alerts", &e),
        }
        match self.get_air_quality(location).await {
            Ok(v) => analysis.air_quality = Some(v),
            Err(e) => record_failure(&mut analysis, "air_quality", &e),
        }

        info!(
            location,
            succeeded = analysis.succeeded(),
            failed = analysis.failures.len(),
            "weather analysis finished"
        );
        analysis
    }

    /// Display units matching the configured measurement system.
    pub fn display_units(&self) -> (&'static str, &'static str) {
        match self.config.units.as_str() {
            "imperial" => ("°F", "mph"),
            "standard" => ("K", "m/s"),
            _ => ("°C", "km/h"),
        }
    }

    async fn invoke_decoded<T: DeserializeOwned>(
        &self,
        tool: &str,
        args: serde_json::Value,
    ) -> WeatherResult<T> {
        let raw = self.invoker.invoke(tool, args).await?;
        serde_json::from_value(raw)
            .map_err(|e| WeatherError::Decode(format!("malformed {tool} payload: {e}")))
    }
}

fn record_failure(analysis: &mut WeatherAnalysis, operation: &str, err: &WeatherError) {
    warn!(location = %analysis.location, operation, error = %err, "analysis sub-operation failed");
    analysis
        .failures
        .insert(operation.to_string(), err.to_string());
}

// ─── Tests ──────────────────────────────────────────────────────────────────
