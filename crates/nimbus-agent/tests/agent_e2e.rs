#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Full-stack test: agent → invoker → MCP client → fixture subprocess.

use nimbus_agent::{AgentConfig, CacheConfig, RetryPolicy, WeatherAgent};
use nimbus_core::WeatherError;
use nimbus_mcp::{McpClient, McpServerConfig};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A fixture weather server handling initialize plus the four weather tools.
/// `get_alerts` always reports a tool-level error.
fn weather_fixture() -> NamedTempFile {
    let script = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"initialize"'*) printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fixture-weather","version":"0.0.1"}}}\n' "$id" ;;
    *'get_current_weather'*) printf '{"jsonrpc":"2.0","id":%s,"result":{"location":"London, UK","temperature":12.5,"feels_like":11.2,"humidity":72,"wind_speed":15.3,"condition":"Partly Cloudy","description":"Partly cloudy skies","timestamp":"2026-08-29T10:00:00"}}\n' "$id" ;;
    *'get_forecast'*) printf '{"jsonrpc":"2.0","id":%s,"result":[{"date":"2026-08-29","temp_max":18.2,"temp_min":11.0,"condition":"Sunny","wind_speed":8.5},{"date":"2026-08-30","temp_max":16.8,"temp_min":10.2,"condition":"Cloudy","wind_speed":12.0}]}\n' "$id" ;;
    *'get_alerts'*) printf '{"jsonrpc":"2.0","id":%s,"result":{"error":"alerts feed unavailable"}}\n' "$id" ;;
    *'get_air_quality'*) printf '{"jsonrpc":"2.0","id":%s,"result":{"location":"London","aqi":2,"aqi_quality":"Fair","pm25":35.0,"pm10":50.0,"no2":20.0,"so2":10.0,"o3":60.0,"co":0.5,"timestamp":"2026-08-29T10:00:00"}}\n' "$id" ;;
    *) : ;;
  esac
done
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(script.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn connect(script: &NamedTempFile) -> Arc<McpClient> {
    let config = McpServerConfig {
        command: "sh".to_string(),
        args: vec![script.path().to_string_lossy().into_owned()],
        env: HashMap::new(),
        call_timeout_secs: 5,
        shutdown_grace_secs: 2,
    };
    let client = Arc::new(McpClient::connect(&config).unwrap());
    client.initialize().await.unwrap();
    client
}

fn agent_over(client: Arc<McpClient>) -> WeatherAgent {
    WeatherAgent::new(
        client,
        AgentConfig::default(),
        RetryPolicy {
            enabled: true,
            max_attempts: 2,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        },
        CacheConfig::default(),
    )
}

#[tokio::test]
async fn current_weather_end_to_end() {
    let script = weather_fixture();
    let client = connect(&script).await;
    let agent = agent_over(client.clone());

    let rec = agent.get_current_weather("London").await.unwrap();
    assert!(rec.location.contains("London"));
    assert_eq!(rec.temperature, 12.5);
    assert_eq!(rec.humidity, Some(72.0));
    assert_eq!(rec.condition, "Partly Cloudy");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn analyze_marks_failed_alerts_and_keeps_the_rest() {
    let script = weather_fixture();
    let client = connect(&script).await;
    let agent = agent_over(client.clone());

    let analysis = agent.analyze("London").await;
    assert!(analysis.current.is_some());
    assert_eq!(analysis.forecast.as_ref().unwrap().len(), 2);
    assert!(analysis.air_quality.is_some());
    assert!(analysis.alerts.is_none());
    assert_eq!(analysis.succeeded(), 3);
    assert!(analysis
        .failures
        .get("alerts")
        .unwrap()
        .contains("alerts feed unavailable"));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn tool_level_error_is_not_wrapped_as_operation_error() {
    let script = weather_fixture();
    let client = connect(&script).await;
    let agent = agent_over(client.clone());

    // The fixture reports a tool-level error for alerts; it must surface as
    // a protocol error after one attempt, not exhaust the retry budget.
    let err = agent.get_alerts("London").await.unwrap_err();
    assert!(matches!(err, WeatherError::Protocol { .. }), "got {err:?}");

    client.shutdown().await.unwrap();
}
