//! `nimbus` — command-line weather agent over an MCP weather server.

use clap::{Parser, Subcommand};
use nimbus_agent::{AgentConfig, CacheConfig, RetryPolicy, WeatherAgent, WeatherAnalysis};
use nimbus_core::records::{AirQuality, CurrentConditions, ForecastDay, WeatherAlert};
use nimbus_core::{WeatherError, WeatherResult};
use nimbus_mcp::{McpClient, McpServerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nimbus", about = "Nimbus — weather agent over MCP")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nimbus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current conditions for a location
    Current {
        /// City name, e.g. "London"
        location: String,
    },
    /// Multi-day forecast for a location
    Forecast {
        /// City name
        location: String,
        /// Number of days (defaults to the configured value)
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Active weather alerts for a location
    Alerts {
        /// City name
        location: String,
    },
    /// Air quality reading for a location
    Air {
        /// City name
        location: String,
    },
    /// Run all four operations and print a combined report
    Analyze {
        /// City name
        location: String,
    },
}

#[derive(Debug, Deserialize)]
struct NimbusConfig {
    server: McpServerConfig,
    #[serde(default)]
    agent: AgentConfig,
    #[serde(default)]
    retry: RetryPolicy,
    #[serde(default)]
    cache: CacheConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli.config).await?;

    let client = Arc::new(McpClient::connect(&config.server)?);
    if let Err(e) = client.initialize().await {
        for line in client.server_stderr() {
            warn!(stderr = %line, "server diagnostics");
        }
        client.shutdown().await.ok();
        return Err(e.into());
    }

    let tools = match client.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            warn!(error = %e, "tool discovery failed, continuing without it");
            Vec::new()
        }
    };
    info!(tools = tools.len(), "connected to weather server");

    let agent = WeatherAgent::new(
        client.clone(),
        config.agent,
        config.retry,
        config.cache,
    );

    let outcome = run(&cli.command, &agent).await;

    // The subprocess is terminated on every exit path, success or not.
    client.shutdown().await?;
    outcome
}

async fn load_config(path: &Path) -> WeatherResult<NimbusConfig> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        WeatherError::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    toml::from_str(&text)
        .map_err(|e| WeatherError::Config(format!("failed to parse {}: {e}", path.display())))
}

async fn run(command: &Commands, agent: &WeatherAgent) -> anyhow::Result<()> {
    match command {
        Commands::Current { location } => {
            let rec = agent.get_current_weather(location).await?;
            print_current(&rec, agent);
        }
        Commands::Forecast { location, days } => {
            let forecast = agent.get_forecast(location, *days).await?;
            print_forecast(location, &forecast, agent);
        }
        Commands::Alerts { location } => {
            let alerts = agent.get_alerts(location).await?;
            print_alerts(location, &alerts);
        }
        Commands::Air { location } => {
            let air = agent.get_air_quality(location).await?;
            print_air_quality(&air);
        }
        Commands::Analyze { location } => {
            let analysis = agent.analyze(location).await;
            print_analysis(&analysis, agent);
        }
    }
    Ok(())
}

fn print_current(rec: &CurrentConditions, agent: &WeatherAgent) {
    let (temp_unit, wind_unit) = agent.display_units();
    println!("Weather for {}", rec.location);
    println!("{}", "-".repeat(50));
    println!("  {} — {}", rec.condition, rec.description);
    println!("  Temperature: {:.1}{temp_unit}", rec.temperature);
    if let Some(feels) = rec.feels_like {
        println!("  Feels like:  {feels:.1}{temp_unit}");
    }
    if let Some(humidity) = rec.humidity {
        println!("  Humidity:    {humidity:.0}%");
    }
    if let Some(wind) = rec.wind_speed {
        println!("  Wind:        {wind:.1} {wind_unit}");
    }
}

fn print_forecast(location: &str, forecast: &[ForecastDay], agent: &WeatherAgent) {
    let (temp_unit, wind_unit) = agent.display_units();
    println!("{}-day forecast for {location}", forecast.len());
    println!("{}", "-".repeat(50));
    for day in forecast {
        println!("{}: {}", day.date, day.condition);
        match (day.temp_max, day.temp_min) {
            (Some(max), Some(min)) => println!("  Temp: {max:.1}{temp_unit} / {min:.1}{temp_unit}"),
            (Some(max), None) => println!("  High: {max:.1}{temp_unit}"),
            (None, Some(min)) => println!("  Low:  {min:.1}{temp_unit}"),
            (None, None) => {}
        }
        if let Some(wind) = day.wind_speed {
            println!("  Wind: {wind:.1} {wind_unit}");
        }
    }
}

fn print_alerts(location: &str, alerts: &[WeatherAlert]) {
    if alerts.is_empty() {
        println!("No active weather alerts for {location}");
        return;
    }
    println!("{} alert(s) for {location}", alerts.len());
    println!("{}", "-".repeat(50));
    for alert in alerts {
        println!("[{}] {}", alert.severity, alert.title);
        if !alert.description.is_empty() {
            println!("  {}", alert.description);
        }
        if let Some(expires) = &alert.expires {
            println!("  Expires: {expires}");
        }
    }
}

fn print_air_quality(air: &AirQuality) {
    println!("Air quality for {}", air.location);
    println!("{}", "-".repeat(50));
    println!("  AQI: {:.0} — {}", air.aqi, air.quality);
    if let Some(pm) = air.pm2_5 {
        println!("  PM2.5: {pm:.1} µg/m³");
    }
    if let Some(pm) = air.pm10 {
        println!("  PM10:  {pm:.1} µg/m³");
    }
    if let Some(o3) = air.o3 {
        println!("  O3:    {o3:.1} µg/m³");
    }
}

fn print_analysis(analysis: &WeatherAnalysis, agent: &WeatherAgent) {
    println!("Weather analysis for {}", analysis.location);
    println!("{}", "=".repeat(50));
    if let Some(current) = &analysis.current {
        print_current(current, agent);
        println!();
    }
    if let Some(forecast) = &analysis.forecast {
        print_forecast(&analysis.location, forecast, agent);
        println!();
    }
    if let Some(alerts) = &analysis.alerts {
        print_alerts(&analysis.location, alerts);
        println!();
    }
    if let Some(air) = &analysis.air_quality {
        print_air_quality(air);
        println!();
    }
    if !analysis.is_complete() {
        println!("Partial result — failed operations:");
        for (operation, error) in &analysis.failures {
            println!("  {operation}: {error}");
        }
    }
}
