//! Immutable weather records produced from decoded tool results.
//!
//! Field shapes mirror the payloads the weather MCP server emits. Everything
//! is plain data: no identity beyond field values, never mutated after
//! decoding. Numeric fields are `f64` because JSON servers freely mix
//! integers and floats for the same field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current conditions for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Resolved location name as reported by the server (e.g. "London, UK").
    pub location: String,
    /// Temperature in the requested units.
    pub temperature: f64,
    /// Apparent temperature in the requested units.
    #[serde(default)]
    pub feels_like: Option<f64>,
    /// Relative humidity, percent.
    #[serde(default)]
    pub humidity: Option<f64>,
    /// Wind speed in the requested units.
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Short condition label, e.g. "Partly Cloudy".
    #[serde(default)]
    pub condition: String,
    /// Longer free-text description.
    #[serde(default)]
    pub description: String,
    /// Server-side observation timestamp (ISO 8601, no timezone guarantee).
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One day of a multi-day forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastDay {
    /// Forecast date.
    pub date: NaiveDate,
    /// Expected high in the requested units.
    #[serde(default)]
    pub temp_max: Option<f64>,
    /// Expected low in the requested units.
    #[serde(default)]
    pub temp_min: Option<f64>,
    /// Short condition label.
    #[serde(default)]
    pub condition: String,
    /// Longer free-text description, when the server provides one.
    #[serde(default)]
    pub description: String,
    /// Expected precipitation in millimetres.
    #[serde(default)]
    pub precipitation: Option<f64>,
    /// Expected wind speed in the requested units.
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Expected relative humidity, percent.
    #[serde(default)]
    pub humidity: Option<f64>,
}

/// An active weather alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherAlert {
    /// Alert headline, e.g. "Wind Advisory".
    pub title: String,
    /// Severity label as reported ("Low" | "Medium" | "High").
    #[serde(default)]
    pub severity: String,
    /// Free-text description of the alert.
    #[serde(default)]
    pub description: String,
    /// When the alert takes effect (server-formatted).
    #[serde(default, deserialize_with = "de_alert_time")]
    pub effective_from: Option<String>,
    /// When the alert expires (server-formatted).
    #[serde(default, deserialize_with = "de_alert_time")]
    pub expires: Option<String>,
}

/// Alert times arrive as ISO strings from the fallback data but as Unix
/// seconds from the live alerts API. Accept both, normalizing seconds to a
/// UTC timestamp string.
fn de_alert_time<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AlertTime {
        Text(String),
        UnixSecs(i64),
    }

    Ok(Option::<AlertTime>::deserialize(deserializer)?.map(|t| match t {
        AlertTime::Text(text) => text,
        AlertTime::UnixSecs(secs) => chrono::DateTime::from_timestamp(secs, 0)
            .map_or_else(|| secs.to_string(), |dt| dt.naive_utc().to_string()),
    }))
}

/// Air quality reading for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirQuality {
    /// Location the reading applies to.
    #[serde(default)]
    pub location: String,
    /// Air quality index.
    pub aqi: f64,
    /// Quality label; servers disagree on the field name, accept both.
    #[serde(default, alias = "aqi_quality")]
    pub quality: String,
    /// PM2.5 concentration, µg/m³.
    #[serde(default, rename = "pm25")]
    pub pm2_5: Option<f64>,
    /// PM10 concentration, µg/m³.
    #[serde(default)]
    pub pm10: Option<f64>,
    /// NO₂ concentration, µg/m³.
    #[serde(default)]
    pub no2: Option<f64>,
    /// SO₂ concentration, µg/m³.
    #[serde(default)]
    pub so2: Option<f64>,
    /// O₃ concentration, µg/m³.
    #[serde(default)]
    pub o3: Option<f64>,
    /// CO concentration, mg/m³.
    #[serde(default)]
    pub co: Option<f64>,
    /// Server-side reading timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}
