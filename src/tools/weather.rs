//! Open-Meteo forecast lookup

use super::{parse_input, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Deserialize)]
struct ForecastInput {
    latitude: f64,
    longitude: f64,
    #[serde(default = "default_true")]
    current_weather: bool,
    #[serde(default)]
    hourly_forecast: bool,
    #[serde(default)]
    daily_forecast: bool,
}

fn default_true() -> bool {
    true
}

impl ForecastInput {
    fn validate(&self) -> Result<(), ToolError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ToolError::InvalidInput(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ToolError::InvalidInput(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Query parameters; disabled sections are omitted entirely
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("timezone", "auto".to_string()),
        ];
        if self.current_weather {
            query.push(("current_weather", "true".to_string()));
        }
        if self.hourly_forecast {
            query.push(("hourly", "temperature_2m,precipitation_probability".to_string()));
        }
        if self.daily_forecast {
            query.push(("daily", "temperature_2m_max,temperature_2m_min".to_string()));
        }
        query
    }
}

/// `get_weather_forecast {latitude, longitude, current_weather?, hourly_forecast?, daily_forecast?}`
pub struct WeatherForecastTool {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WeatherForecastTool {
    fn default() -> Self {
        Self::new(OPEN_METEO_URL)
    }
}

impl WeatherForecastTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Tool for WeatherForecastTool {
    fn name(&self) -> &'static str {
        "get_weather_forecast"
    }

    fn description(&self) -> String {
        "Fetches current weather and optional hourly/daily forecasts from Open-Meteo.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["latitude", "longitude"],
            "properties": {
                "latitude": {"type": "number"},
                "longitude": {"type": "number"},
                "current_weather": {"type": "boolean"},
                "hourly_forecast": {"type": "boolean"},
                "daily_forecast": {"type": "boolean"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: ForecastInput = parse_input(input)?;
        input.validate()?;

        let request = self.client.get(&self.base_url).query(&input.query()).send();
        let response = tokio::select! {
            () = ctx.cancel.cancelled() => {
                return Err(ToolError::Failed("[request cancelled]".to_string()));
            }
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Http(format!("HTTP {}: {body}", status.as_u16())));
        }
        let body: Value = response.json().await?;
        Ok(body.to_string())
    }
}
