use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{
    config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS},
    error::LookupError,
    model::{Condition, Query, WeatherReport},
};

use super::WeatherProvider;

const CURRENT_WEATHER_PATH: &str = "/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    endpoint: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the provider at another host, e.g. a mock server in tests.
    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        Ok(Self {
            api_key,
            endpoint: format!("{}{CURRENT_WEATHER_PATH}", base_url.trim_end_matches('/')),
            http: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_client(timeout)?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().context("Failed to build HTTP client")
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize, Default)]
struct OwSys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    #[serde(default)]
    sys: OwSys,
    #[serde(default)]
    weather: Vec<OwWeather>,
    main: OwMain,
    wind: OwWind,
    dt: Option<i64>,
}

impl From<OwCurrentResponse> for WeatherReport {
    fn from(parsed: OwCurrentResponse) -> Self {
        let condition = parsed
            .weather
            .into_iter()
            .next()
            .map(|w| Condition { category: w.main, description: w.description, icon: w.icon })
            .unwrap_or_else(|| Condition {
                category: "Unknown".to_string(),
                description: "Unknown".to_string(),
                icon: String::new(),
            });

        WeatherReport {
            location: parsed.name,
            country: parsed.sys.country,
            condition,
            temperature_c: parsed.main.temp,
            feels_like_c: parsed.main.feels_like,
            humidity_pct: parsed.main.humidity,
            wind_speed_mps: parsed.wind.speed,
            observed_at: parsed.dt.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(&self, query: &Query) -> Result<WeatherReport, LookupError> {
        let res = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", query.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            debug!(%status, query = %query, "OpenWeather rejected request");
            return Err(LookupError::from_status(status.as_u16()));
        }

        let body = res.text().await?;
        let parsed: OwCurrentResponse = serde_json::from_str(&body)?;

        Ok(parsed.into())
    }
}
