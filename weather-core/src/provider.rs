use crate::{
    Config, LookupError, Query, WeatherReport, config::DEFAULT_BASE_URL,
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions for a city name.
    async fn current_weather(&self, query: &Query) -> Result<WeatherReport, LookupError>;
}

/// Construct the OpenWeather provider from config.
///
/// A missing API key is deliberately not an error here: the provider answers
/// with 401 and the user sees it as an API error.
pub fn provider_from_config(config: &Config) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = match config.api_key() {
        Some(key) => key.to_owned(),
        None => {
            tracing::warn!("No API key configured; requests will be rejected by the provider");
            String::new()
        }
    };

    let provider = if config.base_url() == DEFAULT_BASE_URL {
        OpenWeatherProvider::new(api_key)?
    } else {
        OpenWeatherProvider::with_base_url(api_key, config.base_url())?
    };

    provider.with_timeout(config.timeout())
}
