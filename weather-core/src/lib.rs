//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The OpenWeather provider and the abstraction over it
//! - The lookup controller: one live request, superseded by newer submissions
//! - Shared domain models (queries, reports, request state)
//!
//! It is used by `weather-cli`, but can also be reused by other front ends.

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod provider;

pub use config::Config;
pub use controller::{AttemptToken, LookupController};
pub use error::LookupError;
pub use model::{Condition, Query, RequestState, WeatherReport};
pub use provider::{WeatherProvider, openweather::OpenWeatherProvider, provider_from_config};
