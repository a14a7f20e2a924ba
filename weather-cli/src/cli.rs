use std::{
    io::{IsTerminal, Write},
    sync::Arc,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use tracing::debug;
use weather_core::{Config, LookupController, RequestState, provider_from_config};

use crate::{
    render,
    session::{self, SessionOptions},
};

/// Environment variables consulted for the API key, in order.
const API_KEY_VARS: &[&str] = &["OPENWEATHER_API_KEY", "WEATHER_API_KEY"];

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Current weather by city name")]
pub struct Cli {
    /// Log lookup lifecycle events to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key (and optionally a custom endpoint).
    Configure,

    /// Show current weather for a city and exit.
    Show {
        /// City name, e.g. "London" or "New York".
        #[arg(required = true, num_args = 1..)]
        city: Vec<String>,
    },

    /// Look up cities line by line from stdin (the default).
    Interactive,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command.unwrap_or(Command::Interactive) {
            Command::Configure => configure(),
            Command::Show { city } => show(&city.join(" ")).await,
            Command::Interactive => interactive().await,
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let env_key = API_KEY_VARS.iter().find_map(|var| std::env::var(var).ok());
    Ok(Config::load()?.with_env_api_key(env_key))
}

fn controller(config: &Config) -> anyhow::Result<LookupController> {
    debug!(base_url = config.base_url(), "Using OpenWeather endpoint");
    Ok(LookupController::new(Arc::new(provider_from_config(config)?)))
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key);

    let base_url = Text::new("API base URL:")
        .with_default(config.base_url())
        .prompt()
        .context("Failed to read base URL")?;
    config.base_url = Some(base_url.trim().to_string()).filter(|url| !url.is_empty());

    let path = config.save()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

async fn show(city: &str) -> anyhow::Result<()> {
    let config = load_config()?;
    let mut controller = controller(&config)?;

    if !controller.submit(city) {
        bail!("City name must not be empty");
    }

    let color = std::io::stdout().is_terminal();
    match controller.settled().await {
        RequestState::Success(report) => {
            println!("{}", render::card(&report, color));
            Ok(())
        }
        RequestState::Failed(message) => bail!(message),
        RequestState::Idle | RequestState::Loading => bail!("Lookup did not complete"),
    }
}

async fn interactive() -> anyhow::Result<()> {
    let config = load_config()?;
    let controller = controller(&config)?;

    let opts = SessionOptions {
        prompt: std::io::stdin().is_terminal(),
        color: std::io::stdout().is_terminal(),
    };

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    session::run(controller, input, &mut out, opts).await?;

    if opts.prompt {
        writeln!(out)?;
    }
    Ok(())
}
