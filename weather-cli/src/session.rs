//! Interactive lookup session: every input line is a form submission, and
//! state transitions are printed as they arrive.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use weather_core::LookupController;

use crate::render;

const PROMPT: &str = "City> ";
const QUIT_COMMANDS: &[&str] = &[":q", ":quit", "exit"];

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Show a prompt before each input line.
    pub prompt: bool,
    /// Color the card heading by weather category.
    pub color: bool,
}

pub async fn run<R, W>(
    mut controller: LookupController,
    input: R,
    out: &mut W,
    opts: SessionOptions,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut states = controller.subscribe();

    prompt(out, opts)?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read input")? {
                    Some(line) if QUIT_COMMANDS.contains(&line.trim()) => break,
                    Some(line) => {
                        controller.set_input(line);
                        if !controller.submit_input() {
                            prompt(out, opts)?;
                        }
                    }
                    None => {
                        // End of input: let the last lookup finish before leaving.
                        let state = controller.settled().await;
                        if states.has_changed().unwrap_or(false) {
                            if let Some(text) = render::state(&state, opts.color) {
                                writeln!(out, "{text}")?;
                            }
                        }
                        break;
                    }
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if let Some(text) = render::state(&state, opts.color) {
                    writeln!(out, "{text}")?;
                }
                if !state.is_loading() {
                    prompt(out, opts)?;
                }
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn prompt<W: Write>(out: &mut W, opts: SessionOptions) -> Result<()> {
    if opts.prompt {
        write!(out, "{PROMPT}")?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use weather_core::{Condition, LookupError, Query, WeatherProvider, WeatherReport};

    #[derive(Debug)]
    struct FixedProvider;

    #[async_trait]
    impl WeatherProvider for FixedProvider {
        async fn current_weather(&self, query: &Query) -> Result<WeatherReport, LookupError> {
            if query.as_str() == "Atlantis" {
                return Err(LookupError::NotFound);
            }
            Ok(WeatherReport {
                location: query.as_str().to_string(),
                country: "GB".into(),
                condition: Condition {
                    category: "Rain".into(),
                    description: "light rain".into(),
                    icon: "10d".into(),
                },
                temperature_c: 9.6,
                feels_like_c: 7.2,
                humidity_pct: 88,
                wind_speed_mps: 5.5,
                observed_at: None,
            })
        }
    }

    async fn run_script(script: &str) -> String {
        let controller = LookupController::new(Arc::new(FixedProvider));
        let mut out = Vec::new();
        run(controller, script.as_bytes(), &mut out, SessionOptions::default())
            .await
            .expect("session should finish");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[tokio::test]
    async fn renders_card_for_submitted_city() {
        let out = run_script("London\n").await;

        assert!(out.contains("London, GB"));
        assert!(out.contains("Light rain"));
        assert!(out.contains("\n10°C\n"));
        assert!(out.contains("Wind: 6 m/s"));
    }

    #[tokio::test]
    async fn blank_lines_render_nothing() {
        let out = run_script("   \n\n").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn failures_show_in_error_region() {
        let out = run_script("Atlantis\n").await;
        assert!(out.contains("Error: City not found"));
    }

    #[tokio::test]
    async fn quit_command_stops_reading() {
        let out = run_script(":q\nLondon\n").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn prompt_is_written_when_enabled() {
        let controller = LookupController::new(Arc::new(FixedProvider));
        let mut out = Vec::new();
        let opts = SessionOptions { prompt: true, color: false };
        run(controller, "".as_bytes(), &mut out, opts).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), PROMPT);
    }
}
