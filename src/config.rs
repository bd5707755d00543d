use anyhow::{anyhow, Result};
use chrono::Duration;
use std::env;

use crate::services::todo::DEFAULT_REMINDER_LEAD_MINUTES;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/todo.db";
const DEFAULT_HTTP_PORT: u16 = 3000;
/// Upper bound for the default reminder lead: one week.
const MAX_REMINDER_LEAD_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub database_url: String,
    pub http_port: u16,
    pub reminder_lead_minutes: i64,
}

/// Reads a variable, treating unset and blank the same.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let token = non_empty_var("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;

        let database_url = Self::database_url_from_env();

        let http_port = match non_empty_var("HTTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| anyhow!("Invalid HTTP_PORT: {}", raw))?,
            None => DEFAULT_HTTP_PORT,
        };

        let reminder_lead_minutes = match non_empty_var("REMINDER_LEAD_MINUTES") {
            Some(raw) => raw
                .parse()
                .ok()
                .filter(|minutes| (1..=MAX_REMINDER_LEAD_MINUTES).contains(minutes))
                .ok_or_else(|| {
                    anyhow!(
                        "Invalid REMINDER_LEAD_MINUTES: {} (expected 1..={})",
                        raw,
                        MAX_REMINDER_LEAD_MINUTES
                    )
                })?,
            None => DEFAULT_REMINDER_LEAD_MINUTES,
        };

        Ok(Config {
            telegram_bot_token: token,
            database_url,
            http_port,
            reminder_lead_minutes,
        })
    }

    /// `DATABASE_URL` alone, for tools that never talk to Telegram.
    pub fn database_url_from_env() -> String {
        non_empty_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
    }

    pub fn reminder_lead(&self) -> Duration {
        Duration::minutes(self.reminder_lead_minutes)
    }
}
