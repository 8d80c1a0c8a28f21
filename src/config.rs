use std::{env, fmt::Display, str::FromStr};

use anyhow::Context;
use tracing::warn;

use crate::models::Identity;

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to a production Postgres instance")?,
            max_connections: try_load("PORTAL_MAX_CONNECTIONS", 5),
        })
    }
}

/// Read before logging is initialised, so a bad value is silently ignored.
pub fn log_json() -> bool {
    env::var("PORTAL_LOG_JSON")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(false)
}

/// Identity from `--as`, falling back to `PORTAL_IDENTITY`.
pub fn identity(flag: Option<Identity>) -> anyhow::Result<Option<Identity>> {
    if flag.is_some() {
        return Ok(flag);
    }
    match env::var("PORTAL_IDENTITY") {
        Ok(value) if !value.trim().is_empty() => value
            .parse()
            .map(Some)
            .with_context(|| format!("PORTAL_IDENTITY is not a valid UUID: {value}")),
        _ => Ok(None),
    }
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|err| {
            warn!("Invalid {key} value '{raw}': {err}, using default {default}");
            default
        }),
        Err(_) => default,
    }
}
