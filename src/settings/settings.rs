use crate::application_impl::{RenewalConfig, RetryPolicy};
use crate::domain_model::{LeaseMode, Ratio};
use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub scheduler: Scheduler,
    pub renewal: Renewal,
    pub retry: Retry,
    pub backend: Backend,
    #[serde(default, rename = "lease")]
    pub leases: Vec<Secret>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Scheduler {
    pub workers: usize,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Renewal {
    pub threshold: Ratio,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub revoke_on_close: bool,
}

#[derive(Debug, Deserialize)]
pub struct Retry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

#[derive(Debug, Deserialize)]
pub struct Backend {
    pub kind: String, // "fake"
    pub lease_ttl_secs: u64,
    #[serde(default = "yes")]
    pub lease_renewable: bool,
    /// Absent means the session token never expires.
    pub token_ttl_secs: Option<u64>,
    #[serde(default = "yes")]
    pub token_renewable: bool,
}

/// A secret acquired at startup and kept alive until shutdown.
#[derive(Debug, Deserialize)]
pub struct Secret {
    pub path: String,
    #[serde(default)]
    pub mode: LeaseMode,
}

fn yes() -> bool {
    true
}

impl Settings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.scheduler.shutdown_grace_ms)
    }

    pub fn renewal_config(&self) -> Result<RenewalConfig> {
        let renewal = &self.renewal;
        Ok(RenewalConfig::new(
            renewal.threshold,
            Duration::from_millis(renewal.request_timeout_ms),
            renewal.revoke_on_close,
        )?)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let retry = &self.retry;
        Ok(RetryPolicy::new(
            retry.max_attempts,
            Duration::from_millis(retry.base_delay_ms),
            Duration::from_millis(retry.max_delay_ms),
            retry.multiplier,
        )?)
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
