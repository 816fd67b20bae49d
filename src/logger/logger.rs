use crate::settings::Log;
use anyhow::{Result, anyhow};
use std::sync::Mutex;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const BOOTSTRAP_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
}

impl From<&Log> for LogConfig {
    fn from(log: &Log) -> Self {
        Self {
            filter: log.filter.clone(),
        }
    }
}

/// Global subscriber whose filter can be swapped once settings are loaded.
pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
    current: Mutex<String>,
}

impl Logger {
    /// Installs the global subscriber at `info`. Fails when one is already
    /// installed.
    pub fn new_bootstrap() -> Result<Self> {
        let filter = EnvFilter::new(BOOTSTRAP_FILTER);
        let (filter, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| anyhow!(e))?;

        Ok(Self {
            reload_handle,
            current: Mutex::new(BOOTSTRAP_FILTER.to_owned()),
        })
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| anyhow!(e))?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        if let Ok(mut current) = self.current.lock() {
            current.clone_from(&config.filter);
        }
        tracing::debug!(filter = %config.filter, "log filter reloaded");
        Ok(())
    }

    pub fn current_filter(&self) -> String {
        self.current
            .lock()
            .map(|current| current.clone())
            .unwrap_or_default()
    }
}
