use super::TokioTaskScheduler;
use crate::application_impl::*;
use crate::application_port::{LeaseContainer, RegistrationError};
use crate::domain_model::Lease;
use crate::settings::Settings;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;

/// Picks the backend named by `[backend] kind`.
pub fn backend_from_settings(settings: &Settings) -> Result<BackendPorts> {
    let backend = &settings.backend;
    match backend.kind.as_str() {
        "fake" => {
            let fake = FakeVaultBackend::new(FakeBackendConfig {
                lease_ttl: Duration::from_secs(backend.lease_ttl_secs),
                lease_renewable: backend.lease_renewable,
                token_ttl: backend.token_ttl_secs.map(Duration::from_secs),
                token_renewable: backend.token_renewable,
            });
            Ok(fake.ports())
        }
        other => Err(anyhow!("unknown backend kind: {other}")),
    }
}

/// A running lease manager with its executor and log listener.
pub struct LeaseRuntime {
    manager: Arc<LeaseManager>,
    grace: Duration,
}

impl LeaseRuntime {
    pub fn open(settings: &Settings, backend: BackendPorts) -> Result<Self> {
        if settings.scheduler.workers == 0 {
            return Err(ConfigError::NoWorkers.into());
        }
        let executor = Arc::new(TokioTaskScheduler::new(settings.scheduler.workers));
        let manager = LeaseManager::open(
            backend,
            executor,
            settings.retry_policy()?,
            settings.renewal_config()?,
        );
        manager.subscribe(Arc::new(TracingListener));
        tracing::info!(workers = settings.scheduler.workers, "lease runtime opened");

        Ok(Self {
            manager,
            grace: settings.shutdown_grace(),
        })
    }

    pub fn manager(&self) -> &Arc<LeaseManager> {
        &self.manager
    }

    /// Acquires every `[[lease]]` from the settings. Stops at the first
    /// failure.
    pub async fn acquire_configured(
        &self,
        settings: &Settings,
    ) -> Result<Vec<Lease>, RegistrationError> {
        let mut acquired = Vec::with_capacity(settings.leases.len());
        for secret in &settings.leases {
            acquired.push(self.manager.acquire(&secret.path, secret.mode).await?);
        }
        Ok(acquired)
    }

    pub async fn close(&self) {
        self.manager.close(self.grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{LeaseMode, Ratio};
    use crate::settings::*;

    fn settings(kind: &str, workers: usize) -> Settings {
        Settings {
            log: Log {
                filter: "info".into(),
            },
            scheduler: Scheduler {
                workers,
                shutdown_grace_ms: 1000,
            },
            renewal: Renewal {
                threshold: Ratio::two_thirds(),
                request_timeout_ms: 1000,
                revoke_on_close: true,
            },
            retry: Retry {
                max_attempts: 3,
                base_delay_ms: 100,
                max_delay_ms: 1000,
                multiplier: 2.0,
            },
            backend: Backend {
                kind: kind.into(),
                lease_ttl_secs: 30,
                lease_renewable: true,
                token_ttl_secs: Some(60),
                token_renewable: true,
            },
            leases: vec![
                Secret {
                    path: "database/creds/app".into(),
                    mode: LeaseMode::Renew,
                },
                Secret {
                    path: "aws/creds/deploy".into(),
                    mode: LeaseMode::Rotate,
                },
            ],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquires_configured_leases_and_closes() {
        let settings = settings("fake", 2);
        let runtime = LeaseRuntime::open(&settings, backend_from_settings(&settings).unwrap()).unwrap();

        let acquired = runtime.acquire_configured(&settings).await.unwrap();
        assert_eq!(acquired.len(), 2);
        assert_eq!(runtime.manager().list().len(), 2);

        runtime.close().await;
        assert!(runtime.manager().is_closed());
        assert!(runtime.manager().list().is_empty());
    }

    #[test]
    fn unknown_backend_kind_is_rejected() {
        assert!(backend_from_settings(&settings("vault-enterprise", 2)).is_err());
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() {
        let settings = settings("fake", 0);
        let backend = backend_from_settings(&settings).unwrap();
        assert!(LeaseRuntime::open(&settings, backend).is_err());
    }
}
