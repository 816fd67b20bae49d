use leasekeeper::logger::*;
use leasekeeper::runtime::*;
use leasekeeper::settings::*;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap()?;

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let backend = backend_from_settings(&project_settings)?;
    let runtime = LeaseRuntime::open(&project_settings, backend)?;

    let acquired = runtime.acquire_configured(&project_settings).await;
    match acquired {
        Ok(leases) => info!(count = leases.len(), "configured leases acquired"),
        Err(e) => {
            error!("could not acquire configured leases: {e}");
            runtime.close().await;
            return Err(e.into());
        }
    }

    signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    let shutdown_timeout = project_settings.shutdown_grace() * 2;
    match tokio::time::timeout(shutdown_timeout, runtime.close()).await {
        Ok(_) => info!("lease runtime shutdown successfully"),
        Err(_) => error!("lease runtime shutdown timed out"),
    }

    Ok(())
}
