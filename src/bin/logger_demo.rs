use leasekeeper::logger::*;

fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap()?;
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!(filter = %logger.current_filter(), "bootstrap info log");

    let config = LogConfig {
        filter: "debug".to_string(),
    };
    logger.reload_from_config(&config)?;
    trace!("application trace log");
    debug!("application debug log");
    info!(filter = %logger.current_filter(), "application info log");

    // an invalid directive leaves the previous filter in place
    let rejected = logger.reload_from_config(&LogConfig {
        filter: "=[".to_string(),
    });
    warn!(rejected = rejected.is_err(), filter = %logger.current_filter());

    Ok(())
}
