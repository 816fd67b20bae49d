use leasekeeper::settings::*;

fn main() -> anyhow::Result<()> {
    // Load settings from the default location
    let project_settings = parse_settings(None)?;
    println!("Loaded settings: {:?}", project_settings);
    println!("Renewal config: {:?}", project_settings.renewal_config()?);
    println!("Retry policy: {:?}", project_settings.retry_policy()?);

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // $ cargo run --bin settings_demo -- --settings=settings/release
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    println!("Loaded settings: {:?}", project_settings);
    Ok(())
}
