use super::Parser;

#[derive(Parser, Debug)]
#[command(about = "Keeps Vault leases and the session token alive")]
pub struct Cli {
    /// Path to the settings file, without extension.
    #[arg(long)]
    pub settings: Option<String>,
}
