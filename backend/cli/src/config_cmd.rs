//! `labelscan config show|init`

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;

use labelscan_config::{apply_all_defaults, load_and_prepare, redact, write_config, LabelScanConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective config with secrets masked
    Show,
    /// Write a config file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(action: &ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_and_prepare(path).await?;
            let masked = redact(&serde_json::to_value(&config)?);
            println!("# {}", path.display());
            print!("{}", serde_yaml::to_string(&masked)?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let config = apply_all_defaults(LabelScanConfig::default());
            write_config(&config, path).await?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
