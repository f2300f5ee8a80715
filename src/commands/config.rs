use clap::{Args, Subcommand};

use crate::commands::{GlobalArgs, Settings};
use crate::config;

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigSubcommand {
    /// Validate the config file, or only the profile selected with --profile
    Check,
    /// Print the config file location
    Path,
}

pub fn run(args: ConfigArgs, global: &GlobalArgs) -> Result<(), String> {
    match args.command {
        ConfigSubcommand::Check => {
            let path = config::validate_config(global.profile.as_deref())?;
            println!("config OK: {}", path.display());
            if global.verbose {
                let settings = Settings::resolve(global)?;
                eprintln!("api_key_present={}", settings.api_key.is_some());
            }
            Ok(())
        }
        ConfigSubcommand::Path => {
            println!("{}", config::config_path()?.display());
            Ok(())
        }
    }
}
