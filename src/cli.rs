use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cryptrade")]
#[command(version = "0.1.0")]
#[command(about = "Multi-venue crypto trading bot with layered risk controls", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "CRYPTRADE_CONFIG_DIR", global = true)]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the trading bot (default)
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
    /// Print the resolved configuration as JSON
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_once() {
        let cli = Cli::try_parse_from(["cryptrade", "run", "--once", "-c", "conf"]).expect("parse");
        assert_eq!(cli.config_dir, "conf");
        assert!(matches!(cli.command, Some(Commands::Run { once: true })));
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["cryptrade"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.config_dir, "config");
    }
}
