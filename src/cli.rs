//! 命令行界面定义
//!
//! 定义了 fleetd 的命令行参数和子命令
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleetd")]
#[command(version)]
#[command(about = "Lab fleet services: Karte, Weetbix, UFS and Inventory over a shared datastore")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml")]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_subcommand() {
        let cli = Cli::parse_from(["fleetd", "test", "/tmp/fleet.toml"]);
        match cli.command {
            Some(Commands::Test { config_file }) => {
                assert_eq!(config_file, Some(PathBuf::from("/tmp/fleet.toml")));
            }
            None => panic!("expected test subcommand"),
        }
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_parse_config_flag() {
        let cli = Cli::parse_from(["fleetd", "--config", "/etc/fleetd/prod.toml"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("/etc/fleetd/prod.toml"));
    }
}
