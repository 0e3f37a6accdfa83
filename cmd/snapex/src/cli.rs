use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use ethereum_types::Address;
use snapex_snapshot::{ConfigError, SnapshotConfig, SnapshotMode};
use tracing::Level;

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "snapex",
    author,
    version = VERSION_STRING,
    about = "Extract an Ethereum world-state snapshot from a chain store",
    long_about = None
)]
pub struct CLI {
    #[arg(
        long = "db.path",
        value_name = "PATH",
        help = "Path to the primary chain store"
    )]
    pub db_path: PathBuf,
    #[arg(
        long = "db.ancient",
        value_name = "PATH",
        help = "Path to the frozen/ancient segment"
    )]
    pub ancient_db_path: Option<PathBuf>,
    #[arg(
        long = "snapshot.height",
        default_value_t = -1,
        allow_negative_numbers = true,
        value_name = "HEIGHT",
        help = "Block height to snapshot; negative selects the latest header"
    )]
    pub height: i64,
    #[arg(
        long = "snapshot.workers",
        default_value_t = 1,
        value_name = "COUNT",
        help = "Number of concurrent subtree workers"
    )]
    pub workers: usize,
    #[arg(
        long = "snapshot.recovery-file",
        value_name = "PATH",
        help = "Recovery journal location; defaults to ./<height>_snapshot_recovery"
    )]
    pub recovery_file: Option<PathBuf>,
    #[arg(
        long = "snapshot.mode",
        default_value = "file",
        value_name = "MODE",
        value_parser = parse_mode,
        help = "Publisher backend: 'relational' or 'file'"
    )]
    pub mode: SnapshotMode,
    #[arg(
        long = "snapshot.accounts",
        value_name = "ADDRESS_LIST",
        value_delimiter = ',',
        num_args = 0..,
        value_parser = parse_address,
        help = "Restrict the snapshot to these accounts (address-selective mode)"
    )]
    pub watched_accounts: Option<Vec<Address>>,
    #[arg(
        long = "output.dir",
        default_value = "./snapshot_output",
        value_name = "DIRECTORY",
        help = "Output directory for file mode"
    )]
    pub output_dir: PathBuf,
    #[arg(
        long = "database.url",
        value_name = "URL",
        help = "Connection string for relational mode"
    )]
    pub database_url: Option<String>,
    #[arg(long = "log.level", default_value_t = Level::INFO, value_name = "LOG_LEVEL")]
    pub log_level: Level,
}

impl CLI {
    pub fn into_config(self) -> SnapshotConfig {
        SnapshotConfig {
            mode: self.mode,
            height: self.height,
            workers: self.workers,
            recovery_path: self.recovery_file,
            watched_accounts: self.watched_accounts,
            db_path: self.db_path,
            ancient_db_path: self.ancient_db_path,
            output_dir: self.output_dir,
            database_url: self.database_url,
        }
    }
}

fn parse_mode(s: &str) -> Result<SnapshotMode, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_str(s.trim_start_matches("0x"))
        .map_err(|_| format!("invalid account address {s:?}"))
}
