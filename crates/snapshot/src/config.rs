use std::path::PathBuf;
use std::str::FromStr;

use ethereum_types::Address;

use crate::ConfigError;

/// Which publisher backend a run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Row-oriented records into a relational store.
    Relational,
    /// CSV-like files on disk.
    #[default]
    File,
}

impl FromStr for SnapshotMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relational" => Ok(SnapshotMode::Relational),
            "file" => Ok(SnapshotMode::File),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl SnapshotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotMode::Relational => "relational",
            SnapshotMode::File => "file",
        }
    }
}

/// Explicit run configuration handed to the orchestrator; binding these
/// values to CLI flags or environment is the binary's concern.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub mode: SnapshotMode,
    /// Block height to snapshot; negative means "latest available header".
    pub height: i64,
    pub workers: usize,
    /// Journal location; `None` selects `./<height>_snapshot_recovery`.
    pub recovery_path: Option<PathBuf>,
    /// Accounts to restrict the snapshot to; `None` disables filtering,
    /// `Some(vec![])` is address-selective mode with nothing watched.
    pub watched_accounts: Option<Vec<Address>>,
    pub db_path: PathBuf,
    pub ancient_db_path: Option<PathBuf>,
    /// File-mode output directory.
    pub output_dir: PathBuf,
    /// Relational-mode connection string.
    pub database_url: Option<String>,
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers < 1 {
            return Err(ConfigError::NoWorkers);
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingDbPath);
        }
        if self.mode == SnapshotMode::Relational && self.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    /// The journal path for this run.
    pub fn recovery_file(&self) -> PathBuf {
        self.recovery_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("./{}_snapshot_recovery", self.height)))
    }
}
