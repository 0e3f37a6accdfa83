mod cli;

use anyhow::anyhow;
use clap::Parser;
use snapex_chaindb::{ChainStore, RocksDbStore};
use snapex_snapshot::publish::{FilePublisher, Publisher};
use snapex_snapshot::{SnapshotConfig, SnapshotMode, SnapshotParams, SnapshotService};
use tracing::{error, info};
use tracing_subscriber::{filter::Directive, EnvFilter};

use crate::cli::CLI;

fn main() {
    let cli = CLI::parse();
    init_tracing(&cli);

    if let Err(err) = run(cli) {
        error!(%err, "state snapshot failed");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &CLI) {
    let filter = EnvFilter::builder()
        .with_default_directive(Directive::from(cli.log_level))
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: CLI) -> anyhow::Result<()> {
    let config = cli.into_config();
    config.validate()?;

    info!(
        db = %config.db_path.display(),
        mode = config.mode.as_str(),
        "opening chain store"
    );
    let store = RocksDbStore::open(&config.db_path, config.ancient_db_path.as_deref())?;

    match config.mode {
        SnapshotMode::File => {
            let publisher = FilePublisher::new(&config.output_dir)?;
            run_snapshot(store, publisher, &config)
        }
        SnapshotMode::Relational => run_relational(store, &config),
    }
}

#[cfg(feature = "postgres")]
fn run_relational(store: RocksDbStore, config: &SnapshotConfig) -> anyhow::Result<()> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow!("relational mode requires --database.url"))?;
    let publisher = snapex_snapshot::publish::PgPublisher::connect(url)?;
    run_snapshot(store, publisher, config)
}

#[cfg(not(feature = "postgres"))]
fn run_relational(_store: RocksDbStore, _config: &SnapshotConfig) -> anyhow::Result<()> {
    Err(anyhow!(
        "relational mode is not compiled in; rebuild with the `postgres` feature"
    ))
}

fn run_snapshot<S, P>(store: S, publisher: P, config: &SnapshotConfig) -> anyhow::Result<()>
where
    S: ChainStore,
    P: Publisher,
{
    let service = SnapshotService::new(store, publisher, config.recovery_file());
    let watched = config.watched_accounts.clone();
    if config.height < 0 {
        service.create_latest_snapshot(config.workers, watched)?;
    } else {
        service.create_snapshot(SnapshotParams {
            height: config.height as u64,
            workers: config.workers,
            watched_addresses: watched,
        })?;
    }
    info!("snapshot finished");
    Ok(())
}
