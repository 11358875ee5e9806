pub mod config;
pub mod db;
pub mod documents;
pub mod integrity;
pub mod migration;
pub mod sweep;
pub mod util;

use {
    anyhow::Result,
    std::io,
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

pub use crate::{
    config::Config,
    db::Db,
    documents::{DocumentPipeline, GeneratedFile, StoredDocument},
    integrity::{IntegrityReport, check_integrity},
    migration::{BatchMigration, MigrationCounts, MigrationReport},
    sweep::{SweepReport, sweep_plaintext},
};

/// Installs the global subscriber: formatted output to stderr, filtered by
/// `log_filter` in `EnvFilter` syntax.
#[inline]
pub fn setup_logger(log_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_new(log_filter)?)
        .try_init()?;
    Ok(())
}
