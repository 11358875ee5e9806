use {
    anyhow::Result,
    casecrypt_server::{
        BatchMigration, Config, Db, check_integrity, setup_logger, sweep_plaintext,
    },
    clap::{Parser, Subcommand},
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
pub struct Cli {
    /// Config file; defaults to `casecrypt.json5` in the system config dir.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Encrypt all stored records that are still plaintext.
    Migrate {
        /// Report what would be encrypted without writing anything.
        #[clap(long)]
        dry_run: bool,
    },
    /// Decrypt all encrypted records and report damaged ones.
    CheckIntegrity,
    /// Delete plaintext documents that already have a verified encrypted copy.
    SweepPlaintext,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    setup_logger(&config.log_filter)?;
    let ctx = config.cipher_context()?;
    match cli.command {
        Command::Migrate { dry_run } => {
            let db = Db::open(&config.database_path()?)?;
            let report = BatchMigration::new(&db, &ctx)?.dry_run(dry_run).run()?;
            print!("{report}");
        }
        Command::CheckIntegrity => {
            let db = Db::open(&config.database_path()?)?;
            print!("{}", check_integrity(&db, &ctx)?);
        }
        Command::SweepPlaintext => {
            let report = sweep_plaintext(&config.documents_path()?, &ctx.files())?;
            println!(
                "artifacts {}, removed {}, kept {}",
                report.artifacts, report.removed, report.kept
            );
        }
    }
    Ok(())
}
