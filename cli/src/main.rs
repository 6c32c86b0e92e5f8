mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sopn::config::{default_config_path, load_config};
use sopn::{BallotFilter, Config, Database, TableFlavor};

#[derive(Parser, Debug)]
#[command(
    name = "sopn",
    version,
    about = "Extract candidate nominations from Statements of Persons Nominated"
)]
struct Cli {
    /// Config file. Defaults to ~/.sopn/sopn.json when it exists.
    #[arg(long, global = true, env = "SOPN_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach a document to a ballot and map its pages.
    Upload {
        #[arg(long)]
        ballot: String,
        #[arg(long)]
        file: PathBuf,
        /// Where the council published the document.
        #[arg(long)]
        source_url: String,
    },
    /// Run every missing stage for a set of ballots.
    Sweep {
        #[command(flatten)]
        filter: FilterArgs,
        /// Run every stage again, even where output exists.
        #[arg(long)]
        reparse: bool,
        /// Table flavor for this run.
        #[arg(long)]
        flavor: Option<TableFlavor>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Advance OCR jobs and parse the ballots whose jobs finished.
    OcrSweep {
        #[arg(long)]
        json: bool,
    },
    /// Send a ballot's document to OCR again after its last job failed.
    OcrRetry {
        #[arg(long)]
        ballot: String,
    },
    /// List OCR jobs.
    OcrJobs {
        /// Only jobs in this state (submitted, succeeded, failed).
        #[arg(long)]
        status: Option<String>,
    },
    /// Match a party label against the register.
    MatchParty {
        text: String,
        /// Only consider parties of this register (GB or NI).
        #[arg(long)]
        register: Option<String>,
        /// Prompt for an answer when nothing matches.
        #[arg(long)]
        interactive: bool,
    },
    /// Load ballots from a JSON array.
    ImportBallots { file: PathBuf },
    /// Load parties and their descriptions from a JSON array.
    ImportParties { file: PathBuf },
    /// Print a ballot's draft records as JSON.
    Drafts {
        #[arg(long)]
        ballot: String,
    },
    /// List party labels waiting for a human answer.
    Reviews,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct FilterArgs {
    /// Ballots of current elections (the default).
    #[arg(long)]
    current: bool,
    #[arg(long, value_name = "SLUG")]
    election: Option<String>,
    #[arg(long, value_name = "ID")]
    ballot: Option<String>,
    /// Every ballot, current or not.
    #[arg(long)]
    all: bool,
}

impl FilterArgs {
    fn filter(&self) -> BallotFilter {
        if let Some(slug) = &self.election {
            BallotFilter::Election(slug.clone())
        } else if let Some(id) = &self.ballot {
            BallotFilter::Ballot(id.clone())
        } else if self.all {
            BallotFilter::All
        } else {
            BallotFilter::Current
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the tracing subscriber")?;
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    Ok(())
}

fn config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        return load_config(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()));
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display())),
        _ => {
            debug!("No config file, using defaults");
            Ok(Config::default())
        }
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config
        .database_file()
        .context("No database_path configured and no home directory")?;
    Database::open(&path).with_context(|| format!("Failed to open '{}'", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = config(cli.config.as_ref())?;
    let db = open_database(&config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "sopn starting");

    match cli.command {
        Command::Upload {
            ballot,
            file,
            source_url,
        } => commands::upload(&config, db, &ballot, &file, &source_url),
        Command::Sweep {
            filter,
            reparse,
            flavor,
            json,
        } => commands::sweep(&config, db, &filter.filter(), reparse, flavor, json).await,
        Command::OcrSweep { json } => commands::ocr_sweep(&config, db, json).await,
        Command::OcrRetry { ballot } => commands::ocr_retry(&config, db, &ballot).await,
        Command::OcrJobs { status } => commands::ocr_jobs(&db, status.as_deref()),
        Command::MatchParty {
            text,
            register,
            interactive,
        } => commands::match_party(&config, db, &text, register.as_deref(), interactive),
        Command::ImportBallots { file } => commands::import_ballots(&db, &file),
        Command::ImportParties { file } => commands::import_parties(&db, &file),
        Command::Drafts { ballot } => commands::drafts(&db, &ballot),
        Command::Reviews => commands::reviews(&db),
    }
}
