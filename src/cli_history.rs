use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ts3_history_store::config::{CliConfig, FileConfig};
use ts3_history_store::{DbConfig, DbProvider, IdentityKey, MetadataStore, PlayHistoryRepository};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(about = "Inspect the audio bot play history database")]
struct CliArgs {
    /// Path to the SQLite play history database file.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file, its [history] values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Which columns identify a resource in the play history.
    #[clap(long, value_enum)]
    pub identity_key: Option<IdentityKey>,

    /// Newest schema version to read and write, defaults to the latest one.
    #[clap(long)]
    pub supported_version: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shows the stored and supported schema versions.
    Version,

    /// Lists every history entry by id.
    List,

    /// Shows the most played entries.
    Top {
        #[clap(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Shows entry and play totals.
    Stats,

    /// Reads or writes a metadata value.
    Meta {
        #[command(subcommand)]
        command: MetaCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MetaCommand {
    Get { key: String },
    Set { key: String, value: String },
}

fn run(provider: &DbProvider, command: Command) -> Result<()> {
    match command {
        Command::Version => {
            let stored = provider
                .metadata()
                .version()?
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!("stored schema version: {}", stored);
            println!("supported schema version: {}", provider.schema_version());
            println!("identity key: {}", provider.identity_key().as_str());
        }
        Command::List => {
            for entry in provider.play_history().list()? {
                println!("{}", entry);
            }
        }
        Command::Top { limit } => {
            for entry in provider.play_history().most_played(limit)? {
                println!("{}", entry);
            }
        }
        Command::Stats => {
            let stats = provider.play_history().stats()?;
            println!("entries: {}", stats.entries);
            println!("total plays: {}", stats.total_plays);
        }
        Command::Meta { command } => match command {
            MetaCommand::Get { key } => match provider.metadata().get(&key)? {
                Some(value) => println!("{}", value),
                None => println!("{} is not set", key),
            },
            MetaCommand::Set { key, value } => {
                provider.metadata().set(&key, &value)?;
                println!("{} = {}", key, value);
            }
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        supported_version: cli_args.supported_version,
        identity_key: cli_args.identity_key,
    };
    let config = DbConfig::resolve(&cli_config, file_config)?;

    let provider = match DbProvider::open(&config) {
        Ok(provider) => provider,
        Err(err) => {
            if err.is_fatal_at_startup() {
                error!("Cannot use play history database {:?}: {}", config.db_path, err);
            }
            return Err(err).with_context(|| {
                format!("Failed to open play history database {:?}", config.db_path)
            });
        }
    };

    run(&provider, cli_args.command)
}
