use std::io;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use cmd::config::Config;
use cmd::config::LogLevel;
use cmd::error::Error;
use cmd::error::Result;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

extern crate parse_duration;

#[derive(Parser, Clone)]
pub struct Run {
    /// Config file, toml/yaml/json
    #[arg(long)]
    config: Option<PathBuf>,
    /// Funnel definition, json
    #[arg(long)]
    funnel: PathBuf,
    /// Events, csv or json lines
    #[arg(long)]
    events: PathBuf,
    /// Stop after this long and report partial results, e.g. "30s"
    #[arg(long)]
    timeout: Option<String>,
    /// Include actor ids per step
    #[arg(long)]
    actors: bool,
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Run a funnel over an events file
    Run(Run),
}

#[derive(Parser)]
#[command(propagate_version = true)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Option<Commands>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let Some(Commands::Run(run)) = args.command else {
        return Err(Error::BadRequest("no command specified".to_string()));
    };

    let mut cfg = Config::load(run.config.as_deref())?;
    if let Some(level) = args.log_level {
        cfg.log.level = level;
    }
    let cfg: common::config::Config = cfg.try_into()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cfg.log.level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let version = env!("CARGO_PKG_VERSION");
    info!("starting funnels v{version}");

    let timeout = run
        .timeout
        .as_deref()
        .map(parse_duration::parse)
        .transpose()?;
    let report = cmd::run(
        &cmd::Run {
            funnel: run.funnel,
            events: run.events,
            timeout,
            actors: run.actors,
        },
        cfg,
    )?;

    let stdout = io::stdout().lock();
    if run.pretty {
        serde_json::to_writer_pretty(stdout, &report)?;
    } else {
        serde_json::to_writer(stdout, &report)?;
    }
    println!();

    Ok(())
}
