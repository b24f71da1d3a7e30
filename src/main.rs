use clap::{Parser, Subcommand};
use cloakjob::config::{self, Config, Strategy};
use cloakjob::engine::{Engine, LocalEngine, RemoteEngine};
use cloakjob::imaging::{Normalizer, SourceLoader};
use cloakjob::job::{self, JobRunner};
use cloakjob::output;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "cloakjob")]
#[command(about = "Run face-anonymization jobs through a local or remote engine")]
#[command(long_about = "\
Run face-anonymization jobs through a local or remote engine

A job is a JSON object (bare, or wrapped as {\"input\": {...}}):

  {
    \"image_url\": \"https://...\",     # or \"image_b64\": \"...\", exactly one
    \"mode\": \"low\",                  # low | mid | high (unknown → low)
    \"format\": \"png\",                # png | jpg (unknown → png)
    \"max_edge\": 2048                # optional downscale bound
  }

The result is printed to stdout as JSON:

  { \"image_b64\": ..., \"format\": ..., \"processing_ms\": ..., \"mode\": ... }
  { \"error\": ..., \"processing_ms\": ... }

Logs go to stderr (RUST_LOG overrides the default filter).

Run 'cloakjob gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); CLOAKJOB_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one job and print its result
    Run {
        /// Job JSON file, or "-" for stdin
        #[arg(long, default_value = "-")]
        input: PathBuf,
        /// Override the configured engine strategy
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
        /// Pretty-print the result JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Validate configuration and print the effective settings
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Run {
            input,
            strategy,
            pretty,
        } => {
            let mut config = load(cli.config.as_deref())?;
            if let Some(strategy) = strategy {
                config.engine.strategy = strategy;
            }
            let payload: serde_json::Value = serde_json::from_str(&read_input(&input)?)?;

            let runner = JobRunner::new(
                Normalizer::new(SourceLoader::new(config.input.fetch_timeout())?),
                build_engine(&config)?,
                config.input.max_edge,
            );
            let result = runner.run(&job::job_input(payload));

            output::print_result_summary(&result);
            println!("{}", output::render_result(&result, pretty)?);
        }
        Command::Check => {
            let config = load(cli.config.as_deref())?;
            build_engine(&config)?;
            output::print_config_summary(&config);
            println!("==> Configuration is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr; stdout is reserved for the result payload.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "cloakjob=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    config::load_config(path, std::env::vars())
}

fn read_input(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
    }
}

fn build_engine(config: &Config) -> Result<Box<dyn Engine>, config::ConfigError> {
    Ok(match config.engine.strategy {
        Strategy::Local => Box::new(LocalEngine::from_config(config)),
        Strategy::Remote => Box::new(RemoteEngine::from_config(&config.engine.remote)?),
    })
}
