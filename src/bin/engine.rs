//! Context Engine CLI
//!
//! Validates a context repository, exports its relationship graph and runs
//! impact analysis. Results go to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use context_engine::config::OutputFormat;
use context_engine::{Engine, EngineConfig, EngineError, ImpactOptions, TraversalDirection};

#[derive(Parser)]
#[command(name = "context-engine")]
#[command(about = "Validate context repositories and analyze change impact")]
#[command(version)]
struct Cli {
    /// Repository root
    #[arg(short, long, env = "CONTEXT_REPO_PATH")]
    repo: Option<PathBuf>,

    /// Explicit config file, layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every artifact against its schema and every reference
    Validate,

    /// Build the relationship graph
    BuildGraph {
        #[arg(short, long, value_enum, default_value_t = GraphFormat::Json)]
        format: GraphFormat,
    },

    /// Report artifacts affected by a set of changed ids
    Impact {
        /// Changed artifact ids (comma separated or repeated)
        #[arg(short, long = "ids", value_delimiter = ',', required = true)]
        ids: Vec<String>,

        /// Rule table (defaults to the configured rules path)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Repository root holding the state before the change
        #[arg(long)]
        before: Option<PathBuf>,

        /// Maximum traversal depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Edge direction followed when collecting stale artifacts
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },

    /// Overview, gaps and recommendations
    Inspect,

    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Json,
    Dot,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Outgoing,
    Incoming,
    Both,
}

impl From<DirectionArg> for TraversalDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Outgoing => TraversalDirection::Outgoing,
            DirectionArg::Incoming => TraversalDirection::Incoming,
            DirectionArg::Both => TraversalDirection::Both,
        }
    }
}

#[derive(Serialize)]
struct FatalError {
    error: FatalErrorBody,
}

#[derive(Serialize)]
struct FatalErrorBody {
    code: String,
    message: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            match serde_json::to_string(&FatalError::from(&e)) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("Error: {:#}", e),
            }
            std::process::exit(1);
        }
    }
}

impl From<&anyhow::Error> for FatalError {
    fn from(e: &anyhow::Error) -> Self {
        let code = e
            .downcast_ref::<EngineError>()
            .map(|engine| engine.code().to_string())
            .unwrap_or_else(|| "internal".to_string());
        Self {
            error: FatalErrorBody {
                code,
                message: format!("{:#}", e),
            },
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = EngineConfig::load_from(cli.config.as_deref()).map_err(EngineError::from)?;

    if let Commands::Config { write } = &cli.command {
        match write {
            Some(path) => config
                .save(path)
                .with_context(|| format!("writing config to {}", path.display()))?,
            None => print!("{}", config.to_toml()?),
        }
        return Ok(0);
    }

    let root = cli.repo.clone().unwrap_or_else(|| config.repository.root.clone());
    let compact = cli.compact || config.output.format == OutputFormat::Compact;
    let engine = Engine::open(&root, config)?;

    match cli.command {
        Commands::Validate => {
            let output = engine.validate()?;
            emit(&output, compact)?;
            Ok(output.exit_code())
        }

        Commands::BuildGraph { format } => {
            let output = engine.build_graph()?;
            match format {
                GraphFormat::Json => emit(&output, compact)?,
                GraphFormat::Dot => print!("{}", output.build.graph.to_dot()),
            }
            Ok(output.exit_code())
        }

        Commands::Impact { ids, rules, before, max_depth, direction } => {
            let defaults = ImpactOptions::from(&engine.config().impact);
            let options = ImpactOptions {
                max_depth: max_depth.or(defaults.max_depth),
                direction: direction.map(Into::into).unwrap_or(defaults.direction),
            };
            let ids: Vec<String> = ids
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect();

            let report = engine
                .impact(&ids, rules.as_deref(), before.as_deref(), Some(options))
                .with_context(|| format!("impact analysis for {}", root.display()))?;
            emit(&report, compact)?;
            Ok(0)
        }

        Commands::Inspect => {
            let report = engine.inspect()?;
            emit(&report, compact)?;
            Ok(0)
        }

        Commands::Config { .. } => Ok(0),
    }
}

fn emit<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}
