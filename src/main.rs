use anyhow::{Context, Result};
use clap::Parser;
use sqlmapper::{SqlMapConfig, SqlMapDefinition};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Validates SqlMap definition files without touching a database.
#[derive(Parser, Debug)]
#[command(name = "sqlmapper", version, about)]
struct Args {
    /// Definition files (JSON), resolved together
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print every resolved statement
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load(args: &Args) -> Result<SqlMapConfig> {
    let mut builder = SqlMapConfig::builder().lenient_classes(true);
    for path in &args.files {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let definition = SqlMapDefinition::from_json(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        builder = builder.definition(definition);
    }
    Ok(builder.build()?)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration rejected: {:#}", e);
            return Err(e);
        }
    };

    if args.verbose {
        for id in config.statement_ids() {
            let statement = config.statement(id)?;
            info!(
                statement = id,
                kind = ?statement.kind,
                parameters = statement.parameter_map.parameter_count(),
                cache_model = statement.cache_model.as_ref().map(|m| m.id()),
                "{}",
                statement.sql
            );
        }
    }

    info!(
        files = args.files.len(),
        statements = config.statement_ids().len(),
        "Configuration is valid"
    );
    Ok(())
}
