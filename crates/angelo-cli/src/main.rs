//! Angelo demo CLI
//!
//! Seeds and inspects the Group / Company / User-Employee demo database.

mod demo;

use angelo_core::{AngeloConfig, Database, SanitizePolicy, StorageConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Angelo demo database tool
#[derive(Parser, Debug)]
#[command(name = "angelo")]
#[command(version, about = "Seed and inspect the Angelo demo database")]
pub struct Args {
    /// Path to the database directory
    #[arg(short, long, default_value = "./angelo_data")]
    pub data: PathBuf,

    /// Use a throwaway in-memory database instead of --data
    #[arg(long)]
    pub temporary: bool,

    /// Log schema building and session details
    #[arg(long)]
    pub debug: bool,

    /// Reject unknown keyword arguments instead of dropping them
    #[arg(long)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Recreate all tables and insert the demo rows
    Seed,
    /// Print every instance of every entity as JSON
    Dump,
    /// Print entities with their columns and relationships
    Schema,
}

impl Args {
    fn config(&self) -> AngeloConfig {
        let storage = if self.temporary {
            StorageConfig::temporary()
        } else {
            StorageConfig::new(&self.data)
        };
        let sanitize = if self.strict {
            SanitizePolicy::Strict
        } else {
            SanitizePolicy::Lenient
        };
        AngeloConfig::new(storage)
            .with_debug(self.debug)
            .with_sanitize(sanitize)
    }
}

fn main() {
    let args = Args::parse();

    let directives = if args.debug {
        "angelo=debug,angelo_core=debug"
    } else {
        "angelo=info,angelo_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives)),
        )
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config();
    let schema = demo::build_schema(&config)?;
    let db = Database::open(config, schema)?;

    match args.command {
        Command::Seed => println!("{}", demo::seed(&db)?),
        Command::Dump => println!("{}", serde_json::to_string_pretty(&demo::dump(&db)?)?),
        Command::Schema => print!("{}", demo::describe(&db)?),
    }

    db.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_onto_config() {
        let args = Args::try_parse_from(["angelo", "--temporary", "--strict", "seed"]).unwrap();
        assert_eq!(args.command, Command::Seed);

        let config = args.config();
        assert!(config.storage.temporary);
        assert_eq!(config.sanitize, SanitizePolicy::Strict);
        assert!(!config.debug);
    }

    #[test]
    fn test_data_path() {
        let args =
            Args::try_parse_from(["angelo", "--data", "/tmp/demo", "--debug", "dump"]).unwrap();
        let config = args.config();
        assert_eq!(config.storage.path, PathBuf::from("/tmp/demo"));
        assert!(config.debug);

        assert!(Args::try_parse_from(["angelo"]).is_err());
    }
}
