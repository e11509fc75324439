//! Command-line front end: bulk export/import/snapshot and ad-hoc resolution.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::TranslatorConfig;
use crate::resolver::{TracingMissObserver, Translator};
use crate::store::{SqliteStore, TranslationStore};
use crate::sync::BulkSync;

#[derive(Parser, Debug)]
#[command(name = "scoped-translator")]
#[command(version)]
#[command(about = "Resolve and bulk-sync scoped translations", long_about = None)]
pub struct Args {
    /// Translator configuration (JSON). Defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database holding the translation table
    #[arg(long, default_value = "translations.db")]
    pub db: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export every record to a CSV file
    Export {
        file: PathBuf,
        /// Mutations to export (default: all configured)
        #[arg(short, long = "mutation")]
        mutations: Vec<String>,
    },
    /// Import records from a CSV file
    Import {
        file: PathBuf,
        /// Mutations accepted from the file (default: all configured)
        #[arg(short, long = "mutation")]
        mutations: Vec<String>,
    },
    /// Export into a timestamped file inside a directory
    Snapshot {
        dir: PathBuf,
        #[arg(short, long = "mutation")]
        mutations: Vec<String>,
    },
    /// Resolve identifiers given as `scope.key` or `scope.key=Default text`
    Resolve {
        /// Mutation to resolve under (default: configured default)
        #[arg(short, long)]
        mutation: Option<String>,
        #[arg(required = true)]
        identifiers: Vec<String>,
    },
}

/// Install the global tracing subscriber.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scoped_translator=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => TranslatorConfig::load(path)?,
        None => TranslatorConfig::default(),
    };
    let store: Arc<dyn TranslationStore> = Arc::new(SqliteStore::open(&args.db, &config.registry())?);
    let or_all = |mutations: Vec<String>| {
        if mutations.is_empty() {
            config.registry().codes()
        } else {
            mutations
        }
    };

    match args.command {
        Command::Export { file, mutations } => {
            let rows = BulkSync::new(store).export(&file, &or_all(mutations))?;
            println!("exported {rows} records to {}", file.display());
        }
        Command::Import { file, mutations } => {
            let rows = BulkSync::new(store).import(&file, &or_all(mutations))?;
            println!("imported {rows} records from {}", file.display());
        }
        Command::Snapshot { dir, mutations } => {
            let path = BulkSync::new(store).snapshot(&dir, &or_all(mutations))?;
            println!("snapshot written to {}", path.display());
        }
        Command::Resolve {
            mutation,
            identifiers,
        } => {
            let translator =
                Translator::new(config.clone(), store)?.with_observer(Arc::new(TracingMissObserver));
            let mut session = match &mutation {
                Some(mutation) => translator.session(mutation)?,
                None => translator.default_session(),
            };
            info!(mutation = session.mutation(), "resolving identifiers");

            for entry in &identifiers {
                let entry = entry.as_str();
                let (identifier, default_text) = entry.split_once('=').unwrap_or((entry, entry));
                println!("{identifier}\t{}", session.text(identifier, default_text)?);
            }

            let tracker = session.untranslated();
            if tracker.count() > 0 {
                println!("\nuntranslated: {}", tracker.count());
                for (group, entries) in tracker.grouped(&config.scope_labels) {
                    println!("[{group}]");
                    for (identifier, default_text) in entries {
                        println!("  {identifier}: {default_text}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_mutations() {
        let args = Args::try_parse_from([
            "scoped-translator",
            "--db",
            "t.db",
            "export",
            "out.csv",
            "-m",
            "cs",
            "--mutation",
            "en",
        ])
        .unwrap();
        match args.command {
            Command::Export { file, mutations } => {
                assert_eq!(file, PathBuf::from("out.csv"));
                assert_eq!(mutations, vec!["cs", "en"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn resolve_requires_identifiers() {
        assert!(Args::try_parse_from(["scoped-translator", "resolve"]).is_err());
    }

    #[test]
    fn export_then_import_through_cli() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("t.db");
        let csv = dir.path().join("out.csv");
        let db_arg = db.to_str().unwrap();
        let csv_arg = csv.to_str().unwrap();

        run(Args::try_parse_from(["st", "--db", db_arg, "resolve", "basket.empty=Empty"]).unwrap())
            .unwrap();
        run(Args::try_parse_from(["st", "--db", db_arg, "export", csv_arg]).unwrap()).unwrap();
        run(Args::try_parse_from(["st", "--db", db_arg, "import", csv_arg]).unwrap()).unwrap();
        assert!(std::fs::read(&csv).unwrap().starts_with(crate::sync::BOM));
    }
}
