//! pitdb CLI
//!
//! Command-line interface for a local pitdb store:
//! - Browse the catalog
//! - Query, import and export datasets
//! - Remove and move datasets
//! - Inspect update watermarks

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pitdb::config::{generate_default_config, Config, LoggingConfig};
use pitdb::storage::{
    write_csv, write_group_csv, Catalog, Classification, CsvReader, Database, Frame, FrameGroup,
    MatchMode, NodeId,
};
use pitdb::updater::Watermarks;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pitdb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Point-in-time market data store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root, overriding the config file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands working on an open store
#[derive(Subcommand)]
pub enum StoreCommand {
    /// Print the catalog tree
    Tree,

    /// List all datasets
    List {
        /// Only show paths containing this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Find datasets and namespaces by name
    Find {
        name: String,
        /// Match names containing `name` instead of equal to it
        #[arg(long)]
        contains: bool,
    },

    /// Query a dataset
    Query {
        /// Dotted dataset path, or a dataset name unique in the catalog
        path: String,
        /// Classification, e.g. STRUCTURED,CHAR,PANEL (default: from the catalog)
        #[arg(long)]
        class: Option<Classification>,
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last date (default: cross section at start)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Query several datasets of the same shape together
    QueryGroup {
        /// Dataset names or dotted paths
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Import a CSV file into a dataset
    Import {
        /// Path to CSV file
        file: PathBuf,
        /// Dotted dataset path
        path: String,
        #[arg(long)]
        class: Classification,
        /// Date format (strftime format)
        #[arg(long, default_value = "%Y-%m-%d")]
        date_format: String,
        /// Parse only, don't write
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a dataset
    Remove {
        path: String,
        #[arg(long)]
        class: Classification,
    },

    /// Move a dataset to another path
    Move {
        source: String,
        dest: String,
        #[arg(long)]
        class: Classification,
    },

    /// Show update watermarks
    Watermarks,
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pitdb={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config { output } => write_default_config(output),
        Commands::Store(command) => run(command, cli.config, cli.db),
    }
}

fn write_default_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("writing config to {:?}", path))?;
            println!("Config written to {:?}", path);
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn run(
    command: StoreCommand,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(db) = db_path {
        config.store.db_path = db;
    }
    init_logging(&config.logging);
    tracing::debug!("pitdb v{} at {:?}", env!("CARGO_PKG_VERSION"), config.store.db_path);

    let watermark_path = config.updater.watermark_path(&config.store);
    let mut db = Database::open(config.store)?;

    match command {
        StoreCommand::Tree => {
            let catalog = db.catalog();
            print_tree(catalog, catalog.root(), 0);
        }

        StoreCommand::List { filter } => {
            let datasets = db.list_data();
            if datasets.is_empty() {
                println!("No datasets stored yet.");
            } else {
                println!("{:<40} {}", "Path", "Classification");
                println!("{}", "-".repeat(72));
                for (path, class) in datasets {
                    if filter.as_deref().map_or(true, |f| path.contains(f)) {
                        println!("{:<40} {}", path, class);
                    }
                }
            }
        }

        StoreCommand::Find { name, contains } => {
            let mode = if contains {
                MatchMode::Contains
            } else {
                MatchMode::Exact
            };
            let found = db.find_data(&name, mode);
            if found.is_empty() {
                println!("Nothing named {:?}", name);
            }
            for path in found {
                println!("{}", path);
            }
        }

        StoreCommand::Query {
            path,
            class,
            start,
            end,
            format,
        } => {
            let frame = match class {
                Some(class) => db.query(&path, class, start, end)?,
                None => db.query_named(&path, start, end)?,
            };
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&frame_to_json(&frame))?),
                "csv" => write_csv(&frame, std::io::stdout().lock())?,
                "table" => print_table(&frame),
                other => bail!("unknown output format: {}", other),
            }
        }

        StoreCommand::QueryGroup {
            names,
            start,
            end,
            format,
        } => {
            let group = db.query_group(names.as_slice(), start, end)?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&group_to_json(&group))?),
                "csv" => write_group_csv(&group, std::io::stdout().lock())?,
                "table" => {
                    for (name, frame) in group.iter() {
                        println!("== {}", name);
                        print_table(frame);
                        println!();
                    }
                }
                other => bail!("unknown output format: {}", other),
            }
        }

        StoreCommand::Import {
            file,
            path,
            class,
            date_format,
            dry_run,
        } => {
            let Some(layout) = class.layout() else {
                bail!("{} does not describe tabular data", class);
            };
            let input = std::fs::File::open(&file)
                .with_context(|| format!("opening {:?}", file))?;
            let frame = CsvReader::new()
                .with_date_format(&date_format)
                .read(input, layout)?;

            println!("Rows: {}", frame.len());
            if let (Some(first), Some(last)) = (frame.start_time(), frame.end_time()) {
                println!("Range: {} .. {}", first, last);
            }
            if let Some(symbols) = frame.symbols() {
                println!("Symbols: {}", symbols.len());
            }

            if dry_run {
                println!();
                println!("(Dry run - no data was imported)");
            } else {
                db.insert(&frame, &path, class)?;
                println!("Imported into {}", path);
            }
        }

        StoreCommand::Remove { path, class } => {
            if db.remove(&path, class)? {
                println!("Removed {}", path);
            } else {
                println!("No dataset at {}", path);
            }
        }

        StoreCommand::Move {
            source,
            dest,
            class,
        } => {
            if db.move_to(&source, &dest, class)? {
                println!("Moved {} to {}", source, dest);
            } else {
                println!("No dataset at {}", source);
            }
        }

        StoreCommand::Watermarks => {
            let marks = Watermarks::load(&watermark_path)?;
            if marks.is_empty() {
                println!("Nothing has been updated yet.");
            }
            for (name, date) in marks.iter() {
                println!("{:<40} {}", name, date);
            }
        }
    }

    Ok(())
}

fn print_tree(catalog: &Catalog, id: NodeId, depth: usize) {
    let name = catalog.name(id).unwrap_or("?");
    match catalog.classification(id) {
        Some(class) => println!("{}{} [{}]", "  ".repeat(depth), name, class),
        None => println!("{}{}/", "  ".repeat(depth), name),
    }
    for child in catalog.children(id) {
        print_tree(catalog, *child, depth + 1);
    }
}

fn frame_to_json(frame: &Frame) -> serde_json::Value {
    let rows: serde_json::Map<String, serde_json::Value> = frame
        .iter()
        .map(|(date, row)| {
            let value = match frame.symbols() {
                Some(symbols) => serde_json::json!(symbols
                    .iter()
                    .zip(row)
                    .collect::<BTreeMap<_, _>>()),
                None => serde_json::json!(row.first()),
            };
            (date.to_string(), value)
        })
        .collect();
    serde_json::Value::Object(rows)
}

fn group_to_json(group: &FrameGroup) -> serde_json::Value {
    let members: serde_json::Map<String, serde_json::Value> = group
        .iter()
        .map(|(name, frame)| (name.to_string(), frame_to_json(frame)))
        .collect();
    serde_json::Value::Object(members)
}

fn print_table(frame: &Frame) {
    if frame.is_empty() {
        println!("No data in range.");
        return;
    }

    let columns: Vec<String> = match frame.symbols() {
        Some(symbols) => symbols.to_vec(),
        None => vec!["value".to_string()],
    };
    print!("{:<12}", "date");
    for column in &columns {
        print!(" {:>12}", column);
    }
    println!();
    println!("{}", "-".repeat(12 + 13 * columns.len()));

    for (date, row) in frame.iter() {
        print!("{:<12}", date);
        for cell in row {
            print!(" {:>12}", cell.to_string());
        }
        println!();
    }
}
