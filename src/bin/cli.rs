//! driftkv CLI
//!
//! Command-line interface for inspecting and editing a driftkv log.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use driftkv::{Config, EventKind, Flow, Store, Value};
use parking_lot::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

/// driftkv CLI
#[derive(Parser, Debug)]
#[command(name = "driftkv-cli")]
#[command(about = "CLI for the driftkv append-only key-value store")]
#[command(version)]
struct Args {
    /// Log file
    #[arg(short, long, default_value = "./driftkv.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set (parsed as JSON, otherwise stored as a string)
        value: String,
    },

    /// Delete a key
    Rm {
        /// The key to delete
        key: String,
    },

    /// Print entries in insertion order
    List {
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the number of live keys
    Count,

    /// Load the log and report skipped records
    Check,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,driftkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("driftkv-cli v{} on {}", driftkv::VERSION, args.db.display());

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> driftkv::Result<()> {
    let config = Config::builder().log_path(&args.db).build();
    let mut store = Store::open(config)?;

    // Collect recoverable load problems for `check`; surface the rest
    let issues = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&issues);
    store.on(EventKind::Error, move |event| {
        if let driftkv::Event::Error(e) = event {
            if e.is_recoverable_load_error() {
                sink.lock().push(e.to_string());
            } else {
                tracing::error!("{}", e);
            }
        }
    });

    store.wait_ready()?;

    match args.command {
        Commands::Get { key } => match store.get(&key) {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("(not found)");
                std::process::exit(2);
            }
        },
        Commands::Set { key, value } => {
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            store.set(key, value);
            store.wait_drained()?;
        }
        Commands::Rm { key } => {
            store.remove(key);
            store.wait_drained()?;
        }
        Commands::List { limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut printed = 0;
            store.for_each(|key, value| {
                if printed >= limit {
                    return Flow::Stop;
                }
                println!("{}\t{}", key, value);
                printed += 1;
                Flow::Continue
            });
        }
        Commands::Count => println!("{}", store.len()),
        Commands::Check => {
            let stats = store.load_stats();
            println!("records applied:   {}", stats.records_applied);
            println!("empty records:     {}", stats.empty_records);
            println!("corrupted records: {}", stats.corrupted_records);
            println!("live keys:         {}", store.len());
            for issue in issues.lock().iter() {
                println!("  {}", issue);
            }
        }
    }

    store.close();
    store.wait_closed()
}
