//! flowmeta: inspect and exercise a metadata configuration.
//!
//! Build: `cargo build --bin flowmeta --features cli`

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::time::Instant;
use tracing::info;

use flowmeta::providers::ProviderRegistry;
use flowmeta::{Metadata, MetadataCache, MetadataError, Query, Settings};

#[derive(Parser)]
#[command(name = "flowmeta")]
#[command(version = flowmeta::PKG_VERSION)]
#[command(about = "Exporter and interface metadata for flow enrichment")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the configuration and print the effective settings
    Check {
        /// Path to configuration file
        #[arg(short, long, env = "FLOWMETA_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Resolve interfaces through the configured providers
    Lookup {
        /// Path to configuration file
        #[arg(short, long, env = "FLOWMETA_CONFIG")]
        config: Option<PathBuf>,
        /// How long to wait for answers
        #[arg(short, long, default_value_t = 2000)]
        wait_ms: u64,
        /// Queries, as EXPORTER:IFINDEX (e.g. 192.0.2.1:10, [2001:db8::1]:10)
        #[arg(required = true, value_parser = parse_query)]
        queries: Vec<Query>,
    },

    /// Print the content of a cache snapshot
    CacheDump {
        /// Snapshot file
        path: PathBuf,
    },

    /// Print version and build information
    Version,
}

fn parse_query(s: &str) -> Result<Query, String> {
    let (exporter, if_index) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected EXPORTER:IFINDEX, got {s:?}"))?;
    let exporter = exporter.trim_start_matches('[').trim_end_matches(']');
    let exporter: IpAddr = exporter
        .parse()
        .map_err(|e| format!("invalid exporter {exporter:?}: {e}"))?;
    let if_index: u32 = if_index
        .parse()
        .map_err(|e| format!("invalid interface index {if_index:?}: {e}"))?;
    Ok(Query::new(exporter, if_index))
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn check(config: Option<&Path>) -> Result<(), MetadataError> {
    let settings = Settings::load(config)?;
    let configuration = settings.configuration()?;
    let registry = ProviderRegistry::with_builtin();
    let providers = settings.providers(&registry)?;
    let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!(
        "configuration ok: providers {}, {} worker(s), queue of {}",
        names.join(" > "),
        configuration.workers,
        configuration.queue_capacity()
    );
    Ok(())
}

async fn lookup(
    config: Option<&Path>,
    wait: Duration,
    queries: Vec<Query>,
) -> Result<(), MetadataError> {
    let settings = Settings::load(config)?;
    let registry = ProviderRegistry::with_builtin();
    let metadata = Metadata::builder(settings.configuration()?)
        .providers(settings.providers(&registry)?)
        .build()?;
    metadata.start()?;
    info!(
        version = flowmeta::version_string(),
        providers = ?metadata.provider_names(),
        "flowmeta lookup"
    );

    let deadline = Instant::now() + wait;
    let mut pending = queries;
    loop {
        let now = SystemTime::now();
        let mut unresolved = Vec::new();
        for query in pending {
            match metadata.lookup(now, query.exporter(), query.if_index) {
                Some(answer) => println!(
                    "{}",
                    json!({
                        "exporter": query.exporter(),
                        "if_index": query.if_index,
                        "answer": answer,
                    })
                ),
                None => unresolved.push(query),
            }
        }
        pending = unresolved;
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    for query in &pending {
        eprintln!("{query}: no answer");
    }

    metadata.stop().await;
    Ok(())
}

fn cache_dump(path: &Path) -> Result<(), MetadataError> {
    let cache = MetadataCache::new();
    cache.load(path)?;
    let mut entries = cache.entries();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    for entry in entries {
        println!(
            "{}",
            json!({
                "exporter": entry.key.exporter(),
                "if_index": entry.key.if_index,
                "answer": entry.value,
                "last_access": unix_secs(entry.last_access),
                "last_update": unix_secs(entry.last_update),
            })
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Check { ref config } => check(config.as_deref()),
        Command::Lookup {
            ref config,
            wait_ms,
            queries,
        } => lookup(config.as_deref(), Duration::from_millis(wait_ms), queries).await,
        Command::CacheDump { ref path } => cache_dump(path),
        Command::Version => {
            println!("flowmeta {}", flowmeta::version_string());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
