//! jscache CLI
//!
//! Entry point for the `jscache` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jscache::config::default_config_path;
use jscache::{CacheIndex, CacheSettings, EffectiveConfig, FsBlobStore, SystemClock};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "jscache")]
#[command(about = "Cache for remote JavaScript source and bytecode", version)]
struct Cli {
    /// Cache directory (overrides the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Path to config file (default: ~/.config/jscache/config.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a script through the cache and print its source
    Resolve {
        /// Script URL
        url: String,

        /// Validity window for a freshly fetched copy, in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,

        /// Ignore a fresh cached copy
        #[arg(long)]
        refresh: bool,
    },

    /// Show cache statistics
    Stats,

    /// List cached URLs
    List,

    /// Remove one cached URL
    Remove {
        /// Script URL
        url: String,
    },

    /// Remove everything from the cache
    Clear,

    /// Drop expired and incomplete entries and stale temp files
    Gc {
        /// Minimum age of temp files to delete, in seconds
        #[arg(long, default_value_t = 3600)]
        max_temp_age_secs: u64,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let effective = match load_config(cli.config.clone(), cli.cache_dir.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    let settings = match effective.settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Resolve {
            url,
            ttl_secs,
            refresh,
        } => run_resolve(&settings, &url, ttl_secs, refresh, cli.json),
        Commands::Stats => run_stats(&settings, cli.json),
        Commands::List => run_list(&settings, cli.json),
        Commands::Remove { url } => run_remove(&settings, &url, cli.json),
        Commands::Clear => run_clear(&settings, cli.json),
        Commands::Gc { max_temp_age_secs } => {
            run_gc(&settings, Duration::from_secs(max_temp_age_secs), cli.json)
        }
        Commands::Config => run_config(&effective),
    }
}

fn load_config(
    config_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
) -> Result<EffectiveConfig, jscache::ConfigError> {
    let path = config_path.or_else(|| default_config_path().filter(|p| p.exists()));
    let cli = serde_json::json!({ "cache_dir": cache_dir });
    EffectiveConfig::build(path.as_deref(), Some(cli))
}

fn open_store(settings: &CacheSettings) -> Arc<FsBlobStore> {
    match FsBlobStore::open(&settings.cache_dir, settings.timeouts().lock_timeout()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!(
                "Error opening cache at {}: {}",
                settings.cache_dir.display(),
                e
            );
            process::exit(1);
        }
    }
}

fn open_index(settings: &CacheSettings, store: Arc<FsBlobStore>) -> Arc<CacheIndex> {
    Arc::new(CacheIndex::open(
        store,
        settings.index_limits(),
        Arc::new(SystemClock),
    ))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    url: &'a str,
    served_from_cache: bool,
    source_bytes: usize,
    has_bytecode: bool,
    source: &'a str,
}

#[cfg(feature = "http-ureq")]
fn run_resolve(settings: &CacheSettings, url: &str, ttl_secs: Option<u64>, refresh: bool, json: bool) {
    use jscache::http::UreqClient;
    use jscache::{ResolveOptions, Resolver};

    let index = open_index(settings, open_store(settings));
    let http = UreqClient::new(settings.timeouts().fetch_timeout())
        .with_user_agent(settings.http.user_agent.clone())
        .with_max_body_bytes(settings.http.max_body_bytes);
    let resolver = Resolver::new(index, Arc::new(http), None, settings.resolver_options());

    let opts = ResolveOptions {
        ttl: ttl_secs.map(Duration::from_secs),
        force_refresh: refresh,
    };
    let result = resolver.resolve_with(url, opts);
    resolver.shutdown();

    match result {
        Ok(resource) => {
            if json {
                print_json(&ResolveOutput {
                    url: &resource.url,
                    served_from_cache: resource.served_from_cache,
                    source_bytes: resource.source.len(),
                    has_bytecode: resource.bytecode.is_some(),
                    source: &resource.source,
                });
            } else {
                eprintln!(
                    "{} ({} bytes, {})",
                    resource.url,
                    resource.source.len(),
                    if resource.served_from_cache { "cached" } else { "fetched" }
                );
                print!("{}", resource.source);
            }
        }
        Err(e) => {
            eprintln!("Error resolving {}: {}", url, e);
            process::exit(1);
        }
    }
}

#[cfg(not(feature = "http-ureq"))]
fn run_resolve(_: &CacheSettings, _: &str, _: Option<u64>, _: bool, _: bool) {
    eprintln!("Error: built without HTTP support (enable the `http-ureq` feature)");
    process::exit(1);
}

fn run_stats(settings: &CacheSettings, json: bool) {
    let store = open_store(settings);
    let index = open_index(settings, Arc::clone(&store));
    let stats = index.stats();

    if json {
        print_json(&stats);
        return;
    }

    println!("Cache:     {}", settings.cache_dir.display());
    println!("Entries:   {} / {}", stats.entry_count, settings.max_entries);
    println!("Bytes:     {} / {}", stats.total_bytes, settings.max_bytes);
    println!("Bytecode:  {}", stats.bytecode_entry_count);
    if let Ok(on_disk) = store.total_size() {
        println!("On disk:   {}", on_disk);
    }
}

fn run_list(settings: &CacheSettings, json: bool) {
    let index = open_index(settings, open_store(settings));
    let urls = index.urls();

    if json {
        print_json(&urls);
    } else if urls.is_empty() {
        println!("Cache is empty.");
    } else {
        for url in urls {
            println!("{}", url);
        }
    }
}

fn run_remove(settings: &CacheSettings, url: &str, json: bool) {
    let index = open_index(settings, open_store(settings));
    let removed = index.remove(url);

    if json {
        print_json(&serde_json::json!({ "url": url, "removed": removed }));
    } else if removed {
        println!("Removed {}", url);
    } else {
        println!("Not cached: {}", url);
    }
}

fn run_clear(settings: &CacheSettings, json: bool) {
    let index = open_index(settings, open_store(settings));
    let count = index.len();
    index.clear();

    if json {
        print_json(&serde_json::json!({ "cleared": count }));
    } else {
        println!("Cleared {} entries", count);
    }
}

#[derive(Serialize)]
struct GcOutput {
    temp_files_removed: usize,
    incomplete_removed: usize,
    entries_remaining: usize,
}

fn run_gc(settings: &CacheSettings, max_temp_age: Duration, json: bool) {
    let store = open_store(settings);

    let temp_files_removed = store.cleanup_orphaned_temps(max_temp_age).unwrap_or_else(|e| {
        eprintln!("Warning: temp cleanup failed: {}", e);
        0
    });
    let incomplete_removed = store.remove_incomplete().unwrap_or_else(|e| {
        eprintln!("Warning: incomplete-entry cleanup failed: {}", e);
        0
    });

    // Loading the index discards expired and corrupt records.
    let index = open_index(settings, store);
    let output = GcOutput {
        temp_files_removed,
        incomplete_removed,
        entries_remaining: index.len(),
    };

    if json {
        print_json(&output);
    } else {
        println!("Removed {} temp files", output.temp_files_removed);
        println!("Removed {} incomplete entries", output.incomplete_removed);
        println!("{} entries remaining", output.entries_remaining);
    }
}

fn run_config(effective: &EffectiveConfig) {
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}
