//! graphcache CLI
//!
//! Entry point for the `graphcache` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use graphcache::cli::{overrides_to_value, parse_argument, parse_key_value};
use graphcache::config::EffectiveConfig;
use graphcache::mock::MockBackend;
use graphcache::{
    build_signature, Argument, CompilationCache, CompileMode, CompileOutcome, PersistedRecord,
    PersistentStore, StoreConfig, UnitName,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphcache")]
#[command(about = "Compilation cache for computational subgraphs", version)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the signature and fingerprint of a unit with arguments
    Signature {
        /// Unit name
        name: String,

        /// Unit attribute (repeatable), e.g. --attr T=f32
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Arguments, e.g. f32[2,3] or const:i32=5
        #[arg(value_name = "ARG")]
        args: Vec<String>,
    },

    /// Inspect persisted records
    Records {
        #[command(subcommand)]
        action: RecordsCommands,
    },

    /// Print the effective configuration with its sources
    Config {
        /// Path to config file (TOML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override a config value (repeatable), e.g. --set async.workers=4
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// Drive the cache with the mock backend
    Demo {
        /// Path to config file (TOML)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override a config value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Compile mode
        #[arg(long, value_enum, default_value_t = ModeArg::Strict)]
        mode: ModeArg,

        /// Number of requests to issue
        #[arg(long, default_value_t = 3)]
        repeat: u32,

        /// Device type reported by the mock backend
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Unit attribute (repeatable)
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,

        /// Unit name
        name: String,

        /// Arguments, e.g. f32[2,3] or const:i32=5
        #[arg(value_name = "ARG")]
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RecordsCommands {
    /// List records in a directory
    List {
        /// Persistent cache directory
        #[arg(long, short = 'd')]
        dir: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one record file
    Show {
        /// Record file
        file: PathBuf,

        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show directory statistics
    Stats {
        /// Persistent cache directory
        #[arg(long, short = 'd')]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Strict,
    Lazy,
    Async,
}

impl From<ModeArg> for CompileMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => CompileMode::Strict,
            ModeArg::Lazy => CompileMode::Lazy,
            ModeArg::Async => CompileMode::Async,
        }
    }
}

/// How long `demo --mode async` waits for the background compile.
const ASYNC_WAIT: Duration = Duration::from_secs(10);

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Signature {
            name,
            attrs,
            json,
            args,
        } => run_signature(&name, &attrs, &args, json),
        Commands::Records { action } => match action {
            RecordsCommands::List { dir, json } => run_records_list(&dir, json),
            RecordsCommands::Show { file, json } => run_records_show(&file, json),
            RecordsCommands::Stats { dir } => run_records_stats(&dir),
        },
        Commands::Config { config, overrides } => run_config(config.as_deref(), &overrides),
        Commands::Demo {
            config,
            overrides,
            mode,
            repeat,
            device,
            attrs,
            name,
            args,
        } => run_demo(DemoArgs {
            config,
            overrides,
            mode: mode.into(),
            repeat,
            device,
            attrs,
            name,
            args,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_unit(name: &str, attrs: &[String]) -> Result<UnitName, String> {
    let mut unit = UnitName::new(name);
    for attr in attrs {
        let (key, value) = parse_key_value(attr).map_err(|e| e.to_string())?;
        unit = unit.with_attr(key, value);
    }
    Ok(unit)
}

fn parse_arguments(specs: &[String]) -> Result<Vec<Argument>, String> {
    specs
        .iter()
        .map(|s| parse_argument(s).map_err(|e| format!("argument '{}': {}", s, e)))
        .collect()
}

fn run_signature(name: &str, attrs: &[String], args: &[String], json: bool) -> Result<(), String> {
    let unit = parse_unit(name, attrs)?;
    let args = parse_arguments(args)?;
    let signature = build_signature(&unit, &args).map_err(|e| e.to_string())?;
    let fingerprint = signature.fingerprint().map_err(|e| e.to_string())?;

    if json {
        let output = serde_json::json!({
            "signature": signature,
            "human": signature.human_string(),
            "fingerprint": fingerprint,
        });
        let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        println!("Signature:   {}", signature.human_string());
        println!("Fingerprint: {}", fingerprint);
    }
    Ok(())
}

fn open_store(dir: &Path) -> PersistentStore {
    PersistentStore::new(StoreConfig {
        directory: Some(dir.to_path_buf()),
        ..StoreConfig::default()
    })
}

fn run_records_list(dir: &Path, json: bool) -> Result<(), String> {
    let records = open_store(dir).list().map_err(|e| e.to_string())?;

    if json {
        let entries: Vec<serde_json::Value> = records
            .iter()
            .map(|(path, record)| {
                serde_json::json!({
                    "path": path.display().to_string(),
                    "valid": record.is_some(),
                    "signature": record.as_ref().map(|r| r.signature.clone()),
                    "device_type": record.as_ref().map(|r| r.key.device_type.clone()),
                    "created_at": record.as_ref().map(|r| r.created_at.to_rfc3339()),
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records in {}", dir.display());
        return Ok(());
    }

    println!("Records in {} ({} total):\n", dir.display(), records.len());
    for (path, record) in &records {
        let file = path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        match record {
            Some(record) => {
                println!("  {}", file);
                println!("    Signature: {}", record.signature);
                println!("    Device: {}", record.key.device_type);
                println!("    Age: {}", format_age(record));
            }
            None => println!("  {} (unreadable)", file),
        }
    }
    Ok(())
}

fn format_age(record: &PersistedRecord) -> String {
    let age = Utc::now().signed_duration_since(record.created_at);
    if age.num_days() > 0 {
        format!("{}d", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m", age.num_minutes())
    } else {
        format!("{}s", age.num_seconds().max(0))
    }
}

fn run_records_show(file: &Path, json: bool) -> Result<(), String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("reading {}: {}", file.display(), e))?;
    let record = PersistedRecord::from_json(&content)
        .map_err(|e| format!("parsing {}: {}", file.display(), e))?;

    if json {
        println!("{}", record.to_json().map_err(|e| e.to_string())?);
        return Ok(());
    }

    let ir_len = record.ir_bytes().map(|b| b.len()).map_err(|e| e.to_string())?;
    let aot_len = record.aot_bytes().map(|b| b.len()).map_err(|e| e.to_string())?;
    println!("Schema:      {} (v{})", record.schema_id, record.schema_version);
    println!("Signature:   {}", record.signature);
    println!("Device:      {}", record.key.device_type);
    if !record.key.prefix.is_empty() {
        println!("Prefix:      {}", record.key.prefix);
    }
    println!("Sig digest:  {}", record.key.signature_fingerprint);
    println!("IR digest:   {}", record.key.ir_fingerprint);
    println!("IR size:     {} bytes", ir_len);
    println!("AOT size:    {} bytes", aot_len);
    println!("Created:     {}", record.created_at.to_rfc3339());
    Ok(())
}

fn run_records_stats(dir: &Path) -> Result<(), String> {
    let stats = open_store(dir).stats().map_err(|e| e.to_string())?;
    println!("Records:       {}", stats.count);
    println!("Unreadable:    {}", stats.invalid_count);
    println!("Total size:    {} bytes", stats.total_size_bytes);
    Ok(())
}

fn run_config(config: Option<&Path>, overrides: &[String]) -> Result<(), String> {
    let cli_layer = overrides_to_value(overrides).map_err(|e| e.to_string())?;
    let effective = EffectiveConfig::build(config, cli_layer).map_err(|e| e.to_string())?;
    // Validate before printing so bad values are reported here too.
    effective.resolve().map_err(|e| e.to_string())?;
    println!("{}", effective.to_json().map_err(|e| e.to_string())?);
    Ok(())
}

struct DemoArgs {
    config: Option<PathBuf>,
    overrides: Vec<String>,
    mode: CompileMode,
    repeat: u32,
    device: String,
    attrs: Vec<String>,
    name: String,
    args: Vec<String>,
}

fn run_demo(demo: DemoArgs) -> Result<(), String> {
    let cli_layer = overrides_to_value(&demo.overrides).map_err(|e| e.to_string())?;
    let config = EffectiveConfig::build(demo.config.as_deref(), cli_layer)
        .and_then(|effective| effective.resolve())
        .map_err(|e| e.to_string())?;

    let unit = parse_unit(&demo.name, &demo.attrs)?;
    let args = parse_arguments(&demo.args)?;

    let backend = Arc::new(MockBackend::new(&demo.device));
    let cache = CompilationCache::new(config, backend.clone()).map_err(|e| e.to_string())?;

    for request in 1..=demo.repeat {
        let started = Instant::now();
        let outcome = cache.compile(&unit, &args, demo.mode);
        let elapsed = started.elapsed();
        match outcome {
            Ok(CompileOutcome::Compiled(artifacts)) => println!(
                "request {}: compiled (origin={:?}, executable={}) in {:?}",
                request,
                artifacts.origin,
                if artifacts.executable.is_some() { "yes" } else { "no" },
                elapsed
            ),
            Ok(CompileOutcome::Miss(reason)) => {
                println!("request {}: miss {:?} in {:?}", request, reason, elapsed)
            }
            Err(e) => println!("request {}: error: {}", request, e),
        }
    }

    if demo.mode == CompileMode::Async {
        let deadline = Instant::now() + ASYNC_WAIT;
        loop {
            let compiled = cache
                .get_compilation_result_if_already_compiled(&unit, &args)
                .map_err(|e| e.to_string())?;
            if compiled.is_some() {
                println!("background compile finished");
                break;
            }
            if Instant::now() >= deadline {
                println!("background compile still running after {:?}", ASYNC_WAIT);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    let counters = backend.counters();
    println!();
    print!("{}", cache.debug_string());
    println!(
        "backend calls: lower={} build={} aot={} load={}",
        counters.lower_calls, counters.build_calls, counters.aot_calls, counters.load_calls
    );
    Ok(())
}
