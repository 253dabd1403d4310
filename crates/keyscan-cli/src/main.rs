//! KeyScan CLI
//!
//! Randomized private key range scanner for a target hash160.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use keyscan_core::{
    format_duration, format_keys, format_rate, BigUint, Coordinator, FinishReason, ScanConfig,
    ScanEvent, ScanPlan, ScanSummary,
};
use keyscan_crypto::{
    encoding::{p2pkh_address, wif_encode},
    hash, hex, scalar_hex, scalar_to_bytes, KeyDeriver, Secp256k1,
};
use tracing::{debug, error, warn};

const EXIT_FOUND: u8 = 0;
const EXIT_NOT_FOUND: u8 = 1;
const EXIT_INVALID: u8 = 2;

#[derive(Parser)]
#[command(name = "keyscan")]
#[command(author = "KeyScan Team")]
#[command(version = "0.1.0")]
#[command(about = "Randomized private key range scanner", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a key range for a target hash160
    Scan(ScanArgs),

    /// Show the public key, hash160, address and WIF of a private key
    Inspect {
        /// Private key (hex)
        key: String,
    },
}

#[derive(Args, Default)]
struct ScanArgs {
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target hash160 (40 hex digits) or P2PKH address
    #[arg(short, long)]
    target: Option<String>,

    /// Range start (hex)
    #[arg(short, long)]
    start: Option<String>,

    /// Range end (hex)
    #[arg(short, long)]
    end: Option<String>,

    /// Smallest random step (decimal)
    #[arg(long)]
    min_step: Option<String>,

    /// Largest random step (decimal)
    #[arg(long)]
    max_step: Option<String>,

    /// Skip keys below this percentage of the range. Heuristic: keys in the
    /// skipped zone are never tested.
    #[arg(long)]
    threshold: Option<String>,

    /// Number of threads (0 = auto)
    #[arg(long)]
    threads: Option<usize>,

    /// Stop at the range end instead of restarting from the start
    #[arg(long)]
    no_wrap: bool,

    /// Tested keys between status updates
    #[arg(long)]
    report_interval: Option<u64>,

    /// Maximum time in seconds (0 = unlimited)
    #[arg(long)]
    max_time: Option<u64>,

    /// Seed for reproducible stepping
    #[arg(long)]
    seed: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Scan(args) => cmd_scan(args),
        Commands::Inspect { key } => cmd_inspect(&key).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_INVALID)
        }
    }
}

fn cmd_scan(args: ScanArgs) -> Result<ExitCode> {
    let json_output = args.json;
    let config = build_config(args)?;

    let coordinator = match Coordinator::new(&config) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };

    if !json_output {
        print_header(coordinator.plan());
    }

    let stats = coordinator.stats();
    let summary = coordinator.run(|event| match event {
        ScanEvent::Progress(report) => {
            if !json_output {
                eprint!("\r{} Base Key: {}", stats.format(), report.base_key());
                let _ = std::io::stderr().flush();
            }
        }
        ScanEvent::Error(err) => {
            warn!(worker = err.worker, position = %scalar_hex(&err.position), "{}", err.message);
        }
        ScanEvent::Wrapped { worker, pass } => {
            debug!(worker, pass, "Restarting from range start");
        }
        ScanEvent::Found(_) | ScanEvent::Finished { .. } => {}
    });

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        eprintln!();
        print_summary(&summary);
    }

    Ok(ExitCode::from(if summary.matched {
        EXIT_FOUND
    } else {
        EXIT_NOT_FOUND
    }))
}

/// Config file (if any) overlaid with command-line flags
fn build_config(args: ScanArgs) -> Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        }
        None => ScanConfig::default(),
    };

    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(start) = args.start {
        config.range_start = start;
    }
    if let Some(end) = args.end {
        config.range_end = end;
    }
    if let Some(min_step) = args.min_step {
        config.min_step = min_step;
    }
    if let Some(max_step) = args.max_step {
        config.max_step = max_step;
    }
    if let Some(threshold) = args.threshold {
        config.threshold_percent = Some(threshold);
    }
    if let Some(threads) = args.threads {
        config.workers = if threads == 0 { num_cpus::get() } else { threads };
    }
    if args.no_wrap {
        config.wraparound = false;
    }
    if let Some(interval) = args.report_interval {
        config.report_interval = interval;
    }
    if let Some(max_time) = args.max_time {
        config.max_time_secs = max_time;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    Ok(config)
}

fn cmd_inspect(key_hex: &str) -> Result<()> {
    let trimmed = key_hex.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let scalar = BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| anyhow::anyhow!("Invalid private key hex: {}", key_hex))?;

    let public_key = Secp256k1.derive(&scalar)?;
    let digest = hash::digest(&public_key)?;
    let bytes = scalar_to_bytes(&scalar).context("Private key exceeds 256 bits")?;

    println!("Private Hex: {}", scalar_hex(&scalar));
    println!("Public Key:  {}", hex::encode(public_key));
    println!("Hash160:     {}", digest);
    println!("Address:     {}", p2pkh_address(&digest));
    println!("WIF:         {}", wif_encode(&bytes));

    Ok(())
}

fn print_header(plan: &ScanPlan) {
    let options = &plan.options;
    eprintln!("KeyScan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Target:     {}", options.target);
    eprintln!("Range:      {}", plan.range);
    eprintln!("Step:       {}..={}", options.step.min(), options.step.max());
    eprintln!("Workers:    {}", plan.workers);
    eprintln!(
        "Wraparound: {}",
        if options.wraparound {
            "on (runs until found or stopped)"
        } else {
            "off"
        }
    );
    if let Some(threshold) = &options.threshold {
        eprintln!("Threshold:  {} (keys below are skipped)", scalar_hex(threshold));
    }
    eprintln!();
}

fn print_summary(summary: &ScanSummary) {
    println!();
    match &summary.found {
        Some(key) => {
            println!("🎉 MATCH FOUND!");
            println!("{:-<72}", "");
            println!("Private Key: {}", key.private_key_hex);
            println!("WIF:         {}", key.wif);
            println!("Public Key:  {}", key.public_key_hex);
            println!("Hash160:     {}", key.digest);
            println!("Address:     {}", p2pkh_address(&key.digest));
            println!("{:-<72}", "");
        }
        None => {
            let why = match summary.reason {
                FinishReason::TimedOut => "time limit reached",
                FinishReason::Cancelled => "cancelled",
                _ => "range exhausted",
            };
            println!("No match found ({}).", why);
        }
    }
    println!("Keys Tested: {}", format_keys(summary.keys_tested));
    println!("Time:        {}", format_duration(summary.elapsed_secs));
    println!("Speed:       {}", format_rate(summary.keys_per_second));
}
