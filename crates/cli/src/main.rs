use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use context_ann::{AbortSignal, ProviderRuntime};
use context_cli::{execute, QueryBundle, RankOptions};
use context_protocol::{serialize_json, serialize_json_pretty, SearchMode};
use context_search::{RankProfile, SearchPayload};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "context-rank")]
#[command(about = "Query-time ranking over sparse and ANN candidates", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank a query bundle and print the search payload
    Rank(RankArgs),

    /// Print the effective ranking profile
    Config(ConfigArgs),
}

#[derive(Args)]
struct RankArgs {
    /// Query bundle (JSON)
    #[arg(long)]
    input: PathBuf,

    /// Builtin profile name or path to a JSON/TOML profile
    #[arg(long)]
    profile: Option<String>,

    /// Attach a bounded scoreBreakdown to every hit
    #[arg(long)]
    explain: bool,

    /// Number of hits to return (overrides the profile)
    #[arg(long)]
    top: Option<usize>,

    /// Search mode: code|prose|extracted-prose|records
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SearchMode>,

    /// Compact JSON output
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// Builtin profile name or path to a JSON/TOML profile
    #[arg(long)]
    profile: Option<String>,

    /// Compact JSON output
    #[arg(long)]
    json: bool,
}

fn parse_mode(raw: &str) -> Result<SearchMode, String> {
    SearchMode::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = SearchMode::ALL.iter().map(|m| m.as_str()).collect();
        format!("unknown mode '{raw}' (expected one of: {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for machine-readable output.
    let json_output = match &cli.command {
        Commands::Rank(args) => args.json,
        Commands::Config(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Rank(args) => run_rank(args).await?,
        Commands::Config(args) => run_config(&args)?,
    }

    Ok(())
}

fn load_profile(name: Option<&str>) -> Result<RankProfile> {
    let mut profile = match name {
        None => RankProfile::default(),
        Some(name) => match RankProfile::builtin(name) {
            Some(profile) => profile,
            None => RankProfile::from_file(Path::new(name))
                .with_context(|| format!("Failed to load profile '{name}'"))?,
        },
    };
    let applied = profile.apply_env_overrides()?;
    if !applied.is_empty() {
        log::info!("Environment overrides: {}", applied.join(", "));
    }
    Ok(profile)
}

/// Rank a query bundle
async fn run_rank(args: RankArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let bundle = QueryBundle::load(&args.input)?;
    let runtime = ProviderRuntime::new(profile.providers.clone());
    let options = RankOptions {
        explain: args.explain,
        top_n: args.top,
        mode: args.mode,
    };

    let signal = AbortSignal::new();
    let watcher = {
        let signal = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, aborting query");
                signal.abort();
            }
        })
    };
    let result = execute(&bundle, &profile, &runtime, &options, Some(&signal)).await;
    watcher.abort();
    let payload = result.context("Ranking failed")?;

    for health in runtime.health_report() {
        log::debug!("Provider health: {}", serialize_json(&health)?);
    }
    print_payload(&payload, args.json)
}

fn print_payload(payload: &SearchPayload, compact: bool) -> Result<()> {
    if compact {
        println!("{}", serialize_json(payload)?);
    } else {
        println!("{}", serialize_json_pretty(payload)?);
    }
    Ok(())
}

/// Print the effective profile
fn run_config(args: &ConfigArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    if args.json {
        println!("{}", serialize_json(&profile)?);
    } else {
        println!("{}", serialize_json_pretty(&profile)?);
    }
    Ok(())
}
