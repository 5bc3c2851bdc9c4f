use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use factorio_lp::fetch::FetchConfig;
use factorio_lp::rules::ParseRules;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "factorio-lp")]
#[command(about = "Scrape Factorio wiki recipes into a matrix and plan production with linear programming")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download infobox pages, archived titles and intermediate product tables
    Fetch(FetchArgs),
    /// Build the recipe matrix from the fetched document
    Preprocess(PreprocessArgs),
    /// Solve a production plan over the recipe matrix
    Analyse(AnalyseArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Directory for pipeline artifacts
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// MediaWiki API endpoint
    #[arg(long, default_value = factorio_lp::config::DEFAULT_API_URL)]
    api_url: String,

    /// JSON file overriding the default parse rules
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Args)]
struct PreprocessArgs {
    /// Directory holding the fetch document; artifacts are written next to it
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// JSON file overriding the default parse rules
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Args)]
struct AnalyseArgs {
    /// Directory holding the matrix artifacts
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// JSON analysis config (objective, expense weights, constraints)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_rules(path: Option<&Path>) -> Result<ParseRules> {
    match path {
        Some(path) => {
            info!(path = ?path, "Loading parse rules");
            ParseRules::load(path)
        }
        None => Ok(ParseRules::default()),
    }
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output))?;

    let config = FetchConfig {
        rules: load_rules(args.rules.as_deref())?,
        output_dir: args.output,
        api_url: args.api_url,
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .thread_name("factorio-lp-fetch")
        .enable_io()
        .enable_time()
        .build()?;
    rt.block_on(factorio_lp::fetch::run_fetch(config))
}

fn run_preprocess(args: PreprocessArgs) -> Result<()> {
    let rules = load_rules(args.rules.as_deref())?;
    factorio_lp::preprocess::run_preprocess(&args.output, &rules)?;
    Ok(())
}

fn run_analyse(args: AnalyseArgs) -> Result<()> {
    factorio_lp::analyse::run_analyse(&args.output, args.config.as_deref())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Fetch(args) => run_fetch(args),
        Commands::Preprocess(args) => run_preprocess(args),
        Commands::Analyse(args) => run_analyse(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
