//! Fuzzylink CLI - Command line interface for the linkage engine
//!
//! Usage:
//!   fuzzylink run <config.json>      Run the full linkage batch
//!   fuzzylink build <config.json>    Build and save the reference index
//!   fuzzylink inspect <engine.fzlk>  Show a saved engine's statistics

use clap::{Parser, Subcommand};
use colored::*;
use fuzzylink::{persist, LinkConfig, Orchestrator};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fuzzylink")]
#[command(about = "Fuzzylink - fuzzy record linkage between tabular datasets")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full linkage batch and write the result CSV
    Run {
        /// Path to the configuration file
        config: PathBuf,

        /// Override the collision promotion threshold
        #[arg(short, long)]
        diff_percent: Option<f64>,
    },

    /// Build the reference index and save it without querying
    Build {
        /// Path to the configuration file
        config: PathBuf,
    },

    /// Show a saved engine's header and index statistics
    Inspect {
        /// Path to a saved engine file
        engine: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            diff_percent,
        } => cmd_run(config, diff_percent),
        Commands::Build { config } => cmd_build(config),
        Commands::Inspect { engine } => cmd_inspect(engine),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "fuzzylink=debug"
    } else {
        "fuzzylink=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_run(config_path: PathBuf, diff_percent: Option<f64>) -> anyhow::Result<()> {
    let mut config = LinkConfig::load(&config_path)?;
    if let Some(diff) = diff_percent {
        config.diff_percent = diff;
        config.validate()?;
    }

    let summary = Orchestrator::new(config).run()?;

    println!("{}", "Linkage batch finished".green().bold());
    println!("  Queries:         {}", summary.queries);
    println!("  Matched:         {}", summary.matched);
    println!("  Exact key hits:  {}", summary.exact_key_hits);
    println!(
        "  Rearrangement:   {} promoted, {} verified in {} passes",
        summary.rearrange.promotions, summary.rearrange.verified, summary.rearrange.passes
    );
    for (header, count) in &summary.preclean_counts {
        println!("  Pre-cleaned:     {header} ({count} cells)");
    }
    println!("  Elapsed:         {:.2?}", summary.elapsed);
    println!(
        "  Results:         {}",
        summary.results_path.display().to_string().cyan()
    );

    Ok(())
}

fn cmd_build(config_path: PathBuf) -> anyhow::Result<()> {
    let config = LinkConfig::load(&config_path)?;
    let path = Orchestrator::new(config).build_and_save()?;

    println!("{}", "Reference index built".green().bold());
    println!("  Engine: {}", path.display().to_string().cyan());
    Ok(())
}

fn cmd_inspect(engine_path: PathBuf) -> anyhow::Result<()> {
    let engine = persist::load(&engine_path)?;

    println!("{}", "Saved engine".green().bold());
    println!("  Built:          {}", engine.built_at());
    println!("  Reference rows: {}", engine.reference().len());
    println!("  Key columns:    {} <- {}",
        engine.backbone().reference_key_header(),
        engine.backbone().target_key_header()
    );
    println!("  Groups:");
    for (name, tokens) in engine.index_stats() {
        println!("    {} ({} tokens)", name.cyan(), tokens);
    }
    Ok(())
}
