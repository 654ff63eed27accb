//! Oncograph CLI: explore an oncology research question against fixture sources.
//!
//! Usage:
//!   oncograph explore <QUERY> --fixtures <FILE>... [--config FILE] [--json] [-v]
//!   oncograph config [--config FILE]

use clap::{Parser, Subcommand};
use oncograph::{
    EngineConfig, Exploration, ExploreError, Explorer, FixtureSource, SourceAdapter,
    SourceRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "oncograph",
    version,
    about = "Query-adaptive oncology knowledge graph engine"
)]
struct Cli {
    /// Config file (defaults to <config dir>/oncograph/config.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a research question
    Explore {
        /// Free-text question, e.g. "KRAS G12C resistance in lung cancer"
        query: String,
        /// Fixture documents describing the sources
        #[arg(long, required = true, num_args = 1..)]
        fixtures: Vec<PathBuf>,
        #[arg(long)]
        max_hops: Option<usize>,
        /// Refinement iterations
        #[arg(long)]
        iterations: Option<usize>,
        /// Query variants, the original included (1-5)
        #[arg(long)]
        variants: Option<usize>,
        /// Per-source timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(p) => EngineConfig::load(p),
        None => EngineConfig::load_or_default(),
    }
    .map_err(|e| format!("Failed to load config: {}", e))
}

fn load_registry(paths: &[PathBuf]) -> Result<SourceRegistry, String> {
    let mut registry = SourceRegistry::empty();
    for path in paths {
        let sources = FixtureSource::load(path).map_err(|e| e.to_string())?;
        for source in sources {
            let id = source.id().to_string();
            if !registry.register(Arc::new(source)) {
                eprintln!("Warning: duplicate source '{}' in {} ignored", id, path.display());
            }
        }
    }
    Ok(registry)
}

fn print_exploration(exploration: &Exploration) {
    let d = &exploration.diagnostics;
    println!("Query: {}", exploration.query.raw_text);
    println!(
        "Seeds: {}",
        d.seeds.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!(
        "Graph: {} nodes, {} edges",
        exploration.graph.node_count(),
        exploration.graph.edge_count()
    );
    println!();

    if exploration.hypotheses.is_empty() {
        println!("No hypotheses.");
    }
    for (i, h) in exploration.hypotheses.iter().enumerate() {
        println!(
            "{:>2}. [{}] {} (confidence {:.2}, novelty {:.2})",
            i + 1,
            h.verdict(),
            h.statement(),
            h.confidence,
            h.novelty
        );
    }
    println!();

    println!("Sources ok:     {}", d.sources_ok.join(", "));
    println!("Sources empty:  {}", d.sources_empty.join(", "));
    println!("Sources failed: {}", d.sources_failed.join(", "));
    for f in &d.failures {
        println!("  {} ({:?} \"{}\"): {}", f.source_id, f.purpose, f.query, f.reason);
    }
    let termination = d
        .termination
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("Iterations: {} ({})", d.iterations_run, termination);
    println!(
        "Rejected: {}, inconclusive: {}, elapsed: {} ms",
        d.hypotheses_rejected, d.hypotheses_inconclusive, d.elapsed_ms
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_explore(
    config: EngineConfig,
    query: &str,
    fixtures: &[PathBuf],
    max_hops: Option<usize>,
    iterations: Option<usize>,
    variants: Option<usize>,
    timeout_ms: Option<u64>,
    json: bool,
) -> i32 {
    let registry = match load_registry(fixtures) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let explorer = Explorer::new(registry, config);

    let mut options = explorer.default_options();
    if let Some(n) = max_hops {
        options = options.with_max_hops(n);
    }
    if let Some(n) = iterations {
        options = options.with_max_refinement_iterations(n);
    }
    if let Some(n) = variants {
        options = options.with_robustness_variants(n);
    }
    if let Some(ms) = timeout_ms {
        options = options.with_per_source_timeout_ms(ms);
    }

    match explorer.explore(query, &options).await {
        Ok(exploration) if json => print_json(&exploration),
        Ok(exploration) => {
            print_exploration(&exploration);
            0
        }
        Err(ExploreError::GraphEmpty(diagnostics)) => {
            eprintln!("No source returned any data for this query.");
            if json {
                print_json(&diagnostics);
            } else {
                eprintln!("Sources failed: {}", diagnostics.sources_failed.join(", "));
                eprintln!("Sources empty:  {}", diagnostics.sources_empty.join(", "));
            }
            2
        }
        Err(e @ ExploreError::SeedExtraction { .. }) => {
            eprintln!("Error: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_config(config: &EngineConfig) -> i32 {
    match config.to_yaml() {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Explore {
            query,
            fixtures,
            max_hops,
            iterations,
            variants,
            timeout_ms,
            json,
        } => {
            cmd_explore(
                config, &query, &fixtures, max_hops, iterations, variants, timeout_ms, json,
            )
            .await
        }
        Commands::Config => cmd_config(&config),
    };
    std::process::exit(code);
}
