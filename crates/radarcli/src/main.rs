mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use radarcore::events::{read_jsonl, write_jsonl};
use radarruntime::{ExecutionGraph, FlowRuntime, RuntimeConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "radar")]
#[command(about = "Run flows and lay out their execution graph", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a built-in flow and print its ring layout
    Demo {
        /// One of: letters, nested, failure
        flow: String,

        /// Number of letters to fetch
        #[arg(short, long, default_value_t = 10)]
        count: usize,

        /// Write the event stream to this file as JSON lines
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Runtime configuration as a JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Lay out a recorded event stream
    Rings {
        /// Path to a JSON lines event file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Demo {
            flow,
            count,
            events,
            config,
        } => run_demo(&flow, count, events, config).await,
        Commands::Rings { file } => show_rings(file),
    }
}

async fn run_demo(
    name: &str,
    count: usize,
    events: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let flow = demo::by_name(name, count).with_context(|| {
        format!("unknown flow '{}', expected one of {:?}", name, demo::NAMES)
    })?;

    let config = match config {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("opening config {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))?
        }
        None => RuntimeConfig::default(),
    };
    let runtime = FlowRuntime::with_config(config);

    let future = runtime.root().run_flow(flow, vec![]).await?;
    match future.peek() {
        Some(Ok(value)) => println!("Result: {}", value.to_json()),
        Some(Err(e)) => {
            println!("Failed: {}", e);
            println!("Run chain: {:?}", e.run_chain());
        }
        None => println!("State: {}", future.state()),
    }

    // Tasks may outlive their flow; give stragglers a moment to finalize.
    if !runtime.wait_until_idle(IDLE_TIMEOUT).await {
        tracing::warn!("Some runs were still running when the layout was taken");
    }

    if let Some(path) = events {
        let file = File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        let written = write_jsonl(file, &runtime.events())?;
        println!("Wrote {} events to {}", written, path.display());
    }

    let graph = runtime.graph_for(future.run_id())?;
    print_rings(&graph);
    Ok(())
}

fn show_rings(file: PathBuf) -> Result<()> {
    let reader = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
    let events = read_jsonl(BufReader::new(reader))?;
    println!("Loaded {} events from {}", events.len(), file.display());
    let graph = ExecutionGraph::from_events(&events)?;
    print_rings(&graph);
    Ok(())
}

fn print_rings(graph: &ExecutionGraph) {
    println!();
    println!("Rings ({} runs):", graph.run_count());
    for (ring, entries) in graph.rings().into_iter().enumerate() {
        println!("  ring {}:", ring);
        for entry in entries {
            let parent = entry
                .parent_run_id
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    {} {} '{}' parent={} deps={:?}",
                entry.run_id, entry.kind, entry.name, parent, entry.dependency_ids
            );
        }
    }
}
