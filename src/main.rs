use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dialoguer::Input;
use tracing::info;
use tracing_subscriber::EnvFilter;

use botflow_channels::ConsoleSink;
use botflow_core::config::AppConfig;
use botflow_core::event::EventBus;
use botflow_core::types::{FlowId, ResponseInput, RunStatus};
use botflow_engine::{ExpirySweeper, Interpreter, StartOptions};
use botflow_graph::{FlowGraph, InMemoryGraphs, NodeKind, QuestionStyle};
use botflow_store::SqliteStore;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "botflow", version, about = "Conversational flow execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "botflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a flow definition without running it
    Validate {
        /// Path to the flow JSON file
        file: PathBuf,
    },
    /// Run a flow interactively in the terminal
    Run {
        /// Path to the flow JSON file
        file: PathBuf,
        /// Recipient id attached to the run
        #[arg(short, long, default_value = "cli:user")]
        recipient: String,
        /// Seed variables (KEY=VALUE, repeatable)
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Run one expiry sweep against the configured store
    Sweep,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("botflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::default()
    };

    match cli.command {
        Commands::Validate { file } => validate(&file),
        Commands::Run {
            file,
            recipient,
            vars,
        } => run(&config, &file, &recipient, &vars).await,
        Commands::Sweep => sweep(&config).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_flow(file: &PathBuf) -> anyhow::Result<FlowGraph> {
    let raw = std::fs::read_to_string(file)?;
    Ok(FlowGraph::parse(&raw)?)
}

fn validate(file: &PathBuf) -> anyhow::Result<()> {
    let graph = load_flow(file)?;
    println!(
        "{}: ok ({} nodes, {} edges)",
        graph.id,
        graph.nodes.len(),
        graph.edges.len()
    );
    Ok(())
}

async fn run(
    config: &AppConfig,
    file: &PathBuf,
    recipient: &str,
    seed_vars: &[String],
) -> anyhow::Result<()> {
    let graph = load_flow(file)?;
    let flow_id = FlowId::from_string(&graph.id);

    let graphs = Arc::new(InMemoryGraphs::new());
    graphs.insert(graph.clone());
    let store = Arc::new(SqliteStore::in_memory()?);
    let sink = Arc::new(ConsoleSink::new());
    let events = Arc::new(EventBus::default());
    let interpreter = Interpreter::new(graphs, store, sink, events, &config.engine)?;

    let mut opts = StartOptions::new(recipient);
    for pair in seed_vars {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("--var expects KEY=VALUE, got '{}'", pair);
        };
        opts.variables
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }

    let mut ctx = interpreter.start(&flow_id, opts).await?;

    while ctx.status.is_waiting() {
        let input = match ctx.status {
            RunStatus::WaitingInput => {
                let answer: String = Input::new().with_prompt("you").interact_text()?;
                // A typed option id routes like a tap on that option.
                match question_option_ids(&graph, ctx.current_node.as_deref()) {
                    Some(ids) if ids.contains(&answer) => ResponseInput::Button { id: answer },
                    _ => ResponseInput::Text { text: answer },
                }
            }
            RunStatus::WaitingFlow => {
                let raw: String = Input::new()
                    .with_prompt("form payload (JSON)")
                    .interact_text()?;
                ResponseInput::Form {
                    payload: serde_json::from_str(&raw)?,
                }
            }
            _ => unreachable!(),
        };
        ctx = interpreter.submit_response(&ctx.id, input).await?;
    }

    info!(status = %ctx.status, steps = ctx.history.len(), "Run finished");
    if let Some(reason) = ctx.completion_reason {
        println!("-- run ended: {} --", reason);
    }
    Ok(())
}

/// Ids a waiting question accepts as tap targets, if the current node is a
/// button or list question.
fn question_option_ids(graph: &FlowGraph, current: Option<&str>) -> Option<Vec<String>> {
    let node = graph.node(current?)?;
    match &node.kind {
        NodeKind::Question(q) => match &q.style {
            QuestionStyle::Buttons { options } => {
                Some(options.iter().map(|o| o.id.clone()).collect())
            }
            QuestionStyle::List { sections, .. } => Some(
                sections
                    .iter()
                    .flat_map(|s| s.rows.iter().map(|r| r.id.clone()))
                    .collect(),
            ),
            QuestionStyle::Text => None,
        },
        _ => None,
    }
}

async fn sweep(config: &AppConfig) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(std::path::Path::new(&config.store.path))?);
    let events = Arc::new(EventBus::default());
    let sweeper = ExpirySweeper::new(store, events, &config.sweeper, CancellationToken::new());
    let swept = sweeper.sweep_once().await?;
    println!("deactivated {} expired context(s)", swept);
    Ok(())
}
