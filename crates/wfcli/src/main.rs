// crates/wfcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wfcore::{ExecutionEvent, NdArray, NodeEvent, Workflow, WorkflowDefinition};
use wfnodes::{standard_registry, ConstantNode, IntegrateNode, ThresholdNode};
use wfruntime::{Runtime, RuntimeConfig, TaskDiGraph, TaskStatus};

#[derive(Parser)]
#[command(name = "wf")]
#[command(about = "Workflow graph engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Runtime configuration as a JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Print the compiled task graph
    Graph {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Emit Graphviz DOT instead of a task listing
        #[arg(long)]
        dot: bool,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            verbose,
        } => {
            init_logging(verbose);
            run_workflow(file, config).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_workflow(file)?;
        }

        Commands::Graph { file, dot } => {
            init_logging(false);
            print_graph(file, dot)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn read_definition(file: &Path) -> Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let definition = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a workflow definition", file.display()))?;
    Ok(definition)
}

fn standard_runtime(config: RuntimeConfig) -> Runtime {
    Runtime::with_registry(Arc::new(standard_registry()), config)
}

async fn run_workflow(file: PathBuf, config: Option<PathBuf>) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let config = match config {
        Some(path) => RuntimeConfig::from_file(&path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    tracing::debug!("Runtime config: {:?}", config);
    let runtime = standard_runtime(config);
    let definition = read_definition(&file)?;
    let mut workflow = runtime.load(&definition)?;

    println!("📋 Workflow: {}", workflow.name());
    println!("   Nodes: {}", workflow.len());
    println!("   Bindings: {}", definition.bindings.len());
    println!();

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { tasks, .. } => {
                    println!("▶️  Workflow started ({} tasks)", tasks);
                }
                ExecutionEvent::TaskStarted {
                    task_id,
                    node,
                    node_type,
                    ..
                } => {
                    println!("  ⚡ Starting task {}: {} ({})", task_id, node, node_type);
                }
                ExecutionEvent::TaskCompleted {
                    node, duration_ms, ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node, duration_ms);
                }
                ExecutionEvent::TaskFailed { node, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node, error);
                }
                ExecutionEvent::TaskSkipped {
                    node,
                    failed_dependency,
                    ..
                } => {
                    println!("  ⏭️  Node {} skipped (task {} failed)", node, failed_dependency);
                }
                ExecutionEvent::NodeEvent { node, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node, message);
                    }
                    NodeEvent::Progress { percent, message } => {
                        if let Some(msg) = message {
                            println!("     📊 [{}] {:.0}% - {}", node, percent, msg);
                        } else {
                            println!("     📊 [{}] {:.0}%", node, percent);
                        }
                    }
                },
                ExecutionEvent::WorkflowCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Workflow completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Workflow failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let result = runtime.execute(&mut workflow).await?;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    println!(
        "   Completed: {}/{} tasks",
        result.completed_nodes(),
        result.total_nodes()
    );
    for (node, error) in result.failures() {
        println!("   Failed: {} ({})", node, error);
    }

    println!();
    println!("📤 End task outputs:");
    for report in result.end_results() {
        match &report.status {
            TaskStatus::Completed(outputs) => {
                println!("   Node {}:", report.node);
                for output in outputs.iter() {
                    println!("     {}: {}", output.name, output.value.summary());
                }
            }
            TaskStatus::Failed(_) => println!("   Node {}: failed", report.node),
            TaskStatus::Skipped { .. } => println!("   Node {}: skipped", report.node),
        }
    }

    if !result.is_success() {
        anyhow::bail!("workflow {} did not complete", workflow.name());
    }
    Ok(())
}

/// Loads, compiles and checks a workflow without running it
fn compile(file: &Path) -> Result<(Workflow, wfcore::TaskGraph, Vec<String>)> {
    let runtime = standard_runtime(RuntimeConfig::default());
    let mut workflow = runtime.load(&read_definition(file)?)?;
    let (graph, end_tasks) = workflow.convert_graph()?;
    Ok((workflow, graph, end_tasks))
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let (workflow, graph, end_tasks) = compile(&file)?;
    TaskDiGraph::build(&graph)?.topological_order()?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name());
    println!("   Nodes: {}", workflow.len());
    println!("   Tasks: {}", graph.len());
    println!("   End tasks: {}", end_tasks.join(", "));

    Ok(())
}

fn print_graph(file: PathBuf, dot: bool) -> Result<()> {
    let (_, graph, end_tasks) = compile(&file)?;

    if dot {
        println!("{}", TaskDiGraph::build(&graph)?.to_dot());
        return Ok(());
    }

    for (id, task) in graph.iter() {
        let marker = if end_tasks.iter().any(|e| e == task.process.node()) {
            " (end)"
        } else {
            ""
        };
        if task.dependencies.is_empty() {
            println!(
                "  [{}] {} ({}){}",
                id,
                task.process.node(),
                task.process.node_type(),
                marker
            );
        } else {
            println!(
                "  [{}] {} ({}) <- {}{}",
                id,
                task.process.node(),
                task.process.node_type(),
                task.dependencies.join(", "),
                marker
            );
        }
    }
    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = standard_registry();

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
            for input in &metadata.inputs {
                let unit = input
                    .unit
                    .as_deref()
                    .map(|u| format!(" [{}]", u))
                    .unwrap_or_default();
                if input.required {
                    println!("      in  {}{}", input.name, unit);
                } else {
                    println!(
                        "      in  {}{} = {}",
                        input.name,
                        unit,
                        input.default.summary()
                    );
                }
            }
            for output in &metadata.outputs {
                println!("      out {}", output.name);
            }
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Example SAXS reduction");

    workflow.add_process_as("image", Arc::new(ConstantNode))?;
    workflow.add_process(Arc::new(ThresholdNode))?;
    workflow.add_process(Arc::new(IntegrateNode))?;

    let image = NdArray::new(
        vec![4, 4],
        vec![
            10.0, 40.0, 40.0, 10.0, //
            40.0, 90.0, 90.0, 40.0, //
            40.0, 90.0, 90.0, 40.0, //
            10.0, 40.0, 40.0, 10.0,
        ],
    )
    .context("example image shape")?;
    workflow.set_input("image", "value", image)?;
    workflow.set_input("Integrate", "bins", 4.0)?;

    workflow.connect("image", "value", "Threshold", "data")?;
    workflow.connect("image", "value", "Integrate", "data")?;
    workflow.connect("Threshold", "mask", "Integrate", "mask")?;

    let json = serde_json::to_string_pretty(&workflow.to_definition())?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  wf run --file {}", output.display());

    Ok(())
}
