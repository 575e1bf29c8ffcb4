//! CLI interface for pipegraph

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::dag::DependencyDag;
use crate::error::Result;
use crate::graph::ProcessingGraph;
use crate::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use crate::port::PortRef;
use crate::report::RunReport;

/// Pipegraph - file-backed dataflow pipeline graph engine
#[derive(Parser, Debug)]
#[command(name = "pipegraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "File-backed dataflow pipeline graph engine", long_about = None)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a graph document and execute it from its sinks
    Run {
        /// Path to graph XML file
        graph: PathBuf,
    },

    /// Load a graph document and check its dependency structure
    Validate {
        /// Path to graph XML file
        graph: PathBuf,
    },

    /// Emit the classic demo graph (two constants into an adder into a
    /// printer)
    Template {
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Initialize logging based on CLI arguments
    pub fn init_logging(&self) -> anyhow::Result<()> {
        let log_level: LogLevel = self.log_level.as_str().into();
        let log_format = match self.log_format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let config = LogConfig {
            level: log_level,
            format: log_format,
        };

        init_logging(&config)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Run { graph } => {
                self.run_graph(graph).await?;
            }
            Commands::Validate { graph } => {
                self.validate_graph(graph).await?;
            }
            Commands::Template { output } => {
                self.write_template(output.as_ref()).await?;
            }
        }
        Ok(())
    }

    /// Load and execute a graph once
    async fn run_graph(&self, path: &PathBuf) -> anyhow::Result<()> {
        info!("Loading graph from: {:?}", path);

        let mut graph = ProcessingGraph::new();
        graph.load_from_file(path).await?;
        info!("Graph loaded: {} nodes", graph.len());

        let report = graph.process(None).await?;
        print_report(&report);

        if report.success() {
            info!("Graph run completed successfully");
            Ok(())
        } else {
            error!("Graph run failed");
            std::process::exit(1);
        }
    }

    /// Load and validate a graph without executing
    async fn validate_graph(&self, path: &PathBuf) -> anyhow::Result<()> {
        info!("Validating graph: {:?}", path);

        let mut graph = ProcessingGraph::new();
        graph.load_from_file(path).await?;

        let dag = DependencyDag::build(&graph);
        dag.validate_acyclic()?;

        println!("Graph '{}' is valid", path.display());
        println!("Nodes: {}", dag.node_count());
        println!("Connections: {}", dag.edge_count());
        println!(
            "Sinks: {}",
            graph
                .sinks()
                .iter()
                .filter_map(|&id| graph.node(id).ok().map(|n| n.name.clone()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    /// Handle the `template` subcommand.
    async fn write_template(&self, output: Option<&PathBuf>) -> anyhow::Result<()> {
        let mut graph = template_graph().await?;
        match output {
            Some(path) => {
                graph.save_to_file(path)?;
                println!("Template written to {}", path.display());
            }
            None => {
                print!("{}", crate::persist::graph_to_string(&mut graph)?);
            }
        }
        Ok(())
    }
}

/// Per-node run summary printed after `run`.
fn print_report(report: &RunReport) {
    println!("Run {}", report.run_id);
    println!("{:<20} {:<12} DURATION", "NODE", "STATUS");
    println!("{}", "-".repeat(48));
    for record in &report.records {
        println!(
            "{:<20} {:<12} {:?}",
            record.name, record.status, record.duration
        );
    }
    println!(
        "Total: {:?} ({})",
        report.duration,
        if report.success() { "success" } else { "FAILED" }
    );
}

/// The classic demo graph: const(3) and const(4) feed an adder feeding a
/// printer.
pub async fn template_graph() -> Result<ProcessingGraph> {
    let mut graph = ProcessingGraph::new();
    let c1 = graph.create_node("const1", "const").await?;
    let c2 = graph.create_node("const2", "const").await?;
    let a = graph.create_node("add", "add").await?;
    let p = graph.create_node("print", "print").await?;

    graph.node_mut(c1)?.set_param("value", "3")?;
    graph.node_mut(c2)?.set_param("value", "4")?;

    graph.connect(&PortRef::output(c1, "out"), &PortRef::input(a, "summand1"))?;
    graph.connect(&PortRef::output(c2, "out"), &PortRef::input(a, "summand2"))?;
    graph.connect(&PortRef::output(a, "sum"), &PortRef::input(p, "in"))?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_template_graph_runs_clean() {
        let mut graph = template_graph().await.unwrap();
        let report = graph.process(None).await.unwrap();
        assert!(report.success());
        assert_eq!(report.records.len(), 4);
    }

    #[tokio::test]
    async fn test_template_graph_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("template.xml");

        let mut graph = template_graph().await.unwrap();
        graph.save_to_file(&path).unwrap();

        let mut loaded = ProcessingGraph::new();
        loaded.load_from_file(&path).await.unwrap();
        assert_eq!(loaded.len(), 4);
        let report = loaded.process(None).await.unwrap();
        assert!(report.success());
    }
}
