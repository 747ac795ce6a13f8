use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use graphvis::config::{BackendKind, LayoutConfig, StepMode};
use graphvis::graph::Graph;
use graphvis::io::{Generator, GeneratorKind, GraphSource};
use graphvis::layout::{LayoutEngine, create_backend};

/// Force-directed 3D graph layout.
#[derive(Parser)]
#[command(name = "graphvis")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a generated graph and export the result
    Layout {
        #[command(flatten)]
        graph: GraphArgs,

        /// Layout configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Step-length strategy (overrides the config file)
        #[arg(short, long, value_enum)]
        mode: Option<StepMode>,

        /// Compute backend (overrides the config file)
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,

        /// Number of ticks to run
        #[arg(short, long, default_value = "50")]
        ticks: u32,

        /// Seed for the initial placement (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,

        /// Output file for the text export (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print node count, edge count and per-node centrality
    Inspect {
        #[command(flatten)]
        graph: GraphArgs,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
struct GraphArgs {
    /// Graph generator: string, ring, tree or hub
    #[arg(short, long, default_value = "ring")]
    generator: GeneratorKind,

    /// Number of nodes
    #[arg(short, long, default_value = "32")]
    nodes: usize,

    /// Children per node (tree only)
    #[arg(short, long, default_value = "2")]
    arity: usize,
}

impl GraphArgs {
    fn load(&self) -> anyhow::Result<Graph> {
        let source = Generator::from_kind(self.generator, self.nodes, self.arity)?;
        let graph = source.load()?;
        info!(
            source = %source.describe(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph generated"
        );
        Ok(graph)
    }
}

struct LayoutOptions {
    config: Option<PathBuf>,
    mode: Option<StepMode>,
    backend: Option<BackendKind>,
    seed: Option<u64>,
}

impl LayoutOptions {
    fn resolve(&self) -> anyhow::Result<LayoutConfig> {
        let mut config = match &self.config {
            Some(path) => LayoutConfig::from_path(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => LayoutConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.step_mode = mode;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn layout(
    graph: &Graph,
    config: &LayoutConfig,
    ticks: u32,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let backend = create_backend(config.backend)?;
    let mut engine = LayoutEngine::new(backend.as_ref(), config);
    engine.load(graph)?;

    for _ in 0..ticks {
        engine.tick(0)?;
    }

    let stats = engine.stats();
    info!(
        iterations = stats.iterations,
        trials = stats.trials,
        energy = stats.energy,
        step = stats.step_length,
        "layout finished"
    );

    let snapshot = engine.snapshot();
    match output {
        Some(path) => {
            snapshot.write_to_file(path)?;
            info!(path = %path.display(), "layout written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            snapshot.write_to(&mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn inspect(graph: &Graph) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "nodes: {}", graph.node_count())?;
    writeln!(out, "edges: {}", graph.edge_count())?;
    for node in 0..graph.node_count() {
        writeln!(
            out,
            "node {node}: degree {}, centrality {:.6}",
            graph.degree(node),
            graph.centrality(node)
        )?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Layout {
            graph,
            config,
            mode,
            backend,
            ticks,
            seed,
            output,
        } => {
            let options = LayoutOptions {
                config,
                mode,
                backend,
                seed,
            };
            let config = options.resolve()?;
            let graph = graph.load()?;
            layout(&graph, &config, ticks, output.as_deref())?;
        }
        Commands::Inspect { graph } => {
            inspect(&graph.load()?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_layout_with_defaults() {
        let cli = Cli::try_parse_from(["graphvis", "layout"]).unwrap();
        match cli.command {
            Commands::Layout {
                graph,
                config,
                mode,
                backend,
                ticks,
                seed,
                output,
            } => {
                assert_eq!(graph.generator, GeneratorKind::Ring);
                assert_eq!(graph.nodes, 32);
                assert_eq!(ticks, 50);
                assert!(config.is_none());
                assert!(mode.is_none());
                assert!(backend.is_none());
                assert!(seed.is_none());
                assert!(output.is_none());
            }
            _ => panic!("Expected Layout command"),
        }
    }

    #[test]
    fn cli_parses_layout_options() {
        let cli = Cli::try_parse_from([
            "graphvis",
            "layout",
            "--generator",
            "tree",
            "--nodes",
            "100",
            "--arity",
            "3",
            "--mode",
            "auto",
            "--backend",
            "scalar",
            "--ticks",
            "5",
            "--seed",
            "9",
            "--output",
            "out.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Layout {
                graph,
                mode,
                backend,
                ticks,
                seed,
                output,
                ..
            } => {
                assert_eq!(
                    graph,
                    GraphArgs {
                        generator: GeneratorKind::Tree,
                        nodes: 100,
                        arity: 3
                    }
                );
                assert_eq!(mode, Some(StepMode::Auto));
                assert_eq!(backend, Some(BackendKind::Scalar));
                assert_eq!(ticks, 5);
                assert_eq!(seed, Some(9));
                assert_eq!(output, Some(PathBuf::from("out.txt")));
            }
            _ => panic!("Expected Layout command"),
        }
    }

    #[test]
    fn cli_parses_inspect_subcommand() {
        let cli = Cli::try_parse_from(["graphvis", "inspect", "-g", "hub", "-n", "5"]).unwrap();
        match cli.command {
            Commands::Inspect { graph } => {
                assert_eq!(graph.generator, GeneratorKind::Hub);
                assert_eq!(graph.nodes, 5);
            }
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_generator() {
        assert!(Cli::try_parse_from(["graphvis", "inspect", "--generator", "lattice"]).is_err());
    }

    #[test]
    fn options_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.yaml");
        std::fs::write(&path, "step_mode: wolfram\nseed: 1\niterations_per_frame: 3\n").unwrap();

        let options = LayoutOptions {
            config: Some(path),
            mode: Some(StepMode::Fixed),
            backend: None,
            seed: Some(5),
        };
        let config = options.resolve().unwrap();
        assert_eq!(config.step_mode, StepMode::Fixed);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.iterations_per_frame, 3);
    }
}
