//! Command line interface for junction-build

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::builder::{BuildOptions, GraphBuilder};
use crate::config::BuildConfig;
use crate::datasource::{
    classify, scan_directory, DataSourceSet, InputLocation, CACHE_DIRNAME, GRAPH_FILENAME, REPORT_DIRNAME,
    STREET_GRAPH_FILENAME,
};
use crate::issues::IssueStore;
use crate::logging::init_logging;
use crate::model::{Graph, GraphBundle, TransitModel};
use crate::stages::{Readers, StageFactory};

#[derive(Parser)]
#[command(name = "junction-build")]
#[command(about = "Build a multimodal routing graph from street, transit and elevation data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides this
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full build for a graph directory
    Build {
        #[command(flatten)]
        args: BuildArgs,

        /// Write the finished graph and transit model to graph.json
        #[arg(long)]
        save: bool,
    },

    /// Print the stages a build would run, without running them
    Plan {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Print how each input is classified
    Classify {
        #[command(flatten)]
        args: BuildArgs,
    },
}

#[derive(Args)]
pub struct BuildArgs {
    /// Graph directory holding inputs, build-config.json and outputs
    pub graph_dir: PathBuf,

    /// Input file or directory, optionally tagged (`gtfs:feeds/oslo`); repeatable.
    /// Without any, the graph directory is scanned.
    #[arg(short, long = "input")]
    pub inputs: Vec<String>,

    /// Build config file (default: <GRAPH_DIR>/build-config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable a feature (FlexRouting, TransferAnalyzer, DataOverlay); repeatable
    #[arg(long = "feature")]
    pub features: Vec<String>,

    /// Start from <GRAPH_DIR>/streetGraph.json
    #[arg(long)]
    pub load_street_graph: bool,

    /// Write the street graph to <GRAPH_DIR>/streetGraph.json after the build
    #[arg(long)]
    pub save_street_graph: bool,
}

impl BuildArgs {
    fn options(&self) -> BuildOptions {
        BuildOptions {
            load_street_graph: self.load_street_graph,
            save_street_graph: self.save_street_graph,
        }
    }

    fn load_config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load(path)?,
            None => BuildConfig::load_from_dir(&self.graph_dir)?,
        };
        for name in &self.features {
            config.features.enable(name)?;
        }
        Ok(config)
    }

    fn sources(&self) -> Result<DataSourceSet> {
        let locations: Vec<InputLocation> = if self.inputs.is_empty() {
            scan_directory(&self.graph_dir)
                .with_context(|| format!("Failed to scan {}", self.graph_dir.display()))?
        } else {
            self.inputs.iter().map(|arg| InputLocation::parse_arg(arg)).collect()
        };
        let sources = classify(locations)?;
        Ok(sources.with_directories(self.graph_dir.join(CACHE_DIRNAME), self.graph_dir.join(REPORT_DIRNAME)))
    }

    fn street_graph_path(&self) -> PathBuf {
        self.graph_dir.join(STREET_GRAPH_FILENAME)
    }
}

/// Graph, transit model and issue store ready for stage selection
struct Prepared {
    factory: StageFactory,
    sources: DataSourceSet,
    graph: Graph,
    transit: TransitModel,
    issues: IssueStore,
}

fn prepare(args: &BuildArgs) -> Result<Prepared> {
    let config = args.load_config()?;
    let sources = args.sources()?;
    info!(
        inputs = sources.len(),
        features = ?config.features.enabled_names(),
        "Loaded build configuration"
    );

    let graph = if args.load_street_graph {
        let path = args.street_graph_path();
        let graph = Graph::load(&path).with_context(|| format!("Failed to load street graph {}", path.display()))?;
        info!(
            vertices = graph.count_vertices(),
            edges = graph.count_edges(),
            "Loaded street graph"
        );
        graph
    } else {
        Graph::new()
    };

    let mut transit = TransitModel::new(config.service_period());
    let factory = StageFactory::new(config, Readers::standard()?);
    factory.preload_agencies(&sources, &mut transit);

    Ok(Prepared {
        factory,
        sources,
        graph,
        transit,
        issues: IssueStore::new(),
    })
}

fn build(args: &BuildArgs, save: bool) -> Result<()> {
    let mut prepared = prepare(args)?;
    let summary = {
        let mut builder = GraphBuilder::create(
            &prepared.factory,
            &prepared.sources,
            args.options(),
            &mut prepared.graph,
            &mut prepared.transit,
            &mut prepared.issues,
        );
        builder.run()?
    };

    if args.save_street_graph {
        let path = args.street_graph_path();
        prepared.graph.save(&path)?;
        info!(path = %path.display(), "Saved street graph");
    }
    if save {
        let path = args.graph_dir.join(GRAPH_FILENAME);
        GraphBundle::save(&prepared.graph, &prepared.transit, &path)?;
        info!(path = %path.display(), "Saved graph");
    }

    println!(
        "Built graph with {} vertices and {} edges in {:.2}s ({} issues)",
        summary.vertices,
        summary.edges,
        summary.elapsed.as_secs_f64(),
        summary.issues.total
    );
    Ok(())
}

fn plan(args: &BuildArgs) -> Result<()> {
    let mut prepared = prepare(args)?;
    let builder = GraphBuilder::create(
        &prepared.factory,
        &prepared.sources,
        args.options(),
        &mut prepared.graph,
        &mut prepared.transit,
        &mut prepared.issues,
    );
    for (i, kind) in builder.stage_kinds().iter().enumerate() {
        println!("{:>2}. {}", i + 1, kind);
    }
    Ok(())
}

fn print_sources(graph_dir: &Path, sources: &DataSourceSet) {
    println!("Inputs for {}:", graph_dir.display());
    for source in sources.iter() {
        println!("  {:<6} {}", source.file_type.tag(), source.path.display());
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        init_logging(self.verbose, self.log_json);

        match self.command {
            Commands::Build { args, save } => build(&args, save),
            Commands::Plan { args } => plan(&args),
            Commands::Classify { args } => {
                let sources = args.sources()?;
                print_sources(&args.graph_dir, &sources);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_args() {
        let cli = Cli::try_parse_from([
            "junction-build",
            "-v",
            "build",
            "graphs/oslo",
            "--input",
            "osm:streets.pbf",
            "-i",
            "gtfs:feeds/ruter",
            "--feature",
            "TransferAnalyzer",
            "--save",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Build { args, save } = cli.command else {
            panic!("expected build");
        };
        assert!(save);
        assert_eq!(args.graph_dir, PathBuf::from("graphs/oslo"));
        assert_eq!(args.inputs, vec!["osm:streets.pbf", "gtfs:feeds/ruter"]);
        let config = args.load_config().unwrap();
        assert!(config.features.transfer_analyzer);
    }

    #[test]
    fn test_unknown_feature_suggests_name() {
        let cli = Cli::try_parse_from(["junction-build", "plan", "g", "--feature", "TransferAnalyser"]).unwrap();
        let Commands::Plan { args } = cli.command else {
            panic!("expected plan");
        };
        let err = args.load_config().unwrap_err().to_string();
        assert!(err.contains("TransferAnalyzer"), "{err}");
    }

    #[test]
    fn test_unrecognized_input_keeps_its_type() {
        let cli = Cli::try_parse_from(["junction-build", "classify", "g", "-i", "gtsf:feeds/ruter"]).unwrap();
        let Commands::Classify { args } = cli.command else {
            panic!("expected classify");
        };
        let err = args.sources().unwrap_err();
        match err.downcast_ref::<junction_common::Error>() {
            Some(junction_common::Error::UnrecognizedInput { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("gtfs"));
            }
            _ => panic!("unexpected error: {err:#}"),
        }
    }
}
