//! Shared graph and transit model mutated by the build stages

pub mod graph;
pub mod transit;

pub use graph::{Edge, EdgeId, EdgeKind, Graph, Vertex, VertexId, VertexKind};
pub use transit::{
    Agency, FlexArea, Route, RouteMode, ServiceCalendar, ServicePeriod, Stop, StopTime, Transfer, TransitModel, Trip,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Graph and transit model persisted together after a full build
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphBundle {
    pub graph: Graph,
    pub transit: TransitModel,
}

impl GraphBundle {
    pub fn save(graph: &Graph, transit: &TransitModel, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct BundleRef<'a> {
            graph: &'a Graph,
            transit: &'a TransitModel,
        }

        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), &BundleRef { graph, transit })
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut bundle: GraphBundle = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        bundle.graph.rebuild_indexes();
        Ok(bundle)
    }
}
