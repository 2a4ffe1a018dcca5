//! Applies elevation samples to vertices and derives edge climb and descent

use anyhow::Context;
use std::collections::HashMap;
use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::elevation::ElevationSource;
use crate::issues::IssueKind;
use crate::model::VertexId;

pub struct ElevationApplier {
    source: Box<dyn ElevationSource>,
    report_missing: bool,
}

impl ElevationApplier {
    pub fn new(source: Box<dyn ElevationSource>) -> Self {
        Self {
            source,
            report_missing: true,
        }
    }

    /// Skip the `ElevationMissing` issue; a later elevation stage may still
    /// cover the remaining edges.
    pub fn without_missing_report(mut self) -> Self {
        self.report_missing = false;
        self
    }
}

impl GraphBuilderStage for ElevationApplier {
    fn kind(&self) -> StageKind {
        StageKind::Elevation
    }

    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        self.source.check()
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let data = self
            .source
            .load(ctx.graph)
            .with_context(|| format!("Failed to load elevation from {}", self.source.describe()))?;

        let mut covered = 0usize;
        let mut uncovered = 0usize;
        for vertex in ctx.graph.vertices_mut() {
            match data.elevation_at(vertex.lat, vertex.lon) {
                Some(elevation) => {
                    vertex.elevation = Some(elevation);
                    covered += 1;
                }
                None => uncovered += 1,
            }
        }

        let elevations: HashMap<VertexId, f64> = ctx
            .graph
            .vertices()
            .filter_map(|v| Some((v.id, v.elevation?)))
            .collect();

        let mut missing_edges = 0usize;
        for edge in ctx.graph.edges_mut().filter(|e| e.is_street()) {
            match (elevations.get(&edge.from), elevations.get(&edge.to)) {
                (Some(from), Some(to)) => {
                    let delta = to - from;
                    edge.climb_m = Some(delta.max(0.0));
                    edge.descent_m = Some((-delta).max(0.0));
                }
                _ => missing_edges += 1,
            }
        }

        if missing_edges > 0 && self.report_missing {
            ctx.issues.add(
                IssueKind::ElevationMissing,
                format!("{missing_edges} street edges lack elevation at one end"),
            );
        }
        info!(
            source = %self.source.describe(),
            tiles = data.tile_count(),
            covered,
            uncovered,
            missing_edges,
            "Applied elevation data"
        );
        Ok(())
    }
}
