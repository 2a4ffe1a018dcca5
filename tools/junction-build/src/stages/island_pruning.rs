//! Removes small disconnected street islands
//!
//! Components are counted over street and link edges together, so an island
//! reached by a transit stop is judged against the (lower) threshold for
//! islands with stops. Stops on a pruned island stay in the graph but lose
//! their street links.

use std::collections::HashSet;
use tracing::{debug, info};

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::config::IslandPruningConfig;
use crate::issues::IssueKind;
use crate::model::{EdgeId, VertexId, VertexKind};

pub struct IslandPruner {
    config: IslandPruningConfig,
}

impl IslandPruner {
    pub fn new(config: IslandPruningConfig) -> Self {
        Self { config }
    }
}

struct Island {
    vertices: Vec<VertexId>,
    street_vertices: usize,
    has_stop: bool,
}

impl GraphBuilderStage for IslandPruner {
    fn kind(&self) -> StageKind {
        StageKind::IslandPruning
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let graph = &mut *ctx.graph;
        let street: HashSet<VertexId> = graph.street_vertex_ids().into_iter().collect();

        let islands: Vec<Island> = graph
            .connected_components()
            .into_iter()
            .map(|vertices| Island {
                street_vertices: vertices.iter().filter(|v| street.contains(v)).count(),
                has_stop: vertices.iter().any(|v| {
                    graph
                        .vertex(*v)
                        .is_some_and(|v| matches!(v.kind, VertexKind::TransitStop { .. }))
                }),
                vertices,
            })
            .filter(|island| island.street_vertices > 0)
            .collect();

        // The main network is never pruned, whatever the thresholds
        let main = islands
            .iter()
            .enumerate()
            .max_by_key(|(i, island)| (island.street_vertices, std::cmp::Reverse(*i)))
            .map(|(i, _)| i);

        let mut pruned_islands = 0usize;
        let mut pruned_vertices = 0usize;
        for (i, island) in islands.iter().enumerate() {
            let threshold = if island.has_stop {
                self.config.threshold_with_stops
            } else {
                self.config.threshold_without_stops
            };
            if Some(i) == main || island.street_vertices >= threshold {
                continue;
            }

            for vertex in &island.vertices {
                if street.contains(vertex) {
                    graph.remove_vertex(*vertex);
                    pruned_vertices += 1;
                } else {
                    let edges: Vec<EdgeId> = graph.incident_edges(*vertex).map(|e| e.id).collect();
                    for edge in edges {
                        graph.remove_edge(edge);
                    }
                }
            }
            pruned_islands += 1;
            debug!(
                street_vertices = island.street_vertices,
                has_stop = island.has_stop,
                "Pruned street island"
            );
            ctx.issues.add(
                IssueKind::GraphIsland,
                format!(
                    "Pruned island of {} street vertices{}",
                    island.street_vertices,
                    if island.has_stop { ", its stops were unlinked" } else { "" }
                ),
            );
        }

        info!(islands = pruned_islands, pruned_vertices, "Pruned street islands");
        Ok(())
    }
}
