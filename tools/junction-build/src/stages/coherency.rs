//! Structural checks on the finished graph

use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::issues::IssueKind;

#[derive(Debug, Default)]
pub struct CoherencyChecker;

impl GraphBuilderStage for CoherencyChecker {
    fn kind(&self) -> StageKind {
        StageKind::CoherencyCheck
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let graph = &*ctx.graph;
        let mut incoherent = 0usize;
        for edge in graph.edges() {
            let problem = if graph.vertex(edge.from).is_none() || graph.vertex(edge.to).is_none() {
                Some("references a missing vertex")
            } else if !graph.outgoing(edge.from).contains(&edge.id) || !graph.incoming(edge.to).contains(&edge.id) {
                Some("is missing from its vertices' adjacency")
            } else {
                None
            };
            if let Some(problem) = problem {
                incoherent += 1;
                ctx.issues.add(
                    IssueKind::IncoherentEdge,
                    format!("Edge {} ({} -> {}) {problem}", edge.id.0, edge.from, edge.to),
                );
            }
        }

        let mut isolated = 0usize;
        for vertex in graph.vertices() {
            if graph.incident_edges(vertex.id).next().is_none() {
                isolated += 1;
                ctx.issues.add(
                    IssueKind::IsolatedVertex,
                    format!("Vertex {} ({}) has no edges", vertex.id, vertex.label),
                );
            }
        }

        info!(
            vertices = graph.count_vertices(),
            edges = graph.count_edges(),
            incoherent,
            isolated,
            "Checked graph coherency"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKind, VertexKind};
    use crate::stages::fixture::Fixture;

    #[test]
    fn test_healthy_graph_has_no_issues() {
        let mut fixture = Fixture::default();
        let a = fixture.graph.add_vertex("a", VertexKind::Street, 50.0, 4.0);
        let b = fixture.graph.add_vertex("b", VertexKind::Street, 50.001, 4.0);
        fixture
            .graph
            .add_edge(a, b, EdgeKind::Street { way_id: 1, name: None }, 111.0);

        CoherencyChecker.execute(&mut fixture.ctx()).unwrap();
        assert!(fixture.issues.is_empty());
    }

    #[test]
    fn test_isolated_vertex_reported() {
        let mut fixture = Fixture::default();
        fixture
            .graph
            .add_vertex("stop:S", VertexKind::TransitStop { stop_id: "S".into() }, 50.0, 4.0);

        CoherencyChecker.execute(&mut fixture.ctx()).unwrap();
        assert_eq!(fixture.issues.count(IssueKind::IsolatedVertex), 1);
    }

    #[test]
    fn test_dangling_edge_after_raw_removal() {
        let mut fixture = Fixture::default();
        let a = fixture.graph.add_vertex("a", VertexKind::Street, 50.0, 4.0);
        let b = fixture.graph.add_vertex("b", VertexKind::Street, 50.001, 4.0);
        let edge = fixture
            .graph
            .add_edge(a, b, EdgeKind::Street { way_id: 1, name: None }, 111.0)
            .unwrap();
        // Point the edge at a vertex that does not exist
        fixture.graph.edge_mut(edge).unwrap().to = crate::model::VertexId(99);

        CoherencyChecker.execute(&mut fixture.ctx()).unwrap();
        assert_eq!(fixture.issues.count(IssueKind::IncoherentEdge), 1);
    }
}
