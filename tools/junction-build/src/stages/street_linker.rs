//! Connects stops, boarding locations and rental stations to the streets

use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::geo::nearest_within;
use crate::issues::IssueKind;
use crate::model::{VertexId, VertexKind};

pub struct StreetLinker {
    max_distance_m: f64,
}

impl StreetLinker {
    pub fn new(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }
}

/// Boarding locations go first so stops reach the street through them
fn link_order(kind: &VertexKind) -> Option<u8> {
    match kind {
        VertexKind::BoardingLocation { .. } => Some(0),
        VertexKind::BikeRental { .. } => Some(1),
        VertexKind::TransitStop { .. } => Some(2),
        VertexKind::Street => None,
    }
}

impl GraphBuilderStage for StreetLinker {
    fn kind(&self) -> StageKind {
        StageKind::StreetLinker
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let mut candidates: Vec<(u8, VertexId)> = ctx
            .graph
            .vertices()
            .filter_map(|v| Some((link_order(&v.kind)?, v.id)))
            .collect();
        candidates.sort();

        let index = ctx.graph.street_index();
        let mut linked = 0usize;
        let mut unlinked = 0usize;

        for (_, id) in candidates {
            if ctx.graph.is_connected_to_streets(id) {
                continue;
            }
            let Some(vertex) = ctx.graph.vertex(id) else {
                continue;
            };
            let (lat, lon) = (vertex.lat, vertex.lon);
            let stop_id = match &vertex.kind {
                VertexKind::TransitStop { stop_id } => Some(stop_id.clone()),
                _ => None,
            };

            match nearest_within(&index, lat, lon, self.max_distance_m) {
                Some((street, distance)) => {
                    ctx.graph.link(id, VertexId(street), distance);
                    linked += 1;
                }
                None => {
                    unlinked += 1;
                    if let (Some(stop_id), true) = (stop_id, ctx.graph.has_streets()) {
                        ctx.issues.add(
                            IssueKind::StopUnlinked,
                            format!(
                                "Stop {stop_id} at ({lat:.6}, {lon:.6}) has no street within {}m",
                                self.max_distance_m
                            ),
                        );
                    }
                }
            }
        }

        info!(linked, unlinked, "Linked vertices to the street network");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeKind;
    use crate::stages::fixture::Fixture;

    fn stop(fixture: &mut Fixture, id: &str, lat: f64, lon: f64) -> VertexId {
        fixture.graph.add_vertex(
            format!("stop:{id}"),
            VertexKind::TransitStop { stop_id: id.into() },
            lat,
            lon,
        )
    }

    #[test]
    fn test_links_nearest_street_vertex() {
        let mut fixture = Fixture::default();
        let a = fixture.graph.add_vertex("a", VertexKind::Street, 50.0, 4.0);
        let b = fixture.graph.add_vertex("b", VertexKind::Street, 50.001, 4.0);
        fixture
            .graph
            .add_edge(a, b, EdgeKind::Street { way_id: 1, name: None }, 111.0);
        fixture.graph.set_has_streets(true);

        let near = stop(&mut fixture, "NEAR", 50.0009, 4.0001);
        let far = stop(&mut fixture, "FAR", 50.1, 4.0);
        let rental = fixture
            .graph
            .add_vertex("bike", VertexKind::BikeRental { name: None }, 50.0, 4.0001);

        StreetLinker::new(100.0).execute(&mut fixture.ctx()).unwrap();

        let graph = &fixture.graph;
        assert!(graph.is_connected_to_streets(near));
        let target = graph.outgoing(near).iter().map(|e| graph.edge(*e).unwrap().to).next();
        assert_eq!(target, Some(b));
        assert!(graph.is_connected_to_streets(rental));
        assert!(!graph.is_connected_to_streets(far));
        assert_eq!(fixture.issues.count(IssueKind::StopUnlinked), 1);
    }

    #[test]
    fn test_stop_reaches_street_through_boarding_location() {
        let mut fixture = Fixture::default();
        let a = fixture.graph.add_vertex("a", VertexKind::Street, 50.0, 4.0);
        let b = fixture.graph.add_vertex("b", VertexKind::Street, 50.001, 4.0);
        fixture
            .graph
            .add_edge(a, b, EdgeKind::Street { way_id: 1, name: None }, 111.0);
        let platform = fixture.graph.add_vertex(
            "platform",
            VertexKind::BoardingLocation { refs: vec!["1".into()] },
            50.0002,
            4.0001,
        );
        let s = stop(&mut fixture, "S", 50.0002, 4.0002);
        fixture.graph.link(s, platform, 7.0);

        StreetLinker::new(100.0).execute(&mut fixture.ctx()).unwrap();

        // Only the platform got a street link; the stop keeps its single link
        assert_eq!(fixture.graph.outgoing(s).len(), 1);
        assert!(fixture.graph.is_connected_to_streets(platform));
    }

    #[test]
    fn test_no_issue_without_streets() {
        let mut fixture = Fixture::default();
        stop(&mut fixture, "S", 50.0, 4.0);
        StreetLinker::new(100.0).execute(&mut fixture.ctx()).unwrap();
        assert!(fixture.issues.is_empty());
    }
}
