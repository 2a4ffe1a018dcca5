//! Links transit stops to OSM boarding locations carrying their code

use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::geo::{build_index, within_radius};
use crate::model::{VertexId, VertexKind};

pub struct BoardingLocationLinker {
    search_radius_m: f64,
}

impl BoardingLocationLinker {
    pub fn new(search_radius_m: f64) -> Self {
        Self { search_radius_m }
    }
}

impl GraphBuilderStage for BoardingLocationLinker {
    fn kind(&self) -> StageKind {
        StageKind::BoardingLocations
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let locations: Vec<(VertexId, Vec<String>)> = ctx
            .graph
            .vertices()
            .filter_map(|v| match &v.kind {
                VertexKind::BoardingLocation { refs } => Some((v.id, refs.clone())),
                _ => None,
            })
            .collect();
        if locations.is_empty() {
            info!("No boarding locations to link");
            return Ok(());
        }

        let index = build_index(locations.iter().enumerate().filter_map(|(i, (id, _))| {
            let v = ctx.graph.vertex(*id)?;
            Some((i as u32, v.lat, v.lon))
        }));

        let mut links = Vec::new();
        for stop in ctx.transit.stops.values() {
            let Some(stop_vertex) = stop.vertex else {
                continue;
            };
            for (i, distance) in within_radius(&index, stop.lat, stop.lon, self.search_radius_m) {
                let (location, refs) = &locations[i as usize];
                let matches = refs
                    .iter()
                    .any(|r| r == &stop.id || stop.code.as_deref() == Some(r.as_str()));
                if matches {
                    links.push((stop_vertex, *location, distance));
                }
            }
        }

        for (stop_vertex, location, distance) in &links {
            ctx.graph.link(*stop_vertex, *location, *distance);
        }
        info!(links = links.len(), "Linked stops to boarding locations");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stop;
    use crate::stages::fixture::Fixture;

    #[test]
    fn test_links_by_code_within_radius() {
        let mut fixture = Fixture::default();
        let graph = &mut fixture.graph;
        let platform = graph.add_vertex(
            "osm:boarding:1",
            VertexKind::BoardingLocation {
                refs: vec!["101".into()],
            },
            50.0001,
            4.0,
        );
        let other = graph.add_vertex(
            "osm:boarding:2",
            VertexKind::BoardingLocation {
                refs: vec!["999".into()],
            },
            50.0001,
            4.0001,
        );
        let far = graph.add_vertex(
            "osm:boarding:3",
            VertexKind::BoardingLocation {
                refs: vec!["101".into()],
            },
            50.01,
            4.0,
        );
        let stop_vertex = graph.add_vertex(
            "stop:S1",
            VertexKind::TransitStop {
                stop_id: "S1".into(),
            },
            50.0,
            4.0,
        );
        fixture.transit.stops.insert(
            "S1".into(),
            Stop {
                id: "S1".into(),
                code: Some("101".into()),
                name: "Gare".into(),
                lat: 50.0,
                lon: 4.0,
                vertex: Some(stop_vertex),
            },
        );

        BoardingLocationLinker::new(50.0).execute(&mut fixture.ctx()).unwrap();

        let graph = &fixture.graph;
        assert_eq!(graph.outgoing(stop_vertex).len(), 1);
        assert_eq!(graph.outgoing(platform).len(), 1);
        assert!(graph.outgoing(other).is_empty());
        assert!(graph.outgoing(far).is_empty());
    }
}
