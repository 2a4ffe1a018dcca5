//! Street network import

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::datasource::DataSource;
use crate::geo::haversine_distance;
use crate::issues::IssueKind;
use crate::model::{EdgeKind, Graph, VertexId, VertexKind};
use crate::readers::{StreetData, StreetReader};

pub struct StreetImport {
    sources: Vec<DataSource>,
    reader: Arc<dyn StreetReader>,
}

impl StreetImport {
    pub fn new(sources: Vec<DataSource>, reader: Arc<dyn StreetReader>) -> Self {
        Self { sources, reader }
    }
}

pub fn street_vertex_label(node_id: i64) -> String {
    format!("osm:node:{node_id}")
}

#[derive(Debug, Default)]
struct ImportCounts {
    edges: usize,
    boarding_locations: usize,
    bike_rentals: usize,
}

fn add_street_data(graph: &mut Graph, data: &StreetData, missing: &mut Vec<(i64, i64)>) -> ImportCounts {
    let mut counts = ImportCounts::default();

    for way in &data.ways {
        let mut previous: Option<(VertexId, f64, f64)> = None;
        for node_id in &way.nodes {
            let Some(&(lat, lon)) = data.nodes.get(node_id) else {
                missing.push((way.id, *node_id));
                previous = None;
                continue;
            };
            let vertex = graph.add_vertex(street_vertex_label(*node_id), VertexKind::Street, lat, lon);
            if let Some((from, from_lat, from_lon)) = previous {
                if from != vertex {
                    let length = haversine_distance(from_lat, from_lon, lat, lon);
                    let kind = EdgeKind::Street {
                        way_id: way.id,
                        name: way.name.clone(),
                    };
                    if graph.add_edge(from, vertex, kind.clone(), length).is_some() {
                        counts.edges += 1;
                    }
                    if !way.oneway && graph.add_edge(vertex, from, kind, length).is_some() {
                        counts.edges += 1;
                    }
                }
            }
            previous = Some((vertex, lat, lon));
        }
    }

    for location in &data.boarding_locations {
        graph.add_vertex(
            format!("osm:boarding:{}", location.node_id),
            VertexKind::BoardingLocation {
                refs: location.refs.clone(),
            },
            location.lat,
            location.lon,
        );
        counts.boarding_locations += 1;
    }

    for station in &data.bike_rentals {
        graph.add_vertex(
            format!("osm:bike-rental:{}", station.node_id),
            VertexKind::BikeRental {
                name: station.name.clone(),
            },
            station.lat,
            station.lon,
        );
        counts.bike_rentals += 1;
    }

    counts
}

impl GraphBuilderStage for StreetImport {
    fn kind(&self) -> StageKind {
        StageKind::StreetImport
    }

    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        self.sources.iter().try_for_each(|s| self.reader.check(s))
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        for source in &self.sources {
            let data = self
                .reader
                .read(source)
                .with_context(|| format!("Failed to read street data from {}", source.path.display()))?;

            let mut missing = Vec::new();
            let counts = add_street_data(ctx.graph, &data, &mut missing);
            for (way_id, node_id) in missing {
                ctx.issues.add(
                    IssueKind::MissingNode,
                    format!("Way {way_id} references missing node {node_id}"),
                );
            }
            info!(
                source = %source.name(),
                edges = counts.edges,
                boarding_locations = counts.boarding_locations,
                bike_rentals = counts.bike_rentals,
                "Imported street network"
            );
        }
        ctx.graph.set_has_streets(true);
        info!(
            vertices = ctx.graph.count_vertices(),
            edges = ctx.graph.count_edges(),
            "Street graph ready"
        );
        Ok(())
    }
}
