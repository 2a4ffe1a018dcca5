//! Walking transfers between nearby stops and their analysis

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::geo::{build_index, within_radius};
use crate::issues::IssueKind;
use crate::model::{Graph, Stop, Transfer, VertexId};

/// Generates straight-line transfers between every pair of stops within range
pub struct DirectTransferGenerator {
    max_distance_m: f64,
}

impl DirectTransferGenerator {
    pub fn new(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }
}

/// Elevation of a stop, borrowed from a linked neighbour when it has none
fn stop_elevation(graph: &Graph, vertex: VertexId) -> Option<f64> {
    let v = graph.vertex(vertex)?;
    v.elevation.or_else(|| {
        graph
            .outgoing(vertex)
            .iter()
            .filter_map(|e| graph.edge(*e))
            .filter(|e| e.is_link())
            .find_map(|e| graph.vertex(e.to)?.elevation)
    })
}

impl GraphBuilderStage for DirectTransferGenerator {
    fn kind(&self) -> StageKind {
        StageKind::DirectTransfers
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let stops: Vec<(&Stop, Option<f64>)> = ctx
            .transit
            .stops
            .values()
            .filter_map(|s| {
                let vertex = s.vertex?;
                ctx.graph.vertex(vertex)?;
                Some((s, stop_elevation(ctx.graph, vertex)))
            })
            .collect();
        let index = build_index(stops.iter().enumerate().map(|(i, (s, _))| (i as u32, s.lat, s.lon)));

        let mut transfers: Vec<Transfer> = stops
            .par_iter()
            .enumerate()
            .flat_map_iter(|(i, (from, from_z))| {
                within_radius(&index, from.lat, from.lon, self.max_distance_m)
                    .into_iter()
                    .filter(move |(j, _)| *j as usize != i)
                    .map(|(j, horizontal)| {
                        let (to, to_z) = &stops[j as usize];
                        let dz = match (from_z, to_z) {
                            (Some(a), Some(b)) => b - a,
                            _ => 0.0,
                        };
                        Transfer {
                            from_stop: from.id.clone(),
                            to_stop: to.id.clone(),
                            distance_m: horizontal.hypot(dz),
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        transfers.sort_by(|a, b| (&a.from_stop, &a.to_stop).cmp(&(&b.from_stop, &b.to_stop)));

        info!(
            stops = stops.len(),
            transfers = transfers.len(),
            max_distance_m = self.max_distance_m,
            "Generated direct transfers"
        );
        ctx.transit.transfers = transfers;
        Ok(())
    }
}

/// Reports stops that no transfer reaches
#[derive(Debug, Default)]
pub struct TransferAnalyzer;

impl GraphBuilderStage for TransferAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::TransferAnalyzer
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let mut per_stop: BTreeMap<&str, usize> = ctx.transit.stops.keys().map(|id| (id.as_str(), 0)).collect();
        for transfer in &ctx.transit.transfers {
            if let Some(count) = per_stop.get_mut(transfer.from_stop.as_str()) {
                *count += 1;
            }
        }

        let isolated: Vec<&str> = per_stop.iter().filter(|(_, n)| **n == 0).map(|(id, _)| *id).collect();
        for stop in &isolated {
            ctx.issues.add(
                IssueKind::StopWithoutTransfers,
                format!("Stop {stop} has no transfers to other stops"),
            );
        }

        let total: usize = per_stop.values().sum();
        let max = per_stop.values().copied().max().unwrap_or(0);
        if !per_stop.is_empty() {
            let mean = total as f64 / per_stop.len() as f64;
            info!(
                stops = per_stop.len(),
                without_transfers = isolated.len(),
                mean = %format!("{mean:.1}"),
                max,
                "Transfer statistics"
            );
        }
        if !isolated.is_empty() {
            warn!(count = isolated.len(), "Stops without transfers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VertexKind;
    use crate::stages::fixture::Fixture;

    fn add_stop(fixture: &mut Fixture, id: &str, lat: f64, lon: f64) -> VertexId {
        let vertex = fixture.graph.add_vertex(
            format!("stop:{id}"),
            VertexKind::TransitStop { stop_id: id.into() },
            lat,
            lon,
        );
        fixture.transit.stops.insert(
            id.into(),
            Stop {
                id: id.into(),
                code: None,
                name: id.into(),
                lat,
                lon,
                vertex: Some(vertex),
            },
        );
        vertex
    }

    #[test]
    fn test_transfers_within_range_both_directions() {
        let mut fixture = Fixture::default();
        add_stop(&mut fixture, "A", 50.0, 4.0);
        add_stop(&mut fixture, "B", 50.001, 4.0);
        add_stop(&mut fixture, "FAR", 50.1, 4.0);

        DirectTransferGenerator::new(500.0).execute(&mut fixture.ctx()).unwrap();

        let pairs: Vec<(&str, &str)> = fixture
            .transit
            .transfers
            .iter()
            .map(|t| (t.from_stop.as_str(), t.to_stop.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "B"), ("B", "A")]);
        let d = fixture.transit.transfers[0].distance_m;
        assert!((d - 111.2).abs() < 1.0, "got {d}");

        TransferAnalyzer.execute(&mut fixture.ctx()).unwrap();
        assert_eq!(fixture.issues.count(IssueKind::StopWithoutTransfers), 1);
    }

    #[test]
    fn test_height_difference_lengthens_transfer() {
        let mut fixture = Fixture::default();
        let a = add_stop(&mut fixture, "A", 50.0, 4.0);
        let b = add_stop(&mut fixture, "B", 50.001, 4.0);
        let street = fixture.graph.add_vertex("street", VertexKind::Street, 50.001, 4.0);
        fixture.graph.link(b, street, 1.0);
        fixture.graph.vertex_mut(a).unwrap().elevation = Some(0.0);
        fixture.graph.vertex_mut(street).unwrap().elevation = Some(100.0);

        DirectTransferGenerator::new(500.0).execute(&mut fixture.ctx()).unwrap();

        let flat = crate::geo::haversine_distance(50.0, 4.0, 50.001, 4.0);
        let d = fixture.transit.transfers[0].distance_m;
        assert!((d - flat.hypot(100.0)).abs() < 1e-6, "got {d}");
    }
}
