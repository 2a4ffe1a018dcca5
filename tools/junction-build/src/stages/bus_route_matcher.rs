//! Matches bus routes onto the street network

use std::collections::BTreeMap;
use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::geo::nearest_within;
use crate::issues::IssueKind;
use crate::model::{RouteMode, VertexId};

pub struct BusRouteStreetMatcher {
    max_distance_m: f64,
}

impl BusRouteStreetMatcher {
    pub fn new(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }
}

impl GraphBuilderStage for BusRouteStreetMatcher {
    fn kind(&self) -> StageKind {
        StageKind::BusRouteStreetMatcher
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let index = ctx.graph.street_index();
        let transit = &mut *ctx.transit;

        let mut geometries: BTreeMap<String, Vec<VertexId>> = BTreeMap::new();
        for route in transit.routes.values().filter(|r| r.mode == RouteMode::Bus) {
            // One representative trip per route
            let Some(trip) = transit.trips.iter().find(|t| t.route_id == route.id) else {
                continue;
            };

            let mut path: Vec<VertexId> = Vec::new();
            let mut unmatched = Vec::new();
            for stop_time in &trip.stop_times {
                let Some(stop) = transit.stops.get(&stop_time.stop_id) else {
                    continue;
                };
                match nearest_within(&index, stop.lat, stop.lon, self.max_distance_m) {
                    Some((vertex, _)) => {
                        if path.last() != Some(&VertexId(vertex)) {
                            path.push(VertexId(vertex));
                        }
                    }
                    None => unmatched.push(stop.id.as_str()),
                }
            }

            if !unmatched.is_empty() {
                ctx.issues.add(
                    IssueKind::BusRouteNotMatched,
                    format!(
                        "Bus route {} has {} stops without a street within {}m: {}",
                        route.id,
                        unmatched.len(),
                        self.max_distance_m,
                        unmatched.join(", ")
                    ),
                );
            }
            if !path.is_empty() {
                geometries.insert(route.id.clone(), path);
            }
        }

        info!(matched_routes = geometries.len(), "Matched bus routes to streets");
        transit.route_geometries.extend(geometries);
        Ok(())
    }
}
