//! Transit schedule import, shared by the GTFS and NeTEx stages

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::datasource::DataSource;
use crate::issues::IssueKind;
use crate::model::VertexKind;
use crate::readers::{ScheduleData, ScheduleReader};

pub struct ScheduleImport {
    kind: StageKind,
    sources: Vec<DataSource>,
    reader: Arc<dyn ScheduleReader>,
}

impl ScheduleImport {
    pub fn gtfs(sources: Vec<DataSource>, reader: Arc<dyn ScheduleReader>) -> Self {
        Self {
            kind: StageKind::GtfsImport,
            sources,
            reader,
        }
    }

    pub fn netex(sources: Vec<DataSource>, reader: Arc<dyn ScheduleReader>) -> Self {
        Self {
            kind: StageKind::NetexImport,
            sources,
            reader,
        }
    }
}

pub fn stop_vertex_label(stop_id: &str) -> String {
    format!("stop:{stop_id}")
}

#[derive(Debug, Default)]
struct MergeCounts {
    stops: usize,
    trips: usize,
    dropped: usize,
}

fn merge(ctx: &mut BuildContext, data: ScheduleData) -> MergeCounts {
    let mut counts = MergeCounts::default();
    let transit = &mut *ctx.transit;

    for agency in data.agencies {
        transit.register_agency(agency);
    }

    for mut stop in data.stops {
        if transit.stops.contains_key(&stop.id) {
            continue;
        }
        let vertex = ctx.graph.add_vertex(
            stop_vertex_label(&stop.id),
            VertexKind::TransitStop {
                stop_id: stop.id.clone(),
            },
            stop.lat,
            stop.lon,
        );
        stop.vertex = Some(vertex);
        transit.stops.insert(stop.id.clone(), stop);
        counts.stops += 1;
    }

    for route in data.routes {
        transit.routes.entry(route.id.clone()).or_insert(route);
    }
    for service in data.services {
        transit.services.entry(service.service_id.clone()).or_insert(service);
    }
    transit.flex_areas.extend(data.flex_areas);

    for trip in data.trips {
        let Some(service) = transit.services.get(&trip.service_id) else {
            ctx.issues.add(
                IssueKind::TripWithoutService,
                format!("Trip {} references unknown service {}", trip.id, trip.service_id),
            );
            counts.dropped += 1;
            continue;
        };
        if !service.operates_within(&transit.service_period) {
            ctx.issues.add(
                IssueKind::TripOutsideServicePeriod,
                format!("Trip {} does not run within the service period", trip.id),
            );
            counts.dropped += 1;
            continue;
        }
        for stop_time in &trip.stop_times {
            if !transit.stops.contains_key(&stop_time.stop_id) {
                ctx.issues.add(
                    IssueKind::StopWithoutVertex,
                    format!("Trip {} calls at unknown stop {}", trip.id, stop_time.stop_id),
                );
            }
        }
        transit.trips.push(trip);
        counts.trips += 1;
    }

    counts
}

impl GraphBuilderStage for ScheduleImport {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        self.sources.iter().try_for_each(|s| self.reader.check(s))
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        for source in &self.sources {
            let data = self
                .reader
                .read(source)
                .with_context(|| format!("Failed to read schedule data from {}", source.path.display()))?;
            let counts = merge(ctx, data);
            info!(
                source = %source.name(),
                stops = counts.stops,
                trips = counts.trips,
                dropped_trips = counts.dropped,
                "Imported transit schedule"
            );
        }
        Ok(())
    }
}
