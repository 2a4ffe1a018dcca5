//! Shared fixtures for the integration tests
#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use junction_build::datasource::{DataSource, DataSourceSet, FileType};
use junction_build::elevation::TileFetcher;
use junction_build::model::{Agency, Route, RouteMode, ServiceCalendar, Stop, StopTime, Trip};
use junction_build::readers::{ScheduleData, ScheduleReader, StreetData, StreetReader, StreetWay};
use junction_build::stages::{BuildContext, GraphBuilderStage, Readers, StageKind};

/// A 3x3 street grid around (59.91, 10.75); every reader check passes
pub struct FakeStreets;

impl StreetReader for FakeStreets {
    fn check(&self, _source: &DataSource) -> Result<(), String> {
        Ok(())
    }

    fn read(&self, _source: &DataSource) -> anyhow::Result<StreetData> {
        let mut nodes = HashMap::new();
        for row in 0..3i64 {
            for col in 0..3i64 {
                nodes.insert(row * 3 + col + 1, (59.91 + row as f64 * 0.001, 10.75 + col as f64 * 0.002));
            }
        }
        let mut ways = Vec::new();
        for i in 0..3i64 {
            ways.push(way(100 + i, vec![i * 3 + 1, i * 3 + 2, i * 3 + 3]));
            ways.push(way(200 + i, vec![i + 1, i + 4, i + 7]));
        }
        Ok(StreetData {
            nodes,
            ways,
            ..StreetData::default()
        })
    }
}

fn way(id: i64, nodes: Vec<i64>) -> StreetWay {
    StreetWay {
        id,
        nodes,
        highway: "residential".into(),
        name: None,
        oneway: false,
    }
}

pub struct FakeSchedule(pub ScheduleData);

impl ScheduleReader for FakeSchedule {
    fn check(&self, _source: &DataSource) -> Result<(), String> {
        Ok(())
    }

    fn read(&self, _source: &DataSource) -> anyhow::Result<ScheduleData> {
        Ok(self.0.clone())
    }
}

pub struct NoTiles;

impl TileFetcher for NoTiles {
    fn fetch(&self, _url: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bus route per agency, each with a single trip running on `day`
pub fn schedule(agencies: &[(&str, &str)], day: NaiveDate) -> ScheduleData {
    let mut data = ScheduleData {
        stops: vec![
            stop("S1", 59.9101, 10.7501),
            stop("S2", 59.9119, 10.7539),
        ],
        services: vec![ServiceCalendar::from_dates("DAY", [day]).unwrap()],
        ..ScheduleData::default()
    };
    for (id, zone) in agencies {
        data.agencies.push(Agency {
            id: id.to_string(),
            name: id.to_string(),
            time_zone: zone.to_string(),
        });
        data.routes.push(Route {
            id: format!("R-{id}"),
            agency_id: id.to_string(),
            short_name: None,
            mode: RouteMode::Bus,
        });
        data.trips.push(Trip {
            id: format!("T-{id}"),
            route_id: format!("R-{id}"),
            service_id: "DAY".into(),
            stop_times: vec![stop_time("S1", 8 * 3600, 1), stop_time("S2", 8 * 3600 + 300, 2)],
            time_shift_seconds: 0,
        });
    }
    data
}

fn stop(id: &str, lat: f64, lon: f64) -> Stop {
    Stop {
        id: id.into(),
        code: None,
        name: id.into(),
        lat,
        lon,
        vertex: None,
    }
}

fn stop_time(stop_id: &str, time: i32, sequence: u32) -> StopTime {
    StopTime {
        stop_id: stop_id.into(),
        arrival: time,
        departure: time,
        sequence,
    }
}

pub fn readers(gtfs: ScheduleData, netex: ScheduleData) -> Readers {
    Readers {
        street: Arc::new(FakeStreets),
        gtfs: Arc::new(FakeSchedule(gtfs)),
        netex: Arc::new(FakeSchedule(netex)),
        tile_fetcher: Arc::new(NoTiles),
    }
}

pub fn sources(inputs: &[(FileType, &str)]) -> DataSourceSet {
    inputs
        .iter()
        .map(|(file_type, path)| DataSource::new(*file_type, *path))
        .collect::<DataSourceSet>()
        .with_directories("graph/cache", "graph/report")
}

/// Shared record of stage calls, in call order
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A stage that only records what was asked of it
pub struct Recording {
    pub kind: StageKind,
    pub log: CallLog,
    pub fail_precondition: bool,
    pub fail_execute: bool,
}

impl Recording {
    pub fn new(kind: StageKind, log: &CallLog) -> Self {
        Self {
            kind,
            log: log.clone(),
            fail_precondition: false,
            fail_execute: false,
        }
    }
}

impl GraphBuilderStage for Recording {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        self.log.lock().unwrap().push(format!("check {}", self.kind));
        if self.fail_precondition {
            return Err(format!("{} is not ready", self.kind));
        }
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut BuildContext) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!("execute {}", self.kind));
        if self.fail_execute {
            anyhow::bail!("{} exploded", self.kind);
        }
        Ok(())
    }
}
