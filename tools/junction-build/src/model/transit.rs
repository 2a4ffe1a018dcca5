//! Transit schedule model shared by the import and linking stages

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::graph::VertexId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub id: String,
    pub name: String,
    /// IANA zone name as published by the feed
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Graph vertex created for this stop by the import stage
    pub vertex: Option<VertexId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteMode {
    Bus,
    Tram,
    Subway,
    Rail,
    Ferry,
    Other,
}

impl RouteMode {
    /// Map a GTFS `route_type`, including the extended 100..1700 range
    pub fn from_gtfs(route_type: u16) -> Self {
        match route_type {
            0 | 900..=999 => RouteMode::Tram,
            1 | 400..=499 => RouteMode::Subway,
            2 | 100..=199 => RouteMode::Rail,
            3 | 11 | 700..=899 => RouteMode::Bus,
            4 | 1000..=1099 | 1200 => RouteMode::Ferry,
            _ => RouteMode::Other,
        }
    }

    /// Map a NeTEx `TransportMode`
    pub fn from_netex(mode: &str) -> Self {
        match mode.trim() {
            "bus" | "coach" | "trolleyBus" => RouteMode::Bus,
            "tram" => RouteMode::Tram,
            "metro" => RouteMode::Subway,
            "rail" => RouteMode::Rail,
            "water" | "ferry" => RouteMode::Ferry,
            _ => RouteMode::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub agency_id: String,
    pub short_name: Option<String>,
    pub mode: RouteMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    pub stop_id: String,
    /// Seconds after midnight of the service day, may exceed 24h
    pub arrival: i32,
    pub departure: i32,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub service_id: String,
    pub stop_times: Vec<StopTime>,
    /// Offset already applied to `stop_times` by time-zone reconciliation
    #[serde(default)]
    pub time_shift_seconds: i32,
}

impl Trip {
    pub fn shift(&mut self, seconds: i32) {
        for st in &mut self.stop_times {
            st.arrival += seconds;
            st.departure += seconds;
        }
        self.time_shift_seconds += seconds;
    }
}

/// Inclusive date range used to select relevant service; `None` is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ServicePeriod {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCalendar {
    pub service_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Monday first
    pub weekdays: [bool; 7],
    #[serde(default)]
    pub added: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub removed: BTreeSet<NaiveDate>,
}

impl ServiceCalendar {
    /// Calendar made only of explicit dates
    pub fn from_dates(service_id: impl Into<String>, dates: impl IntoIterator<Item = NaiveDate>) -> Option<Self> {
        let added: BTreeSet<NaiveDate> = dates.into_iter().collect();
        let start = *added.first()?;
        let end = *added.last()?;
        Some(Self {
            service_id: service_id.into(),
            start,
            end,
            weekdays: [false; 7],
            added,
            removed: BTreeSet::new(),
        })
    }

    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if self.removed.contains(&date) {
            return false;
        }
        if self.added.contains(&date) {
            return true;
        }
        date >= self.start && date <= self.end && self.weekdays[date.weekday().num_days_from_monday() as usize]
    }

    /// First operating day inside the period
    pub fn first_date_within(&self, period: &ServicePeriod) -> Option<NaiveDate> {
        let from = period.start.map_or(self.start, |s| s.max(self.start));
        let until = period.end.map_or(self.end, |e| e.min(self.end));
        // Date-only calendars have nothing to walk
        let regular = if self.weekdays.contains(&true) {
            from.iter_days()
                .take_while(|d| *d <= until)
                .find(|d| self.runs_on(*d))
        } else {
            None
        };
        let extra = self
            .added
            .iter()
            .copied()
            .find(|d| period.contains(*d) && !self.removed.contains(d));
        match (regular, extra) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn operates_within(&self, period: &ServicePeriod) -> bool {
        self.first_date_within(period).is_some()
    }
}

/// Area served by demand-responsive transit, polygon in `(lat, lon)` order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexArea {
    pub id: String,
    pub name: Option<String>,
    pub polygon: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from_stop: String,
    pub to_stop: String,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitModel {
    pub time_zone: Option<String>,
    pub agencies: BTreeMap<String, Agency>,
    pub stops: BTreeMap<String, Stop>,
    pub routes: BTreeMap<String, Route>,
    pub trips: Vec<Trip>,
    pub services: BTreeMap<String, ServiceCalendar>,
    pub flex_areas: Vec<FlexArea>,
    /// Street vertices followed by each matched bus route
    pub route_geometries: BTreeMap<String, Vec<VertexId>>,
    pub flex_area_vertices: BTreeMap<String, Vec<VertexId>>,
    pub transfers: Vec<Transfer>,
    pub service_period: ServicePeriod,
}

impl TransitModel {
    pub fn new(service_period: ServicePeriod) -> Self {
        Self {
            service_period,
            ..Self::default()
        }
    }

    /// Set the model time zone from configuration before any feed is read
    pub fn init_time_zone(&mut self, time_zone: Option<&str>) {
        if let Some(tz) = time_zone {
            self.time_zone = Some(tz.to_string());
        }
    }

    /// Register an agency; the first agency seen fixes an unset model zone
    pub fn register_agency(&mut self, agency: Agency) {
        if self.time_zone.is_none() {
            self.time_zone = Some(agency.time_zone.clone());
        }
        self.agencies.entry(agency.id.clone()).or_insert(agency);
    }

    pub fn agency_time_zones(&self) -> BTreeSet<&str> {
        self.agencies.values().map(|a| a.time_zone.as_str()).collect()
    }

    pub fn agency_of_trip(&self, trip: &Trip) -> Option<&Agency> {
        let route = self.routes.get(&trip.route_id)?;
        self.agencies.get(&route.agency_id)
    }

    /// True when at least one trip runs inside the service period
    pub fn has_transit(&self) -> bool {
        self.trips.iter().any(|trip| {
            self.services
                .get(&trip.service_id)
                .is_some_and(|s| s.operates_within(&self.service_period))
        })
    }
}
