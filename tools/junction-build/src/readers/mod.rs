//! Input format adapters
//!
//! Stages only see the [`StreetReader`] and [`ScheduleReader`] traits; the
//! factory injects the file-backed implementations below, tests inject
//! in-memory fixtures.

pub mod gtfs;
pub mod netex;
pub mod osm;

use anyhow::Result;
use std::collections::HashMap;

use crate::datasource::DataSource;
use crate::model::{Agency, FlexArea, Route, ServiceCalendar, Stop, Trip};

pub use gtfs::GtfsReader;
pub use netex::NetexReader;
pub use osm::OsmReader;

#[derive(Debug, Clone, PartialEq)]
pub struct StreetWay {
    pub id: i64,
    pub nodes: Vec<i64>,
    pub highway: String,
    pub name: Option<String>,
    pub oneway: bool,
}

/// OSM platform or stop position usable as a boarding location
#[derive(Debug, Clone, PartialEq)]
pub struct BoardingLocation {
    pub node_id: i64,
    pub lat: f64,
    pub lon: f64,
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BikeRentalStation {
    pub node_id: i64,
    pub lat: f64,
    pub lon: f64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StreetData {
    /// Node id to `(lat, lon)`
    pub nodes: HashMap<i64, (f64, f64)>,
    pub ways: Vec<StreetWay>,
    pub boarding_locations: Vec<BoardingLocation>,
    pub bike_rentals: Vec<BikeRentalStation>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleData {
    pub agencies: Vec<Agency>,
    pub stops: Vec<Stop>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub services: Vec<ServiceCalendar>,
    pub flex_areas: Vec<FlexArea>,
}

pub trait StreetReader: Send + Sync {
    /// Reason the source cannot be read, checked before any stage runs
    fn check(&self, source: &DataSource) -> Result<(), String> {
        if source.path.exists() {
            Ok(())
        } else {
            Err(format!("{} does not exist", source.path.display()))
        }
    }

    fn read(&self, source: &DataSource) -> Result<StreetData>;
}

pub trait ScheduleReader: Send + Sync {
    fn check(&self, source: &DataSource) -> Result<(), String> {
        if source.path.exists() {
            Ok(())
        } else {
            Err(format!("{} does not exist", source.path.display()))
        }
    }

    fn read(&self, source: &DataSource) -> Result<ScheduleData>;

    /// Agencies only, used to register time zones before stage selection
    fn read_agencies(&self, source: &DataSource) -> Result<Vec<Agency>> {
        Ok(self.read(source)?.agencies)
    }
}

/// Tags marking an OSM node as a boarding location
pub(crate) fn is_boarding_location<'a>(mut tag: impl FnMut(&str) -> Option<&'a str>) -> bool {
    matches!(tag("public_transport"), Some("platform" | "stop_position"))
        || matches!(tag("highway"), Some("bus_stop"))
        || matches!(tag("railway"), Some("platform" | "tram_stop" | "halt"))
}

/// Split an OSM `ref`-style value on `;`
pub(crate) fn split_refs(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_refs() {
        assert_eq!(split_refs("12; 13;;A"), vec!["12", "13", "A"]);
        assert!(split_refs(" ").is_empty());
    }

    #[test]
    fn test_boarding_location_tags() {
        let tags = [("highway", "bus_stop")];
        assert!(is_boarding_location(|k| tags.iter().find(|t| t.0 == k).map(|t| t.1)));
        let tags = [("highway", "residential")];
        assert!(!is_boarding_location(|k| tags.iter().find(|t| t.0 == k).map(|t| t.1)));
    }
}
