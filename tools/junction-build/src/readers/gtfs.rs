//! GTFS reader for unzipped feed directories

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use super::{ScheduleData, ScheduleReader};
use crate::datasource::DataSource;
use crate::model::{Agency, Route, RouteMode, ServiceCalendar, Stop, StopTime, Trip};

const REQUIRED_FILES: [&str; 5] = ["agency.txt", "stops.txt", "routes.txt", "trips.txt", "stop_times.txt"];

#[derive(Debug, Default, Clone, Copy)]
pub struct GtfsReader;

#[derive(Debug, Deserialize)]
struct AgencyRow {
    agency_id: Option<String>,
    agency_name: String,
    agency_timezone: String,
}

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: String,
    stop_code: Option<String>,
    #[serde(default)]
    stop_name: String,
    stop_lat: Option<f64>,
    stop_lon: Option<f64>,
    location_type: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    agency_id: Option<String>,
    route_short_name: Option<String>,
    route_type: u16,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    route_id: String,
    service_id: String,
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
    arrival_time: Option<String>,
    departure_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct CalendarDateRow {
    service_id: String,
    date: String,
    exception_type: u8,
}

impl ScheduleReader for GtfsReader {
    fn check(&self, source: &DataSource) -> Result<(), String> {
        let dir = &source.path;
        if !dir.is_dir() {
            return Err(format!("{} is not a GTFS directory", dir.display()));
        }
        let missing: Vec<&str> = REQUIRED_FILES
            .iter()
            .copied()
            .filter(|f| !dir.join(f).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(format!("{} is missing {}", dir.display(), missing.join(", ")));
        }
        if !dir.join("calendar.txt").is_file() && !dir.join("calendar_dates.txt").is_file() {
            return Err(format!(
                "{} has neither calendar.txt nor calendar_dates.txt",
                dir.display()
            ));
        }
        Ok(())
    }

    fn read(&self, source: &DataSource) -> Result<ScheduleData> {
        let dir = source.path.as_path();
        let agencies = read_agencies(dir)?;
        let default_agency = agencies.first().map(|a| a.id.clone()).unwrap_or_default();

        let stops = read_rows::<StopRow>(&dir.join("stops.txt"))?
            .into_iter()
            .filter(|row| matches!(row.location_type, None | Some(0)))
            .filter_map(|row| {
                Some(Stop {
                    id: row.stop_id,
                    code: row.stop_code.filter(|c| !c.is_empty()),
                    name: row.stop_name,
                    lat: row.stop_lat?,
                    lon: row.stop_lon?,
                    vertex: None,
                })
            })
            .collect::<Vec<_>>();

        let routes = read_rows::<RouteRow>(&dir.join("routes.txt"))?
            .into_iter()
            .map(|row| Route {
                id: row.route_id,
                agency_id: row
                    .agency_id
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| default_agency.clone()),
                short_name: row.route_short_name.filter(|n| !n.is_empty()),
                mode: RouteMode::from_gtfs(row.route_type),
            })
            .collect::<Vec<_>>();

        let mut stop_times: HashMap<String, Vec<StopTime>> = HashMap::new();
        for row in read_rows::<StopTimeRow>(&dir.join("stop_times.txt"))? {
            let departure = row.departure_time.as_deref().and_then(parse_time);
            let arrival = row.arrival_time.as_deref().and_then(parse_time).or(departure);
            let (Some(arrival), Some(departure)) = (arrival, departure.or(arrival)) else {
                continue;
            };
            stop_times.entry(row.trip_id).or_default().push(StopTime {
                stop_id: row.stop_id,
                arrival,
                departure,
                sequence: row.stop_sequence,
            });
        }

        let trips = read_rows::<TripRow>(&dir.join("trips.txt"))?
            .into_iter()
            .map(|row| {
                let mut times = stop_times.remove(&row.trip_id).unwrap_or_default();
                times.sort_by_key(|st| st.sequence);
                Trip {
                    id: row.trip_id,
                    route_id: row.route_id,
                    service_id: row.service_id,
                    stop_times: times,
                    time_shift_seconds: 0,
                }
            })
            .collect::<Vec<_>>();

        let services = read_services(dir)?;

        info!(
            source = %source.name(),
            agencies = agencies.len(),
            stops = stops.len(),
            routes = routes.len(),
            trips = trips.len(),
            services = services.len(),
            "Parsed GTFS feed"
        );

        Ok(ScheduleData {
            agencies,
            stops,
            routes,
            trips,
            services,
            flex_areas: Vec::new(),
        })
    }

    fn read_agencies(&self, source: &DataSource) -> Result<Vec<Agency>> {
        read_agencies(&source.path)
    }
}

fn read_agencies(dir: &Path) -> Result<Vec<Agency>> {
    let agencies: Vec<Agency> = read_rows::<AgencyRow>(&dir.join("agency.txt"))?
        .into_iter()
        .map(|row| Agency {
            id: row
                .agency_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| row.agency_name.clone()),
            name: row.agency_name,
            time_zone: row.agency_timezone,
        })
        .collect();
    if agencies.is_empty() {
        bail!("{} defines no agency", dir.join("agency.txt").display());
    }
    Ok(agencies)
}

fn read_services(dir: &Path) -> Result<Vec<ServiceCalendar>> {
    let mut services: BTreeMap<String, ServiceCalendar> = BTreeMap::new();

    let calendar = dir.join("calendar.txt");
    if calendar.is_file() {
        for row in read_rows::<CalendarRow>(&calendar)? {
            let start = parse_date(&row.start_date)
                .with_context(|| format!("Invalid start_date for service {}", row.service_id))?;
            let end = parse_date(&row.end_date)
                .with_context(|| format!("Invalid end_date for service {}", row.service_id))?;
            let weekdays = [
                row.monday,
                row.tuesday,
                row.wednesday,
                row.thursday,
                row.friday,
                row.saturday,
                row.sunday,
            ]
            .map(|d| d == 1);
            services.insert(
                row.service_id.clone(),
                ServiceCalendar {
                    service_id: row.service_id,
                    start,
                    end,
                    weekdays,
                    added: Default::default(),
                    removed: Default::default(),
                },
            );
        }
    }

    let calendar_dates = dir.join("calendar_dates.txt");
    if calendar_dates.is_file() {
        for row in read_rows::<CalendarDateRow>(&calendar_dates)? {
            let date = parse_date(&row.date).with_context(|| format!("Invalid date for service {}", row.service_id))?;
            match services.get_mut(&row.service_id) {
                Some(service) if row.exception_type == 2 => {
                    service.removed.insert(date);
                }
                Some(service) => {
                    service.added.insert(date);
                }
                None if row.exception_type == 1 => {
                    if let Some(service) = ServiceCalendar::from_dates(row.service_id.clone(), [date]) {
                        services.insert(row.service_id, service);
                    }
                }
                None => {}
            }
        }
    }

    // Date-only services extend their range to cover every added date
    for service in services.values_mut() {
        if let (Some(first), Some(last)) = (service.added.first(), service.added.last()) {
            service.start = service.start.min(*first);
            service.end = service.end.max(*last);
        }
    }

    Ok(services.into_values().collect())
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (line, row) in reader.deserialize::<T>().enumerate() {
        rows.push(row.with_context(|| format!("{}: invalid record {}", path.display(), line + 1))?);
    }
    Ok(rows)
}

/// `HH:MM:SS` to seconds after midnight; hours may exceed 23
pub fn parse_time(value: &str) -> Option<i32> {
    let mut parts = value.trim().split(':');
    let h: i32 = parts.next()?.parse().ok()?;
    let m: i32 = parts.next()?.parse().ok()?;
    let s: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(0..60).contains(&m) || !(0..60).contains(&s) {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

/// GTFS `YYYYMMDD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").with_context(|| format!("'{value}' is not a YYYYMMDD date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::FileType;
    use std::fs;

    fn write_feed(dir: &Path) {
        fs::write(
            dir.join("agency.txt"),
            "agency_id,agency_name,agency_url,agency_timezone\nRUT,Ruter,https://ruter.no,Europe/Oslo\n",
        )
        .unwrap();
        fs::write(
            dir.join("stops.txt"),
            "stop_id,stop_code,stop_name,stop_lat,stop_lon,location_type\n\
             S1,101,Jernbanetorget,59.9110,10.7500,0\n\
             S2,,Stortinget,59.9130,10.7410,\n\
             ST,,Station,59.9111,10.7501,1\n",
        )
        .unwrap();
        fs::write(
            dir.join("routes.txt"),
            "route_id,agency_id,route_short_name,route_long_name,route_type\nR31,,31,,3\n",
        )
        .unwrap();
        fs::write(dir.join("trips.txt"), "route_id,service_id,trip_id\nR31,WD,T1\n").unwrap();
        fs::write(
            dir.join("stop_times.txt"),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,25:10:00,25:10:00,S2,2\n\
             T1,,25:05:00,S1,1\n",
        )
        .unwrap();
        fs::write(
            dir.join("calendar.txt"),
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             WD,1,1,1,1,1,0,0,20240101,20241231\n",
        )
        .unwrap();
        fs::write(
            dir.join("calendar_dates.txt"),
            "service_id,date,exception_type\nWD,20240101,2\nXMAS,20241225,1\n",
        )
        .unwrap();
    }

    #[test]
    fn test_read_feed() {
        let dir = tempfile::tempdir().unwrap();
        write_feed(dir.path());
        let source = DataSource::new(FileType::Gtfs, dir.path());

        assert_eq!(GtfsReader.check(&source), Ok(()));
        let data = GtfsReader.read(&source).unwrap();

        assert_eq!(data.agencies[0].time_zone, "Europe/Oslo");
        assert_eq!(data.stops.len(), 2);
        assert_eq!(data.stops[0].code.as_deref(), Some("101"));
        assert_eq!(data.stops[1].code, None);
        assert_eq!(data.routes[0].agency_id, "RUT");
        assert_eq!(data.routes[0].mode, RouteMode::Bus);

        let trip = &data.trips[0];
        let stops: Vec<_> = trip.stop_times.iter().map(|st| st.stop_id.as_str()).collect();
        assert_eq!(stops, vec!["S1", "S2"]);
        assert_eq!(trip.stop_times[0].arrival, 25 * 3600 + 5 * 60);

        assert_eq!(data.services.len(), 2);
        let weekdays = data.services.iter().find(|s| s.service_id == "WD").unwrap();
        assert!(weekdays.removed.contains(&NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let xmas = data.services.iter().find(|s| s.service_id == "XMAS").unwrap();
        assert_eq!(xmas.start, NaiveDate::from_ymd_opt(2024, 12, 25).unwrap());
    }

    #[test]
    fn test_check_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("agency.txt"), "agency_name,agency_timezone\nX,UTC\n").unwrap();
        let source = DataSource::new(FileType::Gtfs, dir.path());
        let reason = GtfsReader.check(&source).unwrap_err();
        assert!(reason.contains("stops.txt"), "{reason}");
        assert!(reason.contains("stop_times.txt"), "{reason}");
    }

    #[test]
    fn test_agency_without_id() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("agency.txt"), "agency_name,agency_timezone\nMetro,Europe/Paris\n").unwrap();
        let agencies = read_agencies(dir.path()).unwrap();
        assert_eq!(agencies[0].id, "Metro");
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("08:30:15"), Some(8 * 3600 + 30 * 60 + 15));
        assert_eq!(parse_time(" 7:00:00"), Some(7 * 3600));
        assert_eq!(parse_time("26:00:00"), Some(26 * 3600));
        assert_eq!(parse_time("08:61:00"), None);
        assert_eq!(parse_time(""), None);
    }
}
