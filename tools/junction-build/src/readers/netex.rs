//! NeTEx reader
//!
//! Accepts a single XML file or a directory of XML files (shared data and
//! line files of one export). Elements are matched on their local name so
//! the profile's namespace prefixes do not matter. References may cross
//! files, so records are collected first and resolved once every file has
//! been read.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use roxmltree::{Document, Node};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::gtfs::parse_time;
use super::{ScheduleData, ScheduleReader};
use crate::datasource::DataSource;
use crate::model::{Agency, FlexArea, Route, RouteMode, ServiceCalendar, Stop, StopTime, Trip};

/// Zone used when an export declares no frame default
pub const DEFAULT_TIME_ZONE: &str = "Etc/UTC";

#[derive(Debug, Default, Clone, Copy)]
pub struct NetexReader;

impl ScheduleReader for NetexReader {
    fn check(&self, source: &DataSource) -> Result<(), String> {
        let files = xml_files(&source.path).map_err(|e| format!("{e:#}"))?;
        if files.is_empty() {
            return Err(format!("{} contains no XML files", source.path.display()));
        }
        Ok(())
    }

    fn read(&self, source: &DataSource) -> Result<ScheduleData> {
        let mut records = Records::default();
        for file in xml_files(&source.path)? {
            let text = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            records
                .collect(&text)
                .with_context(|| format!("Failed to parse NeTEx file {}", file.display()))?;
        }
        let data = records.resolve();
        info!(
            source = %source.name(),
            agencies = data.agencies.len(),
            stops = data.stops.len(),
            routes = data.routes.len(),
            trips = data.trips.len(),
            services = data.services.len(),
            flex_areas = data.flex_areas.len(),
            "Parsed NeTEx export"
        );
        Ok(data)
    }

    fn read_agencies(&self, source: &DataSource) -> Result<Vec<Agency>> {
        let mut records = Records::default();
        for file in xml_files(&source.path)? {
            let text = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let doc = Document::parse(&text).with_context(|| format!("Failed to parse {}", file.display()))?;
            records.collect_agencies(&doc);
        }
        Ok(records.agencies)
    }
}

fn xml_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("Failed to list {}", path.display()))? {
        let entry = entry?;
        let file = entry.path();
        if file.extension().is_some_and(|e| e.eq_ignore_ascii_case("xml")) {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug)]
struct Journey {
    id: String,
    line_ref: Option<String>,
    pattern_ref: Option<String>,
    day_types: Vec<String>,
    /// Stop point in pattern, arrival and departure in seconds
    passing_times: Vec<(String, Option<i32>, Option<i32>)>,
}

#[derive(Debug)]
enum DayTypeAssignment {
    Period(String),
    Date { date: NaiveDate, available: bool },
}

#[derive(Debug)]
struct LineRecord {
    short_name: Option<String>,
    mode: RouteMode,
    operator_ref: Option<String>,
}

#[derive(Debug, Default)]
struct Records {
    agencies: Vec<Agency>,
    stops: Vec<Stop>,
    lines: BTreeMap<String, LineRecord>,
    route_lines: HashMap<String, String>,
    pattern_routes: HashMap<String, String>,
    point_in_pattern: HashMap<String, String>,
    assignments: HashMap<String, String>,
    journeys: Vec<Journey>,
    day_types: HashMap<String, Option<[bool; 7]>>,
    periods: HashMap<String, (NaiveDate, NaiveDate)>,
    day_type_assignments: Vec<(String, DayTypeAssignment)>,
    flex_areas: Vec<FlexArea>,
}

impl Records {
    fn collect(&mut self, text: &str) -> Result<()> {
        let doc = Document::parse(text)?;
        self.collect_agencies(&doc);

        for node in doc.descendants().filter(Node::is_element) {
            match node.tag_name().name() {
                "StopPlace" => self.collect_stop_place(node),
                "Line" | "FlexibleLine" => {
                    if let Some(id) = node.attribute("id") {
                        self.lines.insert(
                            id.to_string(),
                            LineRecord {
                                short_name: child_text(node, "PublicCode").map(str::to_string),
                                mode: child_text(node, "TransportMode")
                                    .map(RouteMode::from_netex)
                                    .unwrap_or(RouteMode::Other),
                                operator_ref: ref_of(node, "OperatorRef")
                                    .or_else(|| ref_of(node, "AuthorityRef"))
                                    .map(str::to_string),
                            },
                        );
                    }
                }
                "Route" => {
                    if let (Some(id), Some(line)) = (node.attribute("id"), ref_of(node, "LineRef")) {
                        self.route_lines.insert(id.to_string(), line.to_string());
                    }
                }
                "JourneyPattern" | "ServicePattern" => {
                    if let (Some(id), Some(route)) = (node.attribute("id"), ref_of(node, "RouteRef")) {
                        self.pattern_routes.insert(id.to_string(), route.to_string());
                    }
                }
                "StopPointInJourneyPattern" => {
                    if let (Some(id), Some(point)) = (node.attribute("id"), ref_of(node, "ScheduledStopPointRef")) {
                        self.point_in_pattern.insert(id.to_string(), point.to_string());
                    }
                }
                "PassengerStopAssignment" => {
                    if let (Some(point), Some(quay)) = (ref_of(node, "ScheduledStopPointRef"), ref_of(node, "QuayRef")) {
                        self.assignments.insert(point.to_string(), quay.to_string());
                    }
                }
                "ServiceJourney" => self.collect_journey(node),
                "DayType" => {
                    if let Some(id) = node.attribute("id") {
                        let days = descendant(node, "DaysOfWeek").and_then(|n| n.text()).map(parse_days_of_week);
                        self.day_types.insert(id.to_string(), days);
                    }
                }
                "OperatingPeriod" => {
                    let from = child_text(node, "FromDate").and_then(parse_date_time);
                    let to = child_text(node, "ToDate").and_then(parse_date_time);
                    if let (Some(id), Some(from), Some(to)) = (node.attribute("id"), from, to) {
                        self.periods.insert(id.to_string(), (from, to));
                    }
                }
                "DayTypeAssignment" => self.collect_day_type_assignment(node),
                "FlexibleArea" => self.collect_flexible_area(node),
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_agencies(&mut self, doc: &Document) {
        let time_zone = doc
            .descendants()
            .find(|n| n.has_tag_name_local("DefaultLocale"))
            .and_then(|n| child_text(n, "TimeZone"))
            .unwrap_or(DEFAULT_TIME_ZONE);

        for node in doc
            .descendants()
            .filter(|n| n.has_tag_name_local("Authority") || n.has_tag_name_local("Operator"))
        {
            let Some(id) = node.attribute("id") else {
                continue;
            };
            if self.agencies.iter().any(|a| a.id == id) {
                continue;
            }
            self.agencies.push(Agency {
                id: id.to_string(),
                name: child_text(node, "Name").unwrap_or(id).to_string(),
                time_zone: time_zone.to_string(),
            });
        }
    }

    fn collect_stop_place(&mut self, place: Node) {
        let place_name = child_text(place, "Name").unwrap_or_default();
        let quays: Vec<Node> = place.descendants().filter(|n| n.has_tag_name_local("Quay")).collect();

        let stop_nodes = if quays.is_empty() { vec![place] } else { quays };
        for node in stop_nodes {
            let Some(id) = node.attribute("id") else {
                continue;
            };
            let Some((lat, lon)) = centroid(node).or_else(|| centroid(place)) else {
                debug!(stop = id, "NeTEx stop without centroid");
                continue;
            };
            self.stops.push(Stop {
                id: id.to_string(),
                code: child_text(node, "PublicCode").map(str::to_string),
                name: child_text(node, "Name").unwrap_or(place_name).to_string(),
                lat,
                lon,
                vertex: None,
            });
        }
    }

    fn collect_journey(&mut self, node: Node) {
        let Some(id) = node.attribute("id") else {
            return;
        };
        let day_types = node
            .descendants()
            .filter(|n| n.has_tag_name_local("DayTypeRef"))
            .filter_map(|n| n.attribute("ref"))
            .map(str::to_string)
            .collect();
        let passing_times = node
            .descendants()
            .filter(|n| n.has_tag_name_local("TimetabledPassingTime"))
            .filter_map(|pt| {
                let point = ref_of(pt, "StopPointInJourneyPatternRef")?;
                let arrival = passing_time(pt, "ArrivalTime", "ArrivalDayOffset");
                let departure = passing_time(pt, "DepartureTime", "DepartureDayOffset");
                Some((point.to_string(), arrival, departure))
            })
            .collect();
        self.journeys.push(Journey {
            id: id.to_string(),
            line_ref: ref_of(node, "LineRef").map(str::to_string),
            pattern_ref: ref_of(node, "JourneyPatternRef")
                .or_else(|| ref_of(node, "ServicePatternRef"))
                .map(str::to_string),
            day_types,
            passing_times,
        });
    }

    fn collect_day_type_assignment(&mut self, node: Node) {
        let Some(day_type) = ref_of(node, "DayTypeRef") else {
            return;
        };
        let assignment = if let Some(period) = ref_of(node, "OperatingPeriodRef") {
            DayTypeAssignment::Period(period.to_string())
        } else if let Some(date) = child_text(node, "Date").and_then(parse_date_time) {
            let available = child_text(node, "isAvailable").map_or(true, |v| v.trim() != "false");
            DayTypeAssignment::Date { date, available }
        } else {
            return;
        };
        self.day_type_assignments.push((day_type.to_string(), assignment));
    }

    fn collect_flexible_area(&mut self, node: Node) {
        let Some(id) = node.attribute("id") else {
            return;
        };
        let Some(pos_list) = descendant(node, "posList").and_then(|n| n.text()) else {
            return;
        };
        let values: Vec<f64> = pos_list.split_whitespace().filter_map(|v| v.parse().ok()).collect();
        let polygon: Vec<(f64, f64)> = values.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        if polygon.len() < 3 {
            debug!(area = id, "Flexible area with fewer than three positions");
            return;
        }
        self.flex_areas.push(FlexArea {
            id: id.to_string(),
            name: child_text(node, "Name").map(str::to_string),
            polygon,
        });
    }

    /// Dates on which a day type operates
    fn day_type_dates(&self) -> HashMap<&str, BTreeSet<NaiveDate>> {
        let mut dates: HashMap<&str, BTreeSet<NaiveDate>> = HashMap::new();
        let mut removed: Vec<(&str, NaiveDate)> = Vec::new();

        for (day_type, assignment) in &self.day_type_assignments {
            let weekdays = self.day_types.get(day_type).copied().flatten().unwrap_or([true; 7]);
            match assignment {
                DayTypeAssignment::Period(period) => {
                    let Some((from, to)) = self.periods.get(period) else {
                        continue;
                    };
                    let entry = dates.entry(day_type.as_str()).or_default();
                    for date in from.iter_days().take_while(|d| d <= to) {
                        if weekdays[date.weekday().num_days_from_monday() as usize] {
                            entry.insert(date);
                        }
                    }
                }
                DayTypeAssignment::Date { date, available: true } => {
                    dates.entry(day_type.as_str()).or_default().insert(*date);
                }
                DayTypeAssignment::Date { date, available: false } => removed.push((day_type.as_str(), *date)),
            }
        }
        for (day_type, date) in removed {
            if let Some(set) = dates.get_mut(day_type) {
                set.remove(&date);
            }
        }
        dates
    }

    fn resolve(self) -> ScheduleData {
        let default_agency = self.agencies.first().map(|a| a.id.clone()).unwrap_or_default();
        let routes: Vec<Route> = self
            .lines
            .iter()
            .map(|(id, line)| Route {
                id: id.clone(),
                agency_id: line
                    .operator_ref
                    .clone()
                    .filter(|r| self.agencies.iter().any(|a| &a.id == r))
                    .unwrap_or_else(|| default_agency.clone()),
                short_name: line.short_name.clone(),
                mode: line.mode,
            })
            .collect();

        let day_type_dates = self.day_type_dates();
        let mut services: BTreeMap<String, ServiceCalendar> = BTreeMap::new();
        let mut trips = Vec::new();

        for journey in &self.journeys {
            let line = journey.line_ref.clone().or_else(|| {
                let route = self.pattern_routes.get(journey.pattern_ref.as_ref()?)?;
                self.route_lines.get(route).cloned()
            });
            let Some(route_id) = line else {
                debug!(journey = %journey.id, "ServiceJourney without line");
                continue;
            };

            let mut day_types = journey.day_types.clone();
            day_types.sort();
            day_types.dedup();
            let service_id = day_types.join("+");
            if !services.contains_key(&service_id) {
                let dates = day_types
                    .iter()
                    .filter_map(|d| day_type_dates.get(d.as_str()))
                    .flatten()
                    .copied();
                if let Some(calendar) = ServiceCalendar::from_dates(service_id.clone(), dates) {
                    services.insert(service_id.clone(), calendar);
                }
            }

            let stop_times = journey
                .passing_times
                .iter()
                .enumerate()
                .filter_map(|(i, (point, arrival, departure))| {
                    let scheduled = self.point_in_pattern.get(point).unwrap_or(point);
                    let stop_id = self.assignments.get(scheduled).unwrap_or(scheduled);
                    let departure = departure.or(*arrival)?;
                    Some(StopTime {
                        stop_id: stop_id.clone(),
                        arrival: arrival.unwrap_or(departure),
                        departure,
                        sequence: i as u32 + 1,
                    })
                })
                .collect();

            trips.push(Trip {
                id: journey.id.clone(),
                route_id,
                service_id,
                stop_times,
                time_shift_seconds: 0,
            });
        }

        ScheduleData {
            agencies: self.agencies,
            stops: self.stops,
            routes,
            trips,
            services: services.into_values().collect(),
            flex_areas: self.flex_areas,
        }
    }
}

trait LocalName {
    fn has_tag_name_local(&self, name: &str) -> bool;
}

impl LocalName for Node<'_, '_> {
    fn has_tag_name_local(&self, name: &str) -> bool {
        self.is_element() && self.tag_name().name() == name
    }
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|c| c.has_tag_name_local(name))
}

fn descendant<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.descendants().find(|c| c.has_tag_name_local(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)?.text().map(str::trim).filter(|t| !t.is_empty())
}

fn ref_of<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)?.attribute("ref")
}

fn centroid(node: Node) -> Option<(f64, f64)> {
    let location = descendant(child(node, "Centroid")?, "Location")?;
    let lat = child_text(location, "Latitude")?.parse().ok()?;
    let lon = child_text(location, "Longitude")?.parse().ok()?;
    Some((lat, lon))
}

fn passing_time(node: Node, time: &str, offset: &str) -> Option<i32> {
    let seconds = parse_time(child_text(node, time)?)?;
    let days: i32 = child_text(node, offset).and_then(|d| d.parse().ok()).unwrap_or(0);
    Some(seconds + days * 86_400)
}

/// `2024-01-01` or `2024-01-01T00:00:00`
fn parse_date_time(value: &str) -> Option<NaiveDate> {
    let date = value.split('T').next()?;
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

fn parse_days_of_week(value: &str) -> [bool; 7] {
    let mut days = [false; 7];
    for token in value.split_whitespace() {
        match token {
            "Monday" => days[0] = true,
            "Tuesday" => days[1] = true,
            "Wednesday" => days[2] = true,
            "Thursday" => days[3] = true,
            "Friday" => days[4] = true,
            "Saturday" => days[5] = true,
            "Sunday" => days[6] = true,
            "Weekdays" => days[..5].fill(true),
            "Weekend" => days[5..].fill(true),
            "Everyday" => days.fill(true),
            _ => {}
        }
    }
    days
}
