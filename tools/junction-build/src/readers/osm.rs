//! OpenStreetMap street network reader (`.osm.pbf` and `.osm` XML)

use anyhow::{Context, Result};
use osmpbf::{Element, ElementReader};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use super::{is_boarding_location, split_refs, BikeRentalStation, BoardingLocation, StreetData, StreetReader, StreetWay};
use crate::datasource::DataSource;

#[derive(Debug, Default, Clone, Copy)]
pub struct OsmReader;

impl StreetReader for OsmReader {
    fn check(&self, source: &DataSource) -> Result<(), String> {
        if !source.path.is_file() {
            return Err(format!("{} is not a file", source.path.display()));
        }
        Ok(())
    }

    fn read(&self, source: &DataSource) -> Result<StreetData> {
        let data = if is_xml(&source.path) {
            parse_xml(&source.path)?
        } else {
            parse_pbf(&source.path)?
        };
        info!(
            source = %source.name(),
            nodes = data.nodes.len(),
            ways = data.ways.len(),
            boarding_locations = data.boarding_locations.len(),
            bike_rentals = data.bike_rentals.len(),
            "Parsed OSM data"
        );
        Ok(data)
    }
}

fn is_xml(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".osm") || name.ends_with(".osm.xml")
}

#[derive(Default)]
struct Collector {
    data: StreetData,
}

impl Collector {
    fn node(&mut self, id: i64, lat: f64, lon: f64, tags: &HashMap<&str, &str>) {
        self.data.nodes.insert(id, (lat, lon));

        if is_boarding_location(|k| tags.get(k).copied()) {
            let mut refs = Vec::new();
            for key in ["ref", "local_ref", "ref:IFOPT"] {
                if let Some(value) = tags.get(key) {
                    refs.extend(split_refs(value));
                }
            }
            if !refs.is_empty() {
                self.data.boarding_locations.push(BoardingLocation { node_id: id, lat, lon, refs });
            }
        }

        if tags.get("amenity") == Some(&"bicycle_rental") {
            self.data.bike_rentals.push(BikeRentalStation {
                node_id: id,
                lat,
                lon,
                name: tags.get("name").map(|n| n.to_string()),
            });
        }
    }

    fn way(&mut self, id: i64, nodes: Vec<i64>, tags: &HashMap<&str, &str>) {
        let Some(highway) = tags.get("highway") else {
            return;
        };
        if nodes.len() < 2 {
            return;
        }
        self.data.ways.push(StreetWay {
            id,
            nodes,
            highway: highway.to_string(),
            name: tags.get("name").map(|n| n.to_string()),
            oneway: matches!(tags.get("oneway"), Some(&"yes" | &"1" | &"true")),
        });
    }
}

pub fn parse_pbf(path: &Path) -> Result<StreetData> {
    let reader = ElementReader::from_path(path)
        .with_context(|| format!("Failed to open PBF file {}", path.display()))?;

    let mut collector = Collector::default();
    reader
        .for_each(|element| match element {
            Element::Node(node) => {
                let tags: HashMap<&str, &str> = node.tags().collect();
                collector.node(node.id(), node.lat(), node.lon(), &tags);
            }
            Element::DenseNode(node) => {
                let tags: HashMap<&str, &str> = node.tags().collect();
                collector.node(node.id(), node.lat(), node.lon(), &tags);
            }
            Element::Way(way) => {
                let tags: HashMap<&str, &str> = way.tags().collect();
                collector.way(way.id(), way.refs().collect(), &tags);
            }
            Element::Relation(_) => {}
        })
        .context("Failed to parse PBF file")?;

    Ok(collector.data)
}

pub fn parse_xml(path: &Path) -> Result<StreetData> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_xml_str(&text).with_context(|| format!("Failed to parse OSM XML {}", path.display()))
}

pub fn parse_xml_str(text: &str) -> Result<StreetData> {
    let doc = roxmltree::Document::parse(text)?;
    let mut collector = Collector::default();

    for element in doc.root_element().children().filter(|n| n.is_element()) {
        let tags: HashMap<&str, &str> = element
            .children()
            .filter(|c| c.has_tag_name("tag"))
            .filter_map(|c| Some((c.attribute("k")?, c.attribute("v")?)))
            .collect();
        let Some(id) = element.attribute("id").and_then(|v| v.parse::<i64>().ok()) else {
            continue;
        };

        match element.tag_name().name() {
            "node" => {
                let lat = element.attribute("lat").and_then(|v| v.parse::<f64>().ok());
                let lon = element.attribute("lon").and_then(|v| v.parse::<f64>().ok());
                if let (Some(lat), Some(lon)) = (lat, lon) {
                    collector.node(id, lat, lon, &tags);
                }
            }
            "way" => {
                let refs = element
                    .children()
                    .filter(|c| c.has_tag_name("nd"))
                    .filter_map(|c| c.attribute("ref")?.parse::<i64>().ok())
                    .collect();
                collector.way(id, refs, &tags);
            }
            _ => {}
        }
    }

    Ok(collector.data)
}
