//! Build configuration and feature flags
//!
//! `build-config.json` in the graph directory is read with serde; every field
//! has a default so an empty object (or no file at all) is a valid config.

use chrono::NaiveDate;
use junction_common::suggest_correction;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::datasource::BUILD_CONFIG_FILENAME;
use crate::error::ConfigError;
use crate::model::ServicePeriod;

/// Config key bounding the start of the transit service period
pub const TRANSIT_SERVICE_START_KEY: &str = "transit_service_start";
/// Config key bounding the end of the transit service period
pub const TRANSIT_SERVICE_END_KEY: &str = "transit_service_end";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// IANA time zone for the transit model; defaults to the first agency's zone
    pub time_zone: Option<String>,
    pub match_bus_routes_to_streets: bool,
    /// Write an HTML report of data import issues
    pub data_import_report: bool,
    /// Fetch elevation tiles from a bucket instead of local raster files
    pub elevation_bucket: Option<ElevationBucketConfig>,
    pub transit_service_start: Option<NaiveDate>,
    pub transit_service_end: Option<NaiveDate>,
    pub max_stop_link_distance_meters: f64,
    pub max_transfer_distance_meters: f64,
    pub boarding_location_search_radius_meters: f64,
    pub island_pruning: IslandPruningConfig,
    pub data_overlay: Option<DataOverlayConfig>,
    pub features: FeatureFlags,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            time_zone: None,
            match_bus_routes_to_streets: false,
            data_import_report: false,
            elevation_bucket: None,
            transit_service_start: None,
            transit_service_end: None,
            max_stop_link_distance_meters: 100.0,
            max_transfer_distance_meters: 2000.0,
            boarding_location_search_radius_meters: 50.0,
            island_pruning: IslandPruningConfig::default(),
            data_overlay: None,
            features: FeatureFlags::default(),
        }
    }
}

impl BuildConfig {
    /// Read a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `build-config.json` from a graph directory, or fall back to defaults
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(BUILD_CONFIG_FILENAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn service_period(&self) -> ServicePeriod {
        ServicePeriod::new(self.transit_service_start, self.transit_service_end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevationBucketConfig {
    /// Base URL serving `N50E004.hgt`-style tiles
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IslandPruningConfig {
    /// Islands containing a linked stop are pruned below this many street vertices
    pub threshold_with_stops: usize,
    pub threshold_without_stops: usize,
}

impl Default for IslandPruningConfig {
    fn default() -> Self {
        Self {
            threshold_with_stops: 5,
            threshold_without_stops: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOverlayConfig {
    /// JSON file of `{lat, lon, values}` samples
    pub file: PathBuf,
    /// Parameter names copied from samples onto street edges
    pub parameters: Vec<String>,
    #[serde(default = "default_overlay_distance")]
    pub max_sample_distance_meters: f64,
}

fn default_overlay_distance() -> f64 {
    500.0
}

/// Process-wide toggles, resolved once before the build starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub flex_routing: bool,
    pub transfer_analyzer: bool,
    pub data_overlay: bool,
}

impl FeatureFlags {
    pub const NAMES: [&'static str; 3] = ["FlexRouting", "TransferAnalyzer", "DataOverlay"];

    /// Switch a feature on by name (case-insensitive, `-`/`_` ignored)
    pub fn enable(&mut self, name: &str) -> Result<(), ConfigError> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "flexrouting" => self.flex_routing = true,
            "transferanalyzer" => self.transfer_analyzer = true,
            "dataoverlay" => self.data_overlay = true,
            _ => {
                return Err(ConfigError::UnknownFeature {
                    name: name.to_string(),
                    suggestion: suggest_correction(name, &Self::NAMES),
                })
            }
        }
        Ok(())
    }

    pub fn enabled_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.flex_routing {
            names.push("FlexRouting");
        }
        if self.transfer_analyzer {
            names.push("TransferAnalyzer");
        }
        if self.data_overlay {
            names.push("DataOverlay");
        }
        names
    }
}
