//! Stage construction from configuration and readers

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::boarding_locations::BoardingLocationLinker;
use super::bus_route_matcher::BusRouteStreetMatcher;
use super::coherency::CoherencyChecker;
use super::data_overlay::DataOverlay;
use super::elevation::ElevationApplier;
use super::flex_locations::FlexAreaLinker;
use super::island_pruning::IslandPruner;
use super::report::IssueReporter;
use super::schedule_import::ScheduleImport;
use super::street_import::StreetImport;
use super::street_linker::StreetLinker;
use super::timezone::TimeZoneAdjuster;
use super::transfers::{DirectTransferGenerator, TransferAnalyzer};
use super::GraphBuilderStage;
use crate::config::{BuildConfig, FeatureFlags};
use crate::datasource::{DataSource, DataSourceSet, FileType};
use crate::elevation::{BucketSource, ElevationSource, HttpTileFetcher, RasterFileSource, TileFetcher};
use crate::model::TransitModel;
use crate::readers::{GtfsReader, NetexReader, OsmReader, ScheduleReader, StreetReader};

/// Input readers shared by the stages a factory creates
#[derive(Clone)]
pub struct Readers {
    pub street: Arc<dyn StreetReader>,
    pub gtfs: Arc<dyn ScheduleReader>,
    pub netex: Arc<dyn ScheduleReader>,
    pub tile_fetcher: Arc<dyn TileFetcher>,
}

impl Readers {
    /// File readers for OSM, GTFS and NeTEx and an HTTP tile fetcher
    pub fn standard() -> anyhow::Result<Self> {
        Ok(Self {
            street: Arc::new(OsmReader),
            gtfs: Arc::new(GtfsReader),
            netex: Arc::new(NetexReader),
            tile_fetcher: Arc::new(HttpTileFetcher::new()?),
        })
    }
}

pub struct StageFactory {
    config: BuildConfig,
    readers: Readers,
}

impl StageFactory {
    pub fn new(config: BuildConfig, readers: Readers) -> Self {
        Self { config, readers }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn flags(&self) -> FeatureFlags {
        self.config.features
    }

    pub fn create_street_import(&self, sources: &[DataSource]) -> Box<dyn GraphBuilderStage> {
        Box::new(StreetImport::new(sources.to_vec(), self.readers.street.clone()))
    }

    pub fn create_gtfs_import(&self, sources: &[DataSource]) -> Box<dyn GraphBuilderStage> {
        Box::new(ScheduleImport::gtfs(sources.to_vec(), self.readers.gtfs.clone()))
    }

    pub fn create_netex_import(&self, sources: &[DataSource]) -> Box<dyn GraphBuilderStage> {
        Box::new(ScheduleImport::netex(sources.to_vec(), self.readers.netex.clone()))
    }

    pub fn create_time_zone_adjuster(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(TimeZoneAdjuster)
    }

    pub fn create_bus_route_matcher(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(BusRouteStreetMatcher::new(self.config.max_stop_link_distance_meters))
    }

    pub fn create_boarding_location_linker(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(BoardingLocationLinker::new(
            self.config.boarding_location_search_radius_meters,
        ))
    }

    pub fn create_street_linker(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(StreetLinker::new(self.config.max_stop_link_distance_meters))
    }

    pub fn create_island_pruner(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(IslandPruner::new(self.config.island_pruning))
    }

    /// One source for the configured bucket, else one per DEM file in discovery order
    pub fn create_elevation_sources(&self, sources: &DataSourceSet) -> Vec<Box<dyn ElevationSource>> {
        if let Some(bucket) = &self.config.elevation_bucket {
            debug!(url = %bucket.base_url, "Using elevation bucket");
            return vec![Box::new(BucketSource::new(
                bucket.base_url.clone(),
                sources.cache_dir(),
                self.readers.tile_fetcher.clone(),
            ))];
        }
        sources
            .get(FileType::Dem)
            .iter()
            .map(|dem| Box::new(RasterFileSource::new(&dem.path)) as Box<dyn ElevationSource>)
            .collect()
    }

    /// Only the final elevation stage reports street edges left without elevation
    pub fn create_elevation(&self, source: Box<dyn ElevationSource>, last: bool) -> Box<dyn GraphBuilderStage> {
        let stage = ElevationApplier::new(source);
        Box::new(if last { stage } else { stage.without_missing_report() })
    }

    pub fn create_flex_area_linker(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(FlexAreaLinker)
    }

    pub fn create_direct_transfer_generator(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(DirectTransferGenerator::new(self.config.max_transfer_distance_meters))
    }

    pub fn create_transfer_analyzer(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(TransferAnalyzer)
    }

    pub fn create_coherency_checker(&self) -> Box<dyn GraphBuilderStage> {
        Box::new(CoherencyChecker)
    }

    pub fn create_issue_report(&self, report_dir: &Path) -> Box<dyn GraphBuilderStage> {
        Box::new(IssueReporter::new(report_dir))
    }

    /// `None` when no overlay is configured
    pub fn create_data_overlay(&self) -> Option<Box<dyn GraphBuilderStage>> {
        let config = self.config.data_overlay.clone()?;
        Some(Box::new(DataOverlay::new(config)))
    }

    /// Register the agencies of every schedule source so their time zones are
    /// known before stages are selected. Returns the number of agencies read.
    ///
    /// Sources that fail their reader check or cannot be read are skipped; the
    /// schedule import stage reports them during the precondition pass.
    pub fn preload_agencies(&self, sources: &DataSourceSet, transit: &mut TransitModel) -> usize {
        let mut count = 0;
        let readers = [
            (FileType::Gtfs, &self.readers.gtfs),
            (FileType::Netex, &self.readers.netex),
        ];
        for (file_type, reader) in readers {
            for source in sources.get(file_type) {
                if let Err(reason) = reader.check(source) {
                    debug!(source = %source.name(), %reason, "Skipping agency preload");
                    continue;
                }
                let agencies = match reader.read_agencies(source) {
                    Ok(agencies) => agencies,
                    Err(err) => {
                        warn!(source = %source.name(), error = %format!("{err:#}"), "Failed to preload agencies");
                        continue;
                    }
                };
                for agency in agencies {
                    transit.register_agency(agency);
                    count += 1;
                }
            }
        }
        debug!(agencies = count, zones = transit.agency_time_zones().len(), "Preloaded agencies");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataOverlayConfig, ElevationBucketConfig};
    use crate::stages::StageKind;

    struct NoTiles;

    impl TileFetcher for NoTiles {
        fn fetch(&self, _url: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn readers() -> Readers {
        Readers {
            street: Arc::new(OsmReader),
            gtfs: Arc::new(GtfsReader),
            netex: Arc::new(NetexReader),
            tile_fetcher: Arc::new(NoTiles),
        }
    }

    fn dem_sources() -> DataSourceSet {
        [
            DataSource::new(FileType::Dem, "N50E004.hgt"),
            DataSource::new(FileType::Dem, "N50E005.hgt"),
        ]
        .into_iter()
        .collect::<DataSourceSet>()
        .with_directories("cache", "report")
    }

    #[test]
    fn test_one_elevation_source_per_dem() {
        let factory = StageFactory::new(BuildConfig::default(), readers());
        let sources = factory.create_elevation_sources(&dem_sources());
        let described: Vec<String> = sources.iter().map(|s| s.describe()).collect();
        assert_eq!(described, vec!["raster N50E004.hgt", "raster N50E005.hgt"]);
    }

    #[test]
    fn test_bucket_replaces_dem_files() {
        let config = BuildConfig {
            elevation_bucket: Some(ElevationBucketConfig {
                base_url: "https://tiles.example.org".into(),
            }),
            ..BuildConfig::default()
        };
        let factory = StageFactory::new(config, readers());
        let sources = factory.create_elevation_sources(&dem_sources());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].describe(), "bucket https://tiles.example.org");
    }

    #[test]
    fn test_data_overlay_only_when_configured() {
        let factory = StageFactory::new(BuildConfig::default(), readers());
        assert!(factory.create_data_overlay().is_none());

        let config = BuildConfig {
            data_overlay: Some(DataOverlayConfig {
                file: "overlay.json".into(),
                parameters: vec!["noise".into()],
                max_sample_distance_meters: 100.0,
            }),
            ..BuildConfig::default()
        };
        let factory = StageFactory::new(config, readers());
        let stage = factory.create_data_overlay().unwrap();
        assert_eq!(stage.kind(), StageKind::DataOverlay);
    }

    #[test]
    fn test_preload_skips_sources_that_fail_their_check() {
        let dir = tempfile::tempdir().unwrap();
        let sources = [DataSource::new(FileType::Gtfs, dir.path().join("missing-gtfs"))]
            .into_iter()
            .collect::<DataSourceSet>();
        let factory = StageFactory::new(BuildConfig::default(), readers());
        let mut transit = TransitModel::default();

        assert_eq!(factory.preload_agencies(&sources, &mut transit), 0);
        assert!(transit.agency_time_zones().is_empty());
    }
}
