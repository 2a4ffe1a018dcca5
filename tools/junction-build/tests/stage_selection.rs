mod common;

use common::{date, readers, schedule, sources};
use junction_build::config::{DataOverlayConfig, ElevationBucketConfig};
use junction_build::datasource::{DataSourceSet, FileType};
use junction_build::readers::ScheduleData;
use junction_build::{BuildConfig, BuildOptions, Graph, GraphBuilder, IssueStore, StageFactory, StageKind, TransitModel};

use StageKind::*;

/// Select stages the way the CLI does, including agency preloading
fn select(config: BuildConfig, gtfs: ScheduleData, netex: ScheduleData, inputs: &DataSourceSet, options: BuildOptions) -> Vec<StageKind> {
    select_on(Graph::new(), config, gtfs, netex, inputs, options)
}

fn select_on(
    mut graph: Graph,
    config: BuildConfig,
    gtfs: ScheduleData,
    netex: ScheduleData,
    inputs: &DataSourceSet,
    options: BuildOptions,
) -> Vec<StageKind> {
    let mut transit = TransitModel::new(config.service_period());
    let mut issues = IssueStore::new();
    let factory = StageFactory::new(config, readers(gtfs, netex));
    factory.preload_agencies(inputs, &mut transit);
    let builder = GraphBuilder::create(&factory, inputs, options, &mut graph, &mut transit, &mut issues);
    assert!(builder.verify_ordering());
    builder.stage_kinds()
}

fn position(kinds: &[StageKind], kind: StageKind) -> usize {
    kinds
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_else(|| panic!("{kind} not selected in {kinds:?}"))
}

#[test]
fn test_street_only() {
    let inputs = sources(&[(FileType::Osm, "city.osm.pbf")]);
    let kinds = select(
        BuildConfig::default(),
        ScheduleData::default(),
        ScheduleData::default(),
        &inputs,
        BuildOptions::default(),
    );
    assert_eq!(kinds, vec![StreetImport, StreetLinker, IslandPruning, CoherencyCheck]);
}

#[test]
fn test_selection_is_deterministic() {
    let inputs = sources(&[
        (FileType::Osm, "city.osm.pbf"),
        (FileType::Gtfs, "gtfs"),
        (FileType::Dem, "N59E010.hgt"),
    ]);
    let gtfs = schedule(&[("RUT", "Europe/Oslo")], date(2024, 6, 3));
    let first = select(BuildConfig::default(), gtfs.clone(), ScheduleData::default(), &inputs, BuildOptions::default());
    let second = select(BuildConfig::default(), gtfs, ScheduleData::default(), &inputs, BuildOptions::default());
    assert_eq!(first, second);
}

#[test]
fn test_street_and_schedule_with_bus_matching() {
    let inputs = sources(&[(FileType::Osm, "city.osm.pbf"), (FileType::Gtfs, "gtfs")]);
    let config = BuildConfig {
        match_bus_routes_to_streets: true,
        ..BuildConfig::default()
    };
    let gtfs = schedule(&[("RUT", "Europe/Oslo")], date(2024, 6, 3));
    let kinds = select(config, gtfs, ScheduleData::default(), &inputs, BuildOptions::default());
    assert_eq!(
        kinds,
        vec![
            StreetImport,
            GtfsImport,
            BusRouteStreetMatcher,
            BoardingLocations,
            StreetLinker,
            IslandPruning,
            DirectTransfers,
            CoherencyCheck,
        ]
    );
}

#[test]
fn test_bus_matching_off_by_default() {
    let inputs = sources(&[(FileType::Osm, "city.osm.pbf"), (FileType::Gtfs, "gtfs")]);
    let gtfs = schedule(&[("RUT", "Europe/Oslo")], date(2024, 6, 3));
    let kinds = select(BuildConfig::default(), gtfs, ScheduleData::default(), &inputs, BuildOptions::default());
    assert!(!kinds.contains(&BusRouteStreetMatcher));
    assert!(kinds.contains(&BoardingLocations));
}

#[test]
fn test_two_formats_three_zones_selects_time_zone_adjuster() {
    let inputs = sources(&[(FileType::Gtfs, "gtfs"), (FileType::Netex, "netex")]);
    let day = date(2024, 6, 3);
    let gtfs = schedule(&[("NO", "Europe/Oslo"), ("UK", "Europe/London")], day);
    let netex = schedule(&[("FI", "Europe/Helsinki")], day);
    let kinds = select(BuildConfig::default(), gtfs, netex, &inputs, BuildOptions::default());
    assert_eq!(
        kinds,
        vec![GtfsImport, NetexImport, TimeZoneAdjuster, StreetLinker, DirectTransfers]
    );
}

#[test]
fn test_two_formats_one_zone_skips_time_zone_adjuster() {
    let inputs = sources(&[(FileType::Gtfs, "gtfs"), (FileType::Netex, "netex")]);
    let day = date(2024, 6, 3);
    let gtfs = schedule(&[("A", "Europe/Oslo"), ("B", "Europe/Oslo")], day);
    let netex = schedule(&[("C", "Europe/Oslo")], day);
    let kinds = select(BuildConfig::default(), gtfs, netex, &inputs, BuildOptions::default());
    assert!(!kinds.contains(&TimeZoneAdjuster));
    assert_eq!(kinds, vec![GtfsImport, NetexImport, StreetLinker, DirectTransfers]);
}

#[test]
fn test_ordering_laws_with_everything_enabled() {
    let inputs = sources(&[
        (FileType::Osm, "city.osm.pbf"),
        (FileType::Gtfs, "gtfs"),
        (FileType::Netex, "netex"),
        (FileType::Dem, "N59E010.hgt"),
    ]);
    let mut config = BuildConfig {
        match_bus_routes_to_streets: true,
        data_import_report: true,
        data_overlay: Some(DataOverlayConfig {
            file: "overlay.json".into(),
            parameters: vec!["noise".into()],
            max_sample_distance_meters: 100.0,
        }),
        ..BuildConfig::default()
    };
    config.features.flex_routing = true;
    config.features.transfer_analyzer = true;
    config.features.data_overlay = true;

    let day = date(2024, 6, 3);
    let kinds = select(
        config,
        schedule(&[("NO", "Europe/Oslo")], day),
        schedule(&[("SE", "Europe/Stockholm"), ("UK", "Europe/London")], day),
        &inputs,
        BuildOptions::default(),
    );

    assert!(position(&kinds, TimeZoneAdjuster) > position(&kinds, GtfsImport));
    assert!(position(&kinds, TimeZoneAdjuster) > position(&kinds, NetexImport));
    assert!(position(&kinds, IslandPruning) > position(&kinds, BoardingLocations));
    assert!(position(&kinds, IslandPruning) > position(&kinds, StreetLinker));
    assert!(position(&kinds, Elevation) > position(&kinds, StreetLinker));
    assert!(position(&kinds, TransferAnalyzer) > position(&kinds, DirectTransfers));
    assert_eq!(kinds.first(), Some(&StreetImport));
    assert_eq!(kinds.last(), Some(&DataOverlay));
    assert_eq!(kinds.len(), 15);
}

#[test]
fn test_saving_street_graph_skips_pruning() {
    let inputs = sources(&[(FileType::Osm, "city.osm.pbf")]);
    let options = BuildOptions {
        save_street_graph: true,
        ..BuildOptions::default()
    };
    let kinds = select(BuildConfig::default(), ScheduleData::default(), ScheduleData::default(), &inputs, options);
    assert_eq!(kinds, vec![StreetImport, StreetLinker, CoherencyCheck]);
}

#[test]
fn test_loaded_street_graph_links_transit() {
    let inputs = sources(&[(FileType::Gtfs, "gtfs")]);
    let mut graph = Graph::new();
    graph.set_has_streets(true);
    let options = BuildOptions {
        load_street_graph: true,
        ..BuildOptions::default()
    };
    let kinds = select_on(
        graph,
        BuildConfig::default(),
        schedule(&[("RUT", "Europe/Oslo")], date(2024, 6, 3)),
        ScheduleData::default(),
        &inputs,
        options,
    );
    assert_eq!(
        kinds,
        vec![
            GtfsImport,
            BoardingLocations,
            StreetLinker,
            IslandPruning,
            DirectTransfers,
            CoherencyCheck,
        ]
    );
}

#[test]
fn test_one_elevation_stage_per_dem_file() {
    let inputs = sources(&[(FileType::Dem, "N59E010.hgt"), (FileType::Dem, "N59E011.hgt")]);
    let kinds = select(
        BuildConfig::default(),
        ScheduleData::default(),
        ScheduleData::default(),
        &inputs,
        BuildOptions::default(),
    );
    assert_eq!(kinds, vec![StreetLinker, Elevation, Elevation]);
}

#[test]
fn test_elevation_bucket_replaces_dem_files() {
    let inputs = sources(&[(FileType::Dem, "N59E010.hgt"), (FileType::Dem, "N59E011.hgt")]);
    let config = BuildConfig {
        elevation_bucket: Some(ElevationBucketConfig {
            base_url: "https://tiles.example.org/srtm".into(),
        }),
        ..BuildConfig::default()
    };
    let kinds = select(config, ScheduleData::default(), ScheduleData::default(), &inputs, BuildOptions::default());
    assert_eq!(kinds, vec![StreetLinker, Elevation]);
}

#[test]
fn test_data_overlay_flag_without_config_adds_nothing() {
    let inputs = sources(&[(FileType::Osm, "city.osm.pbf")]);
    let mut config = BuildConfig::default();
    config.features.data_overlay = true;
    let kinds = select(config, ScheduleData::default(), ScheduleData::default(), &inputs, BuildOptions::default());
    assert_eq!(kinds, vec![StreetImport, StreetLinker, IslandPruning, CoherencyCheck]);
}

#[test]
fn test_report_and_transfer_analysis() {
    let inputs = sources(&[(FileType::Gtfs, "gtfs")]);
    let mut config = BuildConfig {
        data_import_report: true,
        ..BuildConfig::default()
    };
    config.features.transfer_analyzer = true;
    let kinds = select(
        config,
        schedule(&[("RUT", "Europe/Oslo")], date(2024, 6, 3)),
        ScheduleData::default(),
        &inputs,
        BuildOptions::default(),
    );
    assert_eq!(
        kinds,
        vec![GtfsImport, StreetLinker, DirectTransfers, TransferAnalyzer, IssueReport]
    );
}
