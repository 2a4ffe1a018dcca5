//! Graph build stages
//!
//! Every transform implements [`GraphBuilderStage`]: a side-effect free
//! precondition check, run for all stages before anything executes, and an
//! `execute` that mutates the shared graph and transit model.

pub mod boarding_locations;
pub mod bus_route_matcher;
pub mod coherency;
pub mod data_overlay;
pub mod elevation;
pub mod factory;
pub mod flex_locations;
pub mod island_pruning;
pub mod report;
pub mod schedule_import;
pub mod street_import;
pub mod street_linker;
pub mod timezone;
pub mod transfers;

pub use factory::{Readers, StageFactory};

use serde::Serialize;
use std::fmt;

use crate::issues::IssueStore;
use crate::model::{Graph, TransitModel};

/// Stage identity, declared in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StageKind {
    StreetImport,
    GtfsImport,
    NetexImport,
    TimeZoneAdjuster,
    BusRouteStreetMatcher,
    BoardingLocations,
    StreetLinker,
    IslandPruning,
    Elevation,
    FlexAreaLinker,
    DirectTransfers,
    TransferAnalyzer,
    CoherencyCheck,
    IssueReport,
    DataOverlay,
}

impl StageKind {
    /// Ordering key; a valid pipeline never decreases in rank
    pub fn rank(self) -> u8 {
        match self {
            StageKind::StreetImport => 10,
            StageKind::GtfsImport => 20,
            StageKind::NetexImport => 21,
            StageKind::TimeZoneAdjuster => 30,
            StageKind::BusRouteStreetMatcher => 40,
            StageKind::BoardingLocations => 41,
            StageKind::StreetLinker => 50,
            StageKind::IslandPruning => 60,
            StageKind::Elevation => 70,
            StageKind::FlexAreaLinker => 80,
            StageKind::DirectTransfers => 81,
            StageKind::TransferAnalyzer => 82,
            StageKind::CoherencyCheck => 90,
            StageKind::IssueReport => 100,
            StageKind::DataOverlay => 110,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::StreetImport => "street-import",
            StageKind::GtfsImport => "gtfs-import",
            StageKind::NetexImport => "netex-import",
            StageKind::TimeZoneAdjuster => "time-zone-adjuster",
            StageKind::BusRouteStreetMatcher => "bus-route-street-matcher",
            StageKind::BoardingLocations => "boarding-locations",
            StageKind::StreetLinker => "street-linker",
            StageKind::IslandPruning => "island-pruning",
            StageKind::Elevation => "elevation",
            StageKind::FlexAreaLinker => "flex-area-linker",
            StageKind::DirectTransfers => "direct-transfers",
            StageKind::TransferAnalyzer => "transfer-analyzer",
            StageKind::CoherencyCheck => "coherency-check",
            StageKind::IssueReport => "issue-report",
            StageKind::DataOverlay => "data-overlay",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable build state handed to each stage in turn
pub struct BuildContext<'a> {
    pub graph: &'a mut Graph,
    pub transit: &'a mut TransitModel,
    pub issues: &'a mut IssueStore,
}

pub trait GraphBuilderStage {
    fn kind(&self) -> StageKind;

    /// Reason the stage cannot run; must not modify anything
    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        Ok(())
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()>;
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::BuildContext;
    use crate::issues::IssueStore;
    use crate::model::{Graph, TransitModel};

    /// Owned build state for exercising a single stage
    #[derive(Default)]
    pub(crate) struct Fixture {
        pub graph: Graph,
        pub transit: TransitModel,
        pub issues: IssueStore,
    }

    impl Fixture {
        pub fn ctx(&mut self) -> BuildContext<'_> {
            BuildContext {
                graph: &mut self.graph,
                transit: &mut self.transit,
                issues: &mut self.issues,
            }
        }
    }
}
