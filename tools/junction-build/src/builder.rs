//! Stage selection and the checked, strictly sequential build run

use serde::Serialize;
use std::mem;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{TRANSIT_SERVICE_END_KEY, TRANSIT_SERVICE_START_KEY};
use crate::datasource::{DataSourceSet, FileType};
use crate::error::BuildError;
use crate::issues::{IssueStore, IssueSummary};
use crate::model::{Graph, TransitModel};
use crate::stages::{BuildContext, GraphBuilderStage, StageFactory, StageKind};

/// Lifecycle of a [`GraphBuilder`]; `Aborted` is reachable from any state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuildState {
    Configured,
    PreconditionsChecked,
    Executed,
    Validated,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// The graph was loaded from a persisted street graph
    pub load_street_graph: bool,
    /// The build stops after streets so the result can be persisted
    pub save_street_graph: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub elapsed: Duration,
    pub vertices: usize,
    pub edges: usize,
    pub issues: IssueSummary,
    pub stages_run: Vec<StageKind>,
}

pub struct GraphBuilder<'a> {
    graph: &'a mut Graph,
    transit: &'a mut TransitModel,
    issues: &'a mut IssueStore,
    stages: Vec<Box<dyn GraphBuilderStage>>,
    has_transit_data: bool,
    state: BuildState,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        graph: &'a mut Graph,
        transit: &'a mut TransitModel,
        issues: &'a mut IssueStore,
        has_transit_data: bool,
    ) -> Self {
        Self {
            graph,
            transit,
            issues,
            stages: Vec::new(),
            has_transit_data,
            state: BuildState::Configured,
        }
    }

    /// Select the stages for the given inputs.
    ///
    /// Selection only reads the data source set, configuration and the
    /// agencies already registered in `transit`; nothing is read from disk.
    pub fn create(
        factory: &StageFactory,
        sources: &DataSourceSet,
        options: BuildOptions,
        graph: &'a mut Graph,
        transit: &'a mut TransitModel,
        issues: &'a mut IssueStore,
    ) -> Self {
        let config = factory.config();
        let flags = factory.flags();
        transit.init_time_zone(config.time_zone.as_deref());

        let has_street_data = sources.has(FileType::Osm);
        let has_gtfs = sources.has(FileType::Gtfs);
        let has_netex = sources.has(FileType::Netex);
        let has_transit_data = has_gtfs || has_netex;
        let multiple_zones = transit.agency_time_zones().len() > 1;
        let graph_has_streets = graph.has_streets();

        let mut builder = Self::new(graph, transit, issues, has_transit_data);

        if has_street_data {
            builder.add_stage(factory.create_street_import(sources.get(FileType::Osm)));
        }
        if has_gtfs {
            builder.add_stage(factory.create_gtfs_import(sources.get(FileType::Gtfs)));
        }
        if has_netex {
            builder.add_stage(factory.create_netex_import(sources.get(FileType::Netex)));
        }
        if has_transit_data && multiple_zones {
            builder.add_stage(factory.create_time_zone_adjuster());
        }
        if has_transit_data && (has_street_data || graph_has_streets) {
            if config.match_bus_routes_to_streets {
                builder.add_stage(factory.create_bus_route_matcher());
            }
            builder.add_stage(factory.create_boarding_location_linker());
        }
        builder.add_stage(factory.create_street_linker());
        if (has_street_data && !options.save_street_graph) || options.load_street_graph {
            builder.add_stage(factory.create_island_pruner());
        }
        let elevation_sources = factory.create_elevation_sources(sources);
        let last_elevation = elevation_sources.len().saturating_sub(1);
        for (i, source) in elevation_sources.into_iter().enumerate() {
            builder.add_stage(factory.create_elevation(source, i == last_elevation));
        }
        if has_transit_data {
            if flags.flex_routing {
                builder.add_stage(factory.create_flex_area_linker());
            }
            builder.add_stage(factory.create_direct_transfer_generator());
            if flags.transfer_analyzer {
                builder.add_stage(factory.create_transfer_analyzer());
            }
        }
        if options.load_street_graph || has_street_data {
            builder.add_stage(factory.create_coherency_checker());
        }
        if config.data_import_report {
            builder.add_stage(factory.create_issue_report(sources.report_dir()));
        }
        if flags.data_overlay {
            builder.add_stage_optional(factory.create_data_overlay());
        }

        debug!(stages = ?builder.stage_kinds(), "Selected graph build stages");
        builder
    }

    pub fn add_stage(&mut self, stage: Box<dyn GraphBuilderStage>) {
        debug_assert!(
            self.stages.last().map_or(true, |last| last.kind().rank() <= stage.kind().rank()),
            "stage {} added after a later stage",
            stage.kind()
        );
        self.stages.push(stage);
    }

    /// Add a stage the factory may not have been able to create
    pub fn add_stage_optional(&mut self, stage: Option<Box<dyn GraphBuilderStage>>) {
        if let Some(stage) = stage {
            self.add_stage(stage);
        }
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// True when stage ranks never decrease along the list
    pub fn verify_ordering(&self) -> bool {
        self.stages
            .windows(2)
            .all(|pair| pair[0].kind().rank() <= pair[1].kind().rank())
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn has_transit_data(&self) -> bool {
        self.has_transit_data
    }

    /// Check every precondition, then execute every stage in order.
    ///
    /// The stage list is consumed; a second call fails with
    /// [`BuildError::InvalidState`].
    pub fn run(&mut self) -> Result<BuildSummary, BuildError> {
        if self.state != BuildState::Configured {
            return Err(BuildError::InvalidState(self.state));
        }
        let start = Instant::now();
        let mut stages = mem::take(&mut self.stages);
        info!(stages = stages.len(), "Starting graph build");

        let mut ctx = BuildContext {
            graph: &mut *self.graph,
            transit: &mut *self.transit,
            issues: &mut *self.issues,
        };

        for stage in &stages {
            if let Err(reason) = stage.check_preconditions(&ctx) {
                self.state = BuildState::Aborted;
                return Err(BuildError::Precondition {
                    stage: stage.kind(),
                    reason,
                });
            }
        }
        self.state = BuildState::PreconditionsChecked;

        let mut stages_run = Vec::with_capacity(stages.len());
        for stage in &mut stages {
            let kind = stage.kind();
            let stage_start = Instant::now();
            info!(stage = %kind, "Running stage");
            if let Err(source) = stage.execute(&mut ctx) {
                self.state = BuildState::Aborted;
                return Err(BuildError::Stage { stage: kind, source });
            }
            debug!(stage = %kind, elapsed = ?stage_start.elapsed(), "Stage finished");
            stages_run.push(kind);
        }
        self.state = BuildState::Executed;

        let issues = ctx.issues.summarize();

        if self.has_transit_data && !ctx.transit.has_transit() {
            self.state = BuildState::Aborted;
            return Err(BuildError::Configuration {
                message: "The provided transit data has no trips within the configured transit service period."
                    .to_string(),
                start_key: TRANSIT_SERVICE_START_KEY,
                end_key: TRANSIT_SERVICE_END_KEY,
            });
        }
        self.state = BuildState::Validated;

        let elapsed = start.elapsed();
        let vertices = ctx.graph.count_vertices();
        let edges = ctx.graph.count_edges();
        info!(
            vertices,
            edges,
            "Graph building took {:.2}s",
            elapsed.as_secs_f64()
        );
        self.state = BuildState::Done;

        Ok(BuildSummary {
            elapsed,
            vertices,
            edges,
            issues,
            stages_run,
        })
    }
}
