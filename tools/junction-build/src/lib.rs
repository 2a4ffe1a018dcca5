//! Multimodal routing graph builder.
//!
//! Street networks, transit schedules and elevation rasters are merged into a
//! shared [`Graph`] and [`TransitModel`] by a sequence of stages that the
//! [`GraphBuilder`] selects from the inputs actually present.

pub mod builder;
pub mod cli;
pub mod config;
pub mod datasource;
pub mod elevation;
pub mod error;
pub mod geo;
pub mod issues;
pub mod logging;
pub mod model;
pub mod readers;
pub mod stages;

pub use builder::{BuildOptions, BuildState, BuildSummary, GraphBuilder};
pub use config::{BuildConfig, FeatureFlags};
pub use datasource::{classify, DataSource, DataSourceSet, FileType, InputLocation};
pub use error::{BuildError, ConfigError};
pub use issues::{Issue, IssueKind, IssueStore, Severity};
pub use model::{Graph, TransitModel};
pub use stages::{BuildContext, GraphBuilderStage, StageFactory, StageKind};
