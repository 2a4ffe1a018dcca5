//! Non-fatal data problems collected during the build

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueKind {
    MissingNode,
    TripWithoutService,
    TripOutsideServicePeriod,
    StopWithoutVertex,
    TimeZoneShift,
    BusRouteNotMatched,
    StopUnlinked,
    GraphIsland,
    ElevationMissing,
    FlexAreaUnlinked,
    StopWithoutTransfers,
    IsolatedVertex,
    IncoherentEdge,
}

impl IssueKind {
    pub fn name(self) -> &'static str {
        match self {
            IssueKind::MissingNode => "MissingNode",
            IssueKind::TripWithoutService => "TripWithoutService",
            IssueKind::TripOutsideServicePeriod => "TripOutsideServicePeriod",
            IssueKind::StopWithoutVertex => "StopWithoutVertex",
            IssueKind::TimeZoneShift => "TimeZoneShift",
            IssueKind::BusRouteNotMatched => "BusRouteNotMatched",
            IssueKind::StopUnlinked => "StopUnlinked",
            IssueKind::GraphIsland => "GraphIsland",
            IssueKind::ElevationMissing => "ElevationMissing",
            IssueKind::FlexAreaUnlinked => "FlexAreaUnlinked",
            IssueKind::StopWithoutTransfers => "StopWithoutTransfers",
            IssueKind::IsolatedVertex => "IsolatedVertex",
            IssueKind::IncoherentEdge => "IncoherentEdge",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            IssueKind::TimeZoneShift | IssueKind::GraphIsland | IssueKind::TripOutsideServicePeriod => {
                Severity::Info
            }
            IssueKind::IncoherentEdge => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
        }
    }
}

/// Issue counts per kind, as logged at the end of a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub total: usize,
    pub by_kind: BTreeMap<IssueKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}

#[derive(Debug, Default)]
pub struct IssueStore {
    issues: Vec<Issue>,
}

impl IssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, issue: Issue) {
        tracing::debug!(kind = %issue.kind, "{}", issue.message);
        self.issues.push(issue);
    }

    pub fn add(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.record(Issue::new(kind, message));
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Issues grouped by kind, in kind order
    pub fn by_kind(&self) -> BTreeMap<IssueKind, Vec<&Issue>> {
        let mut grouped: BTreeMap<IssueKind, Vec<&Issue>> = BTreeMap::new();
        for issue in &self.issues {
            grouped.entry(issue.kind).or_default().push(issue);
        }
        grouped
    }

    /// Count issues per kind and log one line per kind
    pub fn summarize(&self) -> IssueSummary {
        let mut summary = IssueSummary {
            total: self.issues.len(),
            ..IssueSummary::default()
        };
        for issue in &self.issues {
            *summary.by_kind.entry(issue.kind).or_default() += 1;
            *summary.by_severity.entry(issue.severity).or_default() += 1;
        }

        if summary.total == 0 {
            info!("No data import issues");
        } else {
            warn!(total = summary.total, "Data import issues found");
            for (kind, count) in &summary.by_kind {
                warn!("  {}: {}", kind, count);
            }
        }
        summary
    }
}
