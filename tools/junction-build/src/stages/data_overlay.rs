//! Attaches externally sampled parameters to street edges

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::config::DataOverlayConfig;
use crate::geo::{build_index, nearest_within};
use crate::model::EdgeId;

/// One point measurement, e.g. `{"lat": 59.9, "lon": 10.7, "values": {"noise": 62.0}}`
#[derive(Debug, Clone, Deserialize)]
struct Sample {
    lat: f64,
    lon: f64,
    values: BTreeMap<String, f64>,
}

pub struct DataOverlay {
    config: DataOverlayConfig,
}

impl DataOverlay {
    pub fn new(config: DataOverlayConfig) -> Self {
        Self { config }
    }

    fn read_samples(&self) -> anyhow::Result<Vec<Sample>> {
        let path = &self.config.file;
        let file = File::open(path).with_context(|| format!("Failed to open overlay {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file)).with_context(|| format!("Invalid overlay {}", path.display()))
    }
}

impl GraphBuilderStage for DataOverlay {
    fn kind(&self) -> StageKind {
        StageKind::DataOverlay
    }

    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        if !self.config.file.is_file() {
            return Err(format!("overlay file {} does not exist", self.config.file.display()));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let samples = self.read_samples()?;
        let index = build_index(samples.iter().enumerate().map(|(i, s)| (i as u32, s.lat, s.lon)));

        let midpoints: Vec<(EdgeId, f64, f64)> = ctx
            .graph
            .edges()
            .filter(|e| e.is_street())
            .filter_map(|e| {
                let from = ctx.graph.vertex(e.from)?;
                let to = ctx.graph.vertex(e.to)?;
                Some((e.id, (from.lat + to.lat) / 2.0, (from.lon + to.lon) / 2.0))
            })
            .collect();

        let mut annotated = 0usize;
        for (edge_id, lat, lon) in midpoints {
            let Some((sample, distance)) = nearest_within(&index, lat, lon, self.config.max_sample_distance_meters)
            else {
                continue;
            };
            let values = &samples[sample as usize].values;
            let Some(edge) = ctx.graph.edge_mut(edge_id) else {
                continue;
            };
            for parameter in &self.config.parameters {
                if let Some(value) = values.get(parameter) {
                    edge.overlay.insert(parameter.clone(), *value);
                }
            }
            debug!(edge = edge_id.0, sample, distance, "Attached overlay sample");
            annotated += 1;
        }

        info!(
            samples = samples.len(),
            edges = annotated,
            parameters = ?self.config.parameters,
            "Applied data overlay"
        );
        Ok(())
    }
}
