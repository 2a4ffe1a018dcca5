//! Maps flexible transit areas onto the street vertices they cover

use ::geo::{Contains, LineString, Point, Polygon};
use tracing::{debug, info};

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::issues::IssueKind;
use crate::model::{FlexArea, VertexId};

#[derive(Debug, Default)]
pub struct FlexAreaLinker;

fn polygon(area: &FlexArea) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = area.polygon.iter().map(|&(lat, lon)| (lon, lat)).collect();
    Polygon::new(LineString::from(ring), Vec::new())
}

impl GraphBuilderStage for FlexAreaLinker {
    fn kind(&self) -> StageKind {
        StageKind::FlexAreaLinker
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let street: Vec<(VertexId, Point<f64>)> = ctx
            .graph
            .street_vertex_ids()
            .into_iter()
            .filter_map(|id| ctx.graph.vertex(id))
            .map(|v| (v.id, Point::new(v.lon, v.lat)))
            .collect();

        let transit = &mut *ctx.transit;
        for area in &transit.flex_areas {
            let shape = polygon(area);
            let inside: Vec<VertexId> = street
                .iter()
                .filter(|(_, point)| shape.contains(point))
                .map(|(id, _)| *id)
                .collect();

            if inside.is_empty() {
                ctx.issues.add(
                    IssueKind::FlexAreaUnlinked,
                    format!("Flex area {} contains no street vertices", area.id),
                );
            }
            debug!(area = %area.id, vertices = inside.len(), "Linked flex area");
            transit.flex_area_vertices.insert(area.id.clone(), inside);
        }

        info!(areas = transit.flex_areas.len(), "Linked flex areas to streets");
        Ok(())
    }
}
