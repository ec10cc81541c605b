// Node handler: point features become instance records. Street furniture
// without an explicit rotation is oriented to face the nearest path via the
// road graph projection query; no path in range means default orientation.
use crate::error::PipelineError;
use crate::features::{InputNode, InstanceFeature, InstanceKind, NodeKind, Tile3DFeature};
use crate::math::Vec2;

use super::{FeatureHandler, HandlerContext, HeightState};

/// Node kinds that want to face the nearest path.
fn faces_path(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Bench | NodeKind::BusStop)
}

fn default_height(kind: NodeKind) -> f64 {
    match kind {
        NodeKind::Tree => 10.0,
        NodeKind::UtilityPole => 8.0,
        NodeKind::StreetLamp => 6.0,
        NodeKind::Bench => 0.9,
        NodeKind::BusStop => 2.5,
        NodeKind::Hydrant => 0.8,
    }
}

pub struct NodeHandler {
    nodes: Vec<InputNode>,
    heights: HeightState,
}

impl NodeHandler {
    pub fn new(nodes: Vec<InputNode>) -> Self {
        Self {
            nodes,
            heights: HeightState::new(),
        }
    }
}

impl FeatureHandler for NodeHandler {
    fn requested_height_positions(&mut self) -> Option<Vec<Vec2>> {
        let positions: Vec<Vec2> = self.nodes.iter().map(|n| n.position).collect();
        self.heights.request(positions)
    }

    fn provide_heights(&mut self, heights: Vec<f64>) -> Result<(), PipelineError> {
        self.heights.provide(heights)
    }

    fn take_features(
        &mut self,
        context: &HandlerContext,
    ) -> Result<Vec<Tile3DFeature>, PipelineError> {
        let heights = self.heights.resolved()?;
        let mut features = Vec::with_capacity(self.nodes.len());

        for (i, node) in self.nodes.iter().enumerate() {
            let z = heights.get(i).copied().unwrap_or(0.0);
            let kind = InstanceKind::from(node.descriptor.kind);

            let rotation = match node.descriptor.rotation {
                Some(rotation) => rotation,
                None if faces_path(node.descriptor.kind) => {
                    match context.graph.closest_projection(node.position, None) {
                        Some(projected) => {
                            let toward = projected.sub(node.position);
                            toward.y.atan2(toward.x)
                        }
                        None => 0.0,
                    }
                }
                None => 0.0,
            };

            let scale = node
                .descriptor
                .height
                .map(|h| h / default_height(node.descriptor.kind))
                .unwrap_or(1.0)
                .clamp(0.25, 4.0);

            features.push(Tile3DFeature::Instance(InstanceFeature {
                origin: node.origin,
                kind,
                position: crate::math::Vec3::new(node.position.x, node.position.y, z),
                scale,
                rotation,
            }));
        }
        Ok(features)
    }
}
