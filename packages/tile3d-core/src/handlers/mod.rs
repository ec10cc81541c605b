// Feature handlers: one per input feature kind, orchestrating the mesh
// builders. Terrain heights follow a strict two-phase protocol - the
// assembler collects every handler's requested positions into one batched
// provider query and resolves all handlers before asking any of them for
// features. The per-handler state machine (`AwaitingHeights -> Ready`)
// makes calling out of order an error instead of silent garbage.
mod area;
mod node;
mod polyline;

pub use area::AreaHandler;
pub use node::NodeHandler;
pub use polyline::PolylineHandler;

use crate::error::PipelineError;
use crate::features::Tile3DFeature;
use crate::ground::TerrainGrid;
use crate::math::Vec2;
use crate::road_graph::RoadGraph;

/// Shared read-only context for feature production.
pub struct HandlerContext<'a> {
    pub graph: &'a RoadGraph,
    pub grid: &'a TerrainGrid,
}

pub trait FeatureHandler {
    /// Positions this handler needs terrain heights for, or `None` when it
    /// has no height dependency. Transitions the handler into the awaiting
    /// state; the assembler must resolve it before `take_features`.
    fn requested_height_positions(&mut self) -> Option<Vec<Vec2>>;

    /// Deliver the batched query results, same order and length as
    /// requested.
    fn provide_heights(&mut self, heights: Vec<f64>) -> Result<(), PipelineError>;

    /// Produce the handler's 3D features. Errs with `HeightsPending` if a
    /// requested height batch has not been delivered yet.
    fn take_features(
        &mut self,
        context: &HandlerContext,
    ) -> Result<Vec<Tile3DFeature>, PipelineError>;
}

/// Height-protocol state shared by the concrete handlers.
#[derive(Debug)]
pub(crate) enum HeightState {
    NotRequested,
    AwaitingHeights(usize),
    Ready(Vec<f64>),
}

impl HeightState {
    pub(crate) fn new() -> Self {
        HeightState::NotRequested
    }

    /// Register a request; empty position lists skip the protocol.
    pub(crate) fn request(&mut self, positions: Vec<Vec2>) -> Option<Vec<Vec2>> {
        if positions.is_empty() {
            return None;
        }
        *self = HeightState::AwaitingHeights(positions.len());
        Some(positions)
    }

    pub(crate) fn provide(&mut self, heights: Vec<f64>) -> Result<(), PipelineError> {
        match self {
            HeightState::AwaitingHeights(expected) => {
                if heights.len() != *expected {
                    return Err(PipelineError::HeightCountMismatch {
                        expected: *expected,
                        got: heights.len(),
                    });
                }
                *self = HeightState::Ready(heights);
                Ok(())
            }
            // Unsolicited heights for a handler that never asked
            _ => Err(PipelineError::HeightCountMismatch {
                expected: 0,
                got: heights.len(),
            }),
        }
    }

    /// The resolved heights; empty when the handler never requested any.
    pub(crate) fn resolved(&self) -> Result<&[f64], PipelineError> {
        match self {
            HeightState::NotRequested => Ok(&[]),
            HeightState::AwaitingHeights(_) => Err(PipelineError::HeightsPending),
            HeightState::Ready(heights) => Ok(heights),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_out_of_order_is_an_error() {
        let mut state = HeightState::new();
        assert!(state.resolved().is_ok());

        state
            .request(vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)])
            .unwrap();
        assert!(matches!(
            state.resolved(),
            Err(PipelineError::HeightsPending)
        ));

        assert!(matches!(
            state.provide(vec![1.0]),
            Err(PipelineError::HeightCountMismatch { expected: 2, got: 1 })
        ));
        state.provide(vec![1.0, 2.0]).unwrap();
        assert_eq!(state.resolved().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn empty_requests_skip_the_protocol() {
        let mut state = HeightState::new();
        assert!(state.request(Vec::new()).is_none());
        assert!(state.resolved().is_ok());
    }
}
