// Polyline handler: roads and paths (graph-trimmed ribbons projected onto
// the terrain), fences and hedges (terrain-hugging strips), and power lines
// (sagging wires plus pole instances).
use crate::error::PipelineError;
use crate::features::{
    InputPolyline, InstanceFeature, InstanceKind, MeshCategory, MeshFeature, PathMaterial,
    PolylineKind, Tile3DFeature,
};
use crate::ground::project_mesh;
use crate::math::{Vec2, Vec3};
use crate::road_graph::{RoadGraph, RoadHandle};
use crate::roads::{build_road, RoadInput, RoadSide};
use crate::textures::texture_id;
use crate::walls::{build_walls, WallHeight, WallsInput};
use crate::wires::{build_wire, WireInput, WIRE_SAG_RATIO};

use super::{FeatureHandler, HandlerContext, HeightState};

/// Road-class groups in the adjacency graph.
const GROUP_ROAD: u32 = 0;
const GROUP_FOOTPATH: u32 = 1;
const GROUP_CYCLEWAY: u32 = 2;

const LANE_WIDTH: f64 = 3.0;
const DEFAULT_ROAD_WIDTH: f64 = 7.0;
const DEFAULT_FOOTPATH_WIDTH: f64 = 2.0;
const DEFAULT_CYCLEWAY_WIDTH: f64 = 2.5;
const DEFAULT_FENCE_HEIGHT: f64 = 1.2;
const DEFAULT_HEDGE_HEIGHT: f64 = 1.5;
/// Hugging strips sink slightly so slopes cannot open a gap underneath.
const HUGGING_SINK: f64 = 0.3;
const POWER_POLE_HEIGHT: f64 = 8.0;
const WIRE_THICKNESS: f64 = 0.1;

fn is_ribbon(kind: PolylineKind) -> bool {
    matches!(
        kind,
        PolylineKind::Road | PolylineKind::Footpath | PolylineKind::Cycleway
    )
}

pub struct PolylineHandler {
    polylines: Vec<InputPolyline>,
    heights: HeightState,
    /// (polyline index, offset, len) into the resolved height list.
    requests: Vec<(usize, usize, usize)>,
    road_handles: Vec<Option<RoadHandle>>,
}

impl PolylineHandler {
    pub fn new(polylines: Vec<InputPolyline>) -> Self {
        let count = polylines.len();
        Self {
            polylines,
            heights: HeightState::new(),
            requests: Vec::new(),
            road_handles: vec![None; count],
        }
    }

    fn ribbon_width(polyline: &InputPolyline) -> f64 {
        let descriptor = &polyline.descriptor;
        if let Some(width) = descriptor.width {
            return width.max(0.5);
        }
        match descriptor.kind {
            PolylineKind::Road => descriptor
                .lanes
                .map(|lanes| lanes.max(1) as f64 * LANE_WIDTH)
                .unwrap_or(DEFAULT_ROAD_WIDTH),
            PolylineKind::Footpath => DEFAULT_FOOTPATH_WIDTH,
            PolylineKind::Cycleway => DEFAULT_CYCLEWAY_WIDTH,
            _ => 1.0,
        }
    }

    /// First pass: register every ribbon polyline in the road graph. Must
    /// run before `init_intersections`.
    pub fn register_roads(&mut self, graph: &mut RoadGraph) {
        for (i, polyline) in self.polylines.iter().enumerate() {
            if !is_ribbon(polyline.descriptor.kind) {
                continue;
            }
            let group = polyline.descriptor.graph_group.unwrap_or(match polyline.descriptor.kind {
                PolylineKind::Road => GROUP_ROAD,
                PolylineKind::Footpath => GROUP_FOOTPATH,
                _ => GROUP_CYCLEWAY,
            });
            self.road_handles[i] =
                graph.add_road(group, polyline.vertices.clone(), Self::ribbon_width(polyline));
        }
    }

    fn ribbon_texture(polyline: &InputPolyline) -> u32 {
        let name = polyline
            .descriptor
            .material
            .map(PathMaterial::texture_name)
            .unwrap_or(match polyline.descriptor.kind {
                PolylineKind::Footpath => "gravel",
                PolylineKind::Cycleway => "concrete",
                _ => "asphalt",
            });
        texture_id(name)
    }
}

impl FeatureHandler for PolylineHandler {
    fn requested_height_positions(&mut self) -> Option<Vec<Vec2>> {
        let mut positions: Vec<Vec2> = Vec::new();
        self.requests.clear();
        for (i, polyline) in self.polylines.iter().enumerate() {
            let needs_heights = matches!(
                polyline.descriptor.kind,
                PolylineKind::Fence | PolylineKind::Hedge | PolylineKind::PowerLine
            );
            if !needs_heights {
                continue;
            }
            self.requests
                .push((i, positions.len(), polyline.vertices.len()));
            positions.extend_from_slice(&polyline.vertices);
        }
        self.heights.request(positions)
    }

    fn provide_heights(&mut self, heights: Vec<f64>) -> Result<(), PipelineError> {
        self.heights.provide(heights)
    }

    fn take_features(
        &mut self,
        context: &HandlerContext,
    ) -> Result<Vec<Tile3DFeature>, PipelineError> {
        let heights = self.heights.resolved()?.to_vec();
        let slice_for = |index: usize| -> &[f64] {
            for &(i, offset, len) in &self.requests {
                if i == index {
                    return &heights[offset..offset + len];
                }
            }
            &[]
        };

        let mut features = Vec::new();
        for (i, polyline) in self.polylines.iter().enumerate() {
            if polyline.vertices.len() < 2 {
                continue;
            }
            match polyline.descriptor.kind {
                PolylineKind::Road | PolylineKind::Footpath | PolylineKind::Cycleway => {
                    let width = Self::ribbon_width(polyline);
                    let (vertices, start_adjacent, end_adjacent) = match self.road_handles[i] {
                        Some(handle) => {
                            let trimmed = context
                                .graph
                                .trimmed_vertices(handle)
                                .unwrap_or_else(|| polyline.vertices.clone());
                            let last = polyline.vertices.len() - 1;
                            let start_moved =
                                trimmed[0].distance_to(polyline.vertices[0]) > 1e-9;
                            let end_moved =
                                trimmed[last].distance_to(polyline.vertices[last]) > 1e-9;
                            (
                                trimmed,
                                start_moved.then(|| polyline.vertices[0]),
                                end_moved.then(|| polyline.vertices[last]),
                            )
                        }
                        None => (polyline.vertices.clone(), None, None),
                    };

                    let ribbon = build_road(&RoadInput {
                        vertices: &vertices,
                        width,
                        side: RoadSide::Both,
                        start_adjacent,
                        end_adjacent,
                        uv_follows_distance: true,
                    });
                    let projected = project_mesh(context.grid, &ribbon);
                    if projected.is_empty() {
                        continue;
                    }
                    features.push(Tile3DFeature::Mesh(MeshFeature::uniform(
                        polyline.origin,
                        MeshCategory::Projected,
                        projected,
                        Self::ribbon_texture(polyline),
                        [1.0, 1.0, 1.0],
                    )));
                }
                PolylineKind::Fence | PolylineKind::Hedge => {
                    let terrain = slice_for(i);
                    if terrain.len() != polyline.vertices.len() {
                        continue;
                    }
                    let is_hedge = polyline.descriptor.kind == PolylineKind::Hedge;
                    let height = polyline.descriptor.height.unwrap_or(if is_hedge {
                        DEFAULT_HEDGE_HEIGHT
                    } else {
                        DEFAULT_FENCE_HEIGHT
                    });
                    let bottoms: Vec<f64> = terrain.iter().map(|z| z - HUGGING_SINK).collect();
                    let tops: Vec<f64> = terrain.iter().map(|z| z + height).collect();
                    let texture = texture_id(if is_hedge { "hedge" } else { "fence" });

                    let walls = build_walls(&WallsInput {
                        vertices: &polyline.vertices,
                        closed: false,
                        bottom: WallHeight::PerVertex(&bottoms),
                        top: WallHeight::PerVertex(&tops),
                        window_width: 0.0,
                        wall_texture: texture,
                        window_texture: texture,
                    });
                    if walls.mesh.is_empty() {
                        continue;
                    }
                    features.push(Tile3DFeature::Mesh(MeshFeature {
                        origin: polyline.origin,
                        category: MeshCategory::Hugging,
                        colors: vec![1.0; walls.mesh.vertex_count() * 3],
                        texture_ids: walls.texture_ids,
                        mesh: walls.mesh,
                    }));
                }
                PolylineKind::PowerLine => {
                    let terrain = slice_for(i);
                    if terrain.len() != polyline.vertices.len() {
                        continue;
                    }
                    let pole_height =
                        polyline.descriptor.height.unwrap_or(POWER_POLE_HEIGHT);
                    let supports: Vec<Vec3> = polyline
                        .vertices
                        .iter()
                        .zip(terrain.iter())
                        .map(|(p, z)| Vec3::new(p.x, p.y, z + pole_height))
                        .collect();

                    let wire = build_wire(&WireInput {
                        supports: &supports,
                        thickness: WIRE_THICKNESS,
                        sag: WIRE_SAG_RATIO,
                    });
                    if !wire.is_empty() {
                        features.push(Tile3DFeature::Mesh(MeshFeature::uniform(
                            polyline.origin,
                            MeshCategory::Extruded,
                            wire,
                            texture_id("wire"),
                            [0.1, 0.1, 0.1],
                        )));
                    }
                    for (p, z) in polyline.vertices.iter().zip(terrain.iter()) {
                        features.push(Tile3DFeature::Instance(InstanceFeature {
                            origin: polyline.origin,
                            kind: InstanceKind::UtilityPole,
                            position: Vec3::new(p.x, p.y, *z),
                            scale: pole_height / POWER_POLE_HEIGHT,
                            rotation: 0.0,
                        }));
                    }
                }
            }
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureOrigin, OriginType, PolylineDescriptor};
    use crate::ground::TerrainGrid;

    fn origin(id: u64) -> FeatureOrigin {
        FeatureOrigin {
            origin_type: OriginType::Way,
            id,
        }
    }

    fn road(id: u64, vertices: Vec<Vec2>) -> InputPolyline {
        InputPolyline {
            origin: origin(id),
            vertices,
            descriptor: PolylineDescriptor {
                kind: PolylineKind::Road,
                width: Some(4.0),
                lanes: None,
                material: None,
                height: None,
                graph_group: None,
            },
        }
    }

    #[test]
    fn t_junction_roads_are_trimmed_before_meshing() {
        let shared = Vec2::new(50.0, 50.0);
        let polylines = vec![
            road(1, vec![Vec2::new(10.0, 50.0), shared]),
            road(2, vec![Vec2::new(90.0, 50.0), shared]),
            road(3, vec![Vec2::new(50.0, 90.0), shared]),
        ];
        let mut handler = PolylineHandler::new(polylines);
        let mut graph = RoadGraph::new();
        handler.register_roads(&mut graph);
        graph.init_intersections();
        let polygons = graph.build_intersection_polygons();
        assert_eq!(polygons.len(), 1);

        assert!(handler.requested_height_positions().is_none());
        let grid = TerrainGrid::flat(Vec2::new(0.0, 0.0), 100.0, 4);
        let context = HandlerContext {
            graph: &graph,
            grid: &grid,
        };
        let features = handler.take_features(&context).unwrap();
        assert_eq!(features.len(), 3);

        // No road vertex reaches the junction center anymore
        for feature in &features {
            if let Tile3DFeature::Mesh(mesh) = feature {
                for v in mesh.mesh.positions.chunks_exact(3) {
                    let p = Vec2::new(v[0] as f64, v[1] as f64);
                    assert!(
                        p.distance_to(shared) > 1.0,
                        "road geometry overlaps the junction at {:?}",
                        p
                    );
                }
            }
        }
    }

    #[test]
    fn fences_hug_the_terrain() {
        let positions = TerrainGrid::corner_positions(Vec2::new(0.0, 0.0), 40.0, 4);
        let heights: Vec<f64> = positions.iter().map(|p| p.x * 0.1).collect();
        let grid = TerrainGrid::from_heights(Vec2::new(0.0, 0.0), 40.0, 4, heights).unwrap();
        let graph = RoadGraph::new();
        let context = HandlerContext {
            graph: &graph,
            grid: &grid,
        };

        let mut handler = PolylineHandler::new(vec![InputPolyline {
            origin: origin(5),
            vertices: vec![Vec2::new(0.0, 5.0), Vec2::new(40.0, 5.0)],
            descriptor: PolylineDescriptor {
                kind: PolylineKind::Fence,
                width: None,
                lanes: None,
                material: None,
                height: Some(2.0),
                graph_group: None,
            },
        }]);
        let requested = handler.requested_height_positions().unwrap();
        assert_eq!(requested.len(), 2);
        handler.provide_heights(vec![0.0, 4.0]).unwrap();
        let features = handler.take_features(&context).unwrap();
        assert_eq!(features.len(), 1);
        if let Tile3DFeature::Mesh(mesh) = &features[0] {
            assert_eq!(mesh.category, MeshCategory::Hugging);
            let max_z = mesh
                .mesh
                .positions
                .chunks_exact(3)
                .map(|v| v[2])
                .fold(f32::MIN, f32::max);
            // Far end terrain 4.0 + fence 2.0
            assert!((max_z - 6.0).abs() < 1e-4);
        } else {
            panic!("expected mesh feature");
        }
    }

    #[test]
    fn power_lines_emit_wires_and_poles() {
        let grid = TerrainGrid::flat(Vec2::new(0.0, 0.0), 100.0, 4);
        let graph = RoadGraph::new();
        let context = HandlerContext {
            graph: &graph,
            grid: &grid,
        };
        let mut handler = PolylineHandler::new(vec![InputPolyline {
            origin: origin(9),
            vertices: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(30.0, 0.0),
                Vec2::new(60.0, 0.0),
            ],
            descriptor: PolylineDescriptor {
                kind: PolylineKind::PowerLine,
                width: None,
                lanes: None,
                material: None,
                height: None,
                graph_group: None,
            },
        }]);
        let _ = handler.requested_height_positions().unwrap();
        handler.provide_heights(vec![0.0, 0.0, 0.0]).unwrap();
        let features = handler.take_features(&context).unwrap();
        let wires = features
            .iter()
            .filter(|f| matches!(f, Tile3DFeature::Mesh(_)))
            .count();
        let poles = features
            .iter()
            .filter(|f| matches!(f, Tile3DFeature::Instance(_)))
            .count();
        assert_eq!(wires, 1);
        assert_eq!(poles, 3);
    }
}
