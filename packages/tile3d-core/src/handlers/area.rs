// Area handler: buildings (roof dispatch + skirted walls + underside cap),
// ground-conforming surfaces (water, pitches, generic ground), and
// vegetation areas (seeded point population into tree instances).
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::PipelineError;
use crate::features::{
    parse_color, AreaKind, InputArea, InstanceFeature, InstanceKind, MeshCategory, MeshFeature,
    Tile3DFeature,
};
use crate::ground::project_mesh;
use crate::math::{Vec2, Vec3};
use crate::multipolygon::{Multipolygon, RingSetBuilder};
use crate::roofs::{build_roof, RoofParams, RoofType};
use crate::textures::texture_id;
use crate::triangulate::MeshBuffers;
use crate::walls::{build_walls, WallHeight, WallsInput};

use super::{FeatureHandler, HandlerContext, HeightState};

const DEFAULT_BUILDING_HEIGHT: f64 = 8.0;
const LEVEL_HEIGHT: f64 = 3.5;
const DEFAULT_ROOF_HEIGHT: f64 = 3.0;
const DEFAULT_WINDOW_WIDTH: f64 = 2.5;
/// Buildings sink slightly below their lowest terrain sample.
const BUILDING_SUBMERGE: f64 = 0.5;
const FOREST_TREE_SPACING: f64 = 4.0;
const FOREST_TREE_DENSITY: f64 = 0.02;

pub struct AreaHandler {
    areas: Vec<InputArea>,
    multipolygons: Vec<Multipolygon>,
    /// Sampled tree positions per area (empty for non-forest kinds).
    tree_points: Vec<Vec<Vec2>>,
    heights: HeightState,
    /// (area index, offset, len) into the resolved heights.
    requests: Vec<(usize, usize, usize)>,
}

impl AreaHandler {
    pub fn new(areas: Vec<InputArea>) -> Self {
        let multipolygons: Vec<Multipolygon> = areas
            .iter()
            .map(|area| {
                let mut builder = RingSetBuilder::new();
                for ring in &area.rings {
                    builder.add_ring(ring.vertices.clone(), ring.role);
                }
                builder.finalize()
            })
            .collect();

        // Forest sampling is seeded by the feature id so the same tile
        // always grows the same trees
        let tree_points: Vec<Vec<Vec2>> = areas
            .iter()
            .zip(multipolygons.iter())
            .map(|(area, mp)| {
                if area.descriptor.kind == AreaKind::Forest {
                    mp.populate_with_points(FOREST_TREE_SPACING, FOREST_TREE_DENSITY, area.origin.id)
                } else {
                    Vec::new()
                }
            })
            .collect();

        Self {
            areas,
            multipolygons,
            tree_points,
            heights: HeightState::new(),
            requests: Vec::new(),
        }
    }

    fn build_building(
        &self,
        index: usize,
        terrain: &[f64],
    ) -> Option<MeshFeature> {
        let area = &self.areas[index];
        let mp = &self.multipolygons[index];
        if mp.is_empty() {
            return None;
        }
        let descriptor = &area.descriptor;

        let base = terrain
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let base = if base.is_finite() { base } else { 0.0 };

        let total_height = descriptor
            .height
            .or_else(|| descriptor.levels.map(|l| l.max(1) as f64 * LEVEL_HEIGHT))
            .unwrap_or(DEFAULT_BUILDING_HEIGHT)
            .max(2.0);

        let roof_type = descriptor.roof_type.unwrap_or(RoofType::Flat);
        let roof_params = RoofParams {
            roof_type,
            base: 0.0,
            height: descriptor.roof_height.unwrap_or(if roof_type == RoofType::Flat {
                0.0
            } else {
                DEFAULT_ROOF_HEIGHT.min(total_height * 0.4)
            }),
            angle: descriptor.roof_angle.map(f64::to_radians),
            orientation: descriptor.roof_orientation,
            ..Default::default()
        };

        // Roofs are built in eave-relative space; the actual rise decides
        // where the eave plane sits under the total height
        let mut roof = build_roof(mp, &roof_params);
        let rise = roof.apex_height.min(total_height - 1.0).max(0.0);
        let eave = base + total_height - rise;
        roof.mesh.translate_z(eave);

        let facade_color = parse_color(descriptor.facade_color.as_deref().unwrap_or(""));
        let roof_color = descriptor
            .roof_color
            .as_deref()
            .map(parse_color)
            .unwrap_or(facade_color);
        let roof_texture = texture_id(
            descriptor
                .roof_material
                .as_deref()
                .unwrap_or("roof_default"),
        );
        let facade_texture = texture_id("facade");
        let window_texture = texture_id("window");
        let window_width = descriptor.window_width.unwrap_or(DEFAULT_WINDOW_WIDTH);

        let mut mesh = MeshBuffers::new();
        let mut texture_ids: Vec<u32> = Vec::new();
        let mut colors: Vec<f32> = Vec::new();

        let mut push_uniform = |mesh: &mut MeshBuffers,
                                texture_ids: &mut Vec<u32>,
                                colors: &mut Vec<f32>,
                                part: &MeshBuffers,
                                texture: u32,
                                color: [f32; 3]| {
            mesh.extend(part);
            texture_ids.extend(std::iter::repeat(texture).take(part.vertex_count()));
            for _ in 0..part.vertex_count() {
                colors.extend_from_slice(&color);
            }
        };

        push_uniform(
            &mut mesh,
            &mut texture_ids,
            &mut colors,
            &roof.mesh,
            roof_texture,
            roof_color,
        );

        // Walls per ring, skirt-driven where the roof needs it
        let wall_bottom = base - BUILDING_SUBMERGE;
        for (ring_index, ring) in mp.rings().iter().enumerate() {
            let vertices = ring.open_nodes();
            if vertices.len() < 2 {
                continue;
            }
            let skirt_tops: Option<Vec<f64>> = roof.skirt.as_ref().and_then(|skirt| {
                skirt.get(ring_index).map(|ring_skirt| {
                    ring_skirt.iter().map(|(_, rise)| eave + rise).collect()
                })
            });
            let top = match &skirt_tops {
                Some(tops) => WallHeight::PerVertex(tops),
                None => WallHeight::Constant(eave),
            };
            let walls = build_walls(&WallsInput {
                vertices,
                closed: true,
                bottom: WallHeight::Constant(wall_bottom),
                top,
                window_width,
                wall_texture: facade_texture,
                window_texture,
            });
            mesh.extend(&walls.mesh);
            texture_ids.extend(walls.texture_ids);
            for _ in 0..walls.mesh.vertex_count() {
                colors.extend_from_slice(&facade_color);
            }
        }

        // Underside cap, reversed winding
        let underside = mp.footprint(wall_bottom, true);
        push_uniform(
            &mut mesh,
            &mut texture_ids,
            &mut colors,
            &underside,
            facade_texture,
            facade_color,
        );

        if mesh.is_empty() {
            return None;
        }
        Some(MeshFeature {
            origin: area.origin,
            category: MeshCategory::Extruded,
            mesh,
            texture_ids,
            colors,
        })
    }
}

impl FeatureHandler for AreaHandler {
    fn requested_height_positions(&mut self) -> Option<Vec<Vec2>> {
        let mut positions: Vec<Vec2> = Vec::new();
        self.requests.clear();
        for (i, area) in self.areas.iter().enumerate() {
            match area.descriptor.kind {
                AreaKind::Building => {
                    let ring_positions: Vec<Vec2> = self.multipolygons[i]
                        .rings()
                        .iter()
                        .flat_map(|ring| ring.open_nodes().iter().copied())
                        .collect();
                    if ring_positions.is_empty() {
                        continue;
                    }
                    self.requests
                        .push((i, positions.len(), ring_positions.len()));
                    positions.extend(ring_positions);
                }
                AreaKind::Forest => {
                    let points = &self.tree_points[i];
                    if points.is_empty() {
                        continue;
                    }
                    self.requests.push((i, positions.len(), points.len()));
                    positions.extend_from_slice(points);
                }
                // Water, pitches and ground are grid-projected
                _ => {}
            }
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
        for i in 0..self.areas.len() {
            let area = &self.areas[i];
            match area.descriptor.kind {
                AreaKind::Building => {
                    if let Some(feature) = self.build_building(i, slice_for(i)) {
                        features.push(Tile3DFeature::Mesh(feature));
                    }
                }
                AreaKind::Water | AreaKind::Pitch | AreaKind::Ground => {
                    let flat = self.multipolygons[i].footprint(0.0, false);
                    if flat.is_empty() {
                        continue;
                    }
                    let projected = project_mesh(context.grid, &flat);
                    if projected.is_empty() {
                        continue;
                    }
                    let texture = texture_id(match area.descriptor.kind {
                        AreaKind::Water => "water",
                        AreaKind::Pitch => "pitch",
                        _ => "grass",
                    });
                    features.push(Tile3DFeature::Mesh(MeshFeature::uniform(
                        area.origin,
                        MeshCategory::Projected,
                        projected,
                        texture,
                        [1.0, 1.0, 1.0],
                    )));
                }
                AreaKind::Forest => {
                    let points = &self.tree_points[i];
                    let terrain = slice_for(i);
                    if terrain.len() != points.len() {
                        continue;
                    }
                    // Seeded variation so tree sizes are reproducible too
                    let mut rng = SmallRng::seed_from_u64(area.origin.id ^ 0x5eed_f05e_57u64);
                    for (p, z) in points.iter().zip(terrain.iter()) {
                        features.push(Tile3DFeature::Instance(InstanceFeature {
                            origin: area.origin,
                            kind: InstanceKind::Tree,
                            position: Vec3::new(p.x, p.y, *z),
                            scale: rng.gen_range(0.7..1.3),
                            rotation: rng.gen_range(0.0..std::f64::consts::TAU),
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
    use crate::features::{AreaDescriptor, FeatureOrigin, InputRing, OriginType};
    use crate::ground::TerrainGrid;
    use crate::multipolygon::RingRole;
    use crate::road_graph::RoadGraph;

    fn square_ring(size: f64) -> InputRing {
        InputRing {
            vertices: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(size, 0.0),
                Vec2::new(size, size),
                Vec2::new(0.0, size),
            ],
            role: RingRole::Outer,
        }
    }

    fn building(id: u64, descriptor: AreaDescriptor) -> InputArea {
        InputArea {
            origin: FeatureOrigin {
                origin_type: OriginType::Way,
                id,
            },
            rings: vec![square_ring(10.0)],
            descriptor,
        }
    }

    fn descriptor(kind: AreaKind) -> AreaDescriptor {
        AreaDescriptor {
            kind,
            height: None,
            levels: None,
            roof_type: None,
            roof_height: None,
            roof_angle: None,
            roof_orientation: None,
            roof_material: None,
            roof_color: None,
            facade_color: None,
            window_width: None,
        }
    }

    fn flat_context<'a>(
        graph: &'a RoadGraph,
        grid: &'a TerrainGrid,
    ) -> HandlerContext<'a> {
        HandlerContext { graph, grid }
    }

    #[test]
    fn hipped_building_wall_height_follows_the_roof_rise() {
        // The spec scenario: 10x10 footprint, 12 m total, hipped at 30deg.
        // Rise = 5 * tan(30) = 2.89, walls top out at 12 - 2.89 = 9.11.
        let mut d = descriptor(AreaKind::Building);
        d.height = Some(12.0);
        d.roof_type = Some(RoofType::Hipped);
        d.roof_angle = Some(30.0);
        let mut handler = AreaHandler::new(vec![building(1, d)]);

        let requested = handler.requested_height_positions().unwrap();
        assert_eq!(requested.len(), 4);
        handler.provide_heights(vec![0.0; 4]).unwrap();

        let graph = RoadGraph::new();
        let grid = TerrainGrid::flat(Vec2::new(0.0, 0.0), 100.0, 4);
        let features = handler
            .take_features(&flat_context(&graph, &grid))
            .unwrap();
        assert_eq!(features.len(), 1);

        let mesh = match &features[0] {
            Tile3DFeature::Mesh(m) => m,
            _ => panic!("expected mesh"),
        };
        assert_eq!(mesh.category, MeshCategory::Extruded);

        let expected_rise = 5.0 * 30f64.to_radians().tan();
        let max_z = mesh
            .mesh
            .positions
            .chunks_exact(3)
            .map(|v| v[2] as f64)
            .fold(f64::MIN, f64::max);
        assert!((max_z - 12.0).abs() < 1e-3, "apex at {}", max_z);

        // Wall corners top out at the eave plane
        let eave = 12.0 - expected_rise;
        let has_eave_vertex = mesh
            .mesh
            .positions
            .chunks_exact(3)
            .any(|v| (v[2] as f64 - eave).abs() < 1e-3);
        assert!(has_eave_vertex, "no vertex at eave height {}", eave);
    }

    #[test]
    fn water_is_projected_onto_the_grid() {
        let positions = TerrainGrid::corner_positions(Vec2::new(0.0, 0.0), 40.0, 4);
        let heights: Vec<f64> = positions.iter().map(|p| p.y * 0.2).collect();
        let grid = TerrainGrid::from_heights(Vec2::new(0.0, 0.0), 40.0, 4, heights).unwrap();
        let graph = RoadGraph::new();

        let mut area = building(2, descriptor(AreaKind::Water));
        area.rings = vec![square_ring(20.0)];
        let mut handler = AreaHandler::new(vec![area]);
        assert!(handler.requested_height_positions().is_none());
        let features = handler
            .take_features(&flat_context(&graph, &grid))
            .unwrap();
        assert_eq!(features.len(), 1);
        if let Tile3DFeature::Mesh(mesh) = &features[0] {
            assert_eq!(mesh.category, MeshCategory::Projected);
            // Water follows the sloped grid rather than staying flat
            let (mut min_z, mut max_z) = (f32::MAX, f32::MIN);
            for v in mesh.mesh.positions.chunks_exact(3) {
                min_z = min_z.min(v[2]);
                max_z = max_z.max(v[2]);
            }
            assert!(max_z - min_z > 3.0);
        } else {
            panic!("expected mesh feature");
        }
    }

    #[test]
    fn forest_trees_are_deterministic() {
        let forest = || {
            let mut area = building(3, descriptor(AreaKind::Forest));
            area.rings = vec![square_ring(50.0)];
            AreaHandler::new(vec![area])
        };
        let graph = RoadGraph::new();
        let grid = TerrainGrid::flat(Vec2::new(0.0, 0.0), 100.0, 4);

        let run = |mut handler: AreaHandler| -> Vec<(f64, f64, f64)> {
            let requested = handler.requested_height_positions().unwrap();
            handler.provide_heights(vec![0.0; requested.len()]).unwrap();
            handler
                .take_features(&flat_context(&graph, &grid))
                .unwrap()
                .iter()
                .filter_map(|f| match f {
                    Tile3DFeature::Instance(i) => {
                        Some((i.position.x, i.position.y, i.scale))
                    }
                    _ => None,
                })
                .collect()
        };

        let a = run(forest());
        let b = run(forest());
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }
}
