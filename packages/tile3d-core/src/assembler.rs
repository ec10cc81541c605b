// Tile assembler: the per-tile entry point. Builds the road graph, runs the
// two-phase height protocol (one batched provider query covering the
// terrain grid corners and every handler request), then merges all handler
// output into the four packed buffer categories the renderer consumes.
use crate::error::PipelineError;
use crate::features::{
    pack_origin, InstanceFeature, MeshCategory, MeshFeature, Tile3DFeature, TileFeatures,
};
use crate::ground::TerrainGrid;
use crate::handlers::{
    AreaHandler, FeatureHandler, HandlerContext, NodeHandler, PolylineHandler,
};
use crate::math::Vec2;
use crate::road_graph::RoadGraph;

/// Batched terrain height source; called at most once per tile.
pub trait HeightProvider {
    /// Heights for `positions`, same order and length.
    fn query(&self, positions: &[Vec2]) -> Vec<f64>;
}

#[derive(Clone, Copy, Debug)]
pub struct TileOptions {
    /// Tile-local origin of the terrain grid (usually 0,0).
    pub origin: Vec2,
    /// Tile side length in meters.
    pub extent: f64,
    /// Terrain grid resolution (cells per side).
    pub grid_cells: usize,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            origin: Vec2::new(0.0, 0.0),
            extent: 200.0,
            grid_cells: 64,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    fn include(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    fn finish(&mut self) {
        if self.min[0] > self.max[0] {
            self.min = [0.0; 3];
            self.max = [0.0; 3];
        }
    }
}

/// One packed mesh category: flat attribute arrays plus per-primitive id
/// and offset tables for CPU-side picking.
#[derive(Debug)]
pub struct MeshBufferGroup {
    pub position: Vec<f32>,
    pub normal: Vec<f32>,
    pub uv: Vec<f32>,
    pub texture_id: Vec<u32>,
    pub color: Vec<f32>,
    /// Two words per primitive: packed origin id + type tag.
    pub id_buffer: Vec<u32>,
    /// Vertex start index per primitive.
    pub offset_buffer: Vec<u32>,
    pub bounding_box: BoundingBox,
}

impl MeshBufferGroup {
    fn new() -> Self {
        Self {
            position: Vec::new(),
            normal: Vec::new(),
            uv: Vec::new(),
            texture_id: Vec::new(),
            color: Vec::new(),
            id_buffer: Vec::new(),
            offset_buffer: Vec::new(),
            bounding_box: BoundingBox::empty(),
        }
    }

    fn push(&mut self, feature: MeshFeature) {
        let start_vertex = (self.position.len() / 3) as u32;
        self.offset_buffer.push(start_vertex);
        self.id_buffer.extend(pack_origin(feature.origin));

        for v in feature.mesh.positions.chunks_exact(3) {
            self.bounding_box.include([v[0], v[1], v[2]]);
        }
        self.position.extend_from_slice(&feature.mesh.positions);
        self.normal.extend_from_slice(&feature.mesh.normals);
        self.uv.extend_from_slice(&feature.mesh.uvs);
        self.texture_id.extend_from_slice(&feature.texture_ids);
        self.color.extend_from_slice(&feature.colors);
    }

    pub fn vertex_count(&self) -> usize {
        self.position.len() / 3
    }

    pub fn primitive_count(&self) -> usize {
        self.offset_buffer.len()
    }
}

/// Packed point-instance records: x, y, z, scale, rotation, kind per
/// instance.
#[derive(Debug)]
pub struct InstanceBufferGroup {
    pub buffer: Vec<f32>,
    pub id_buffer: Vec<u32>,
    pub bounding_box: BoundingBox,
}

pub const INSTANCE_STRIDE: usize = 6;

impl InstanceBufferGroup {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            id_buffer: Vec::new(),
            bounding_box: BoundingBox::empty(),
        }
    }

    fn push(&mut self, instance: InstanceFeature) {
        let p = [
            instance.position.x as f32,
            instance.position.y as f32,
            instance.position.z as f32,
        ];
        self.bounding_box.include(p);
        self.buffer.extend_from_slice(&[
            p[0],
            p[1],
            p[2],
            instance.scale as f32,
            instance.rotation as f32,
            instance.kind as u32 as f32,
        ]);
        self.id_buffer.extend(pack_origin(instance.origin));
    }

    pub fn instance_count(&self) -> usize {
        self.buffer.len() / INSTANCE_STRIDE
    }
}

#[derive(Debug)]
pub struct Tile3DBuffers {
    pub extruded: MeshBufferGroup,
    pub projected: MeshBufferGroup,
    pub hugging: MeshBufferGroup,
    pub instances: InstanceBufferGroup,
}

impl Tile3DBuffers {
    fn new() -> Self {
        Self {
            extruded: MeshBufferGroup::new(),
            projected: MeshBufferGroup::new(),
            hugging: MeshBufferGroup::new(),
            instances: InstanceBufferGroup::new(),
        }
    }

    fn group_mut(&mut self, category: MeshCategory) -> &mut MeshBufferGroup {
        match category {
            MeshCategory::Extruded => &mut self.extruded,
            MeshCategory::Projected => &mut self.projected,
            MeshCategory::Hugging => &mut self.hugging,
        }
    }
}

/// Transform one tile's features into renderable buffers.
///
/// Ordering contract: the road graph is fully initialized before any
/// handler produces features, and the height provider is queried exactly
/// once, with every handler resolved before the first `take_features`.
pub fn build_tile(
    features: TileFeatures,
    provider: &dyn HeightProvider,
    options: &TileOptions,
) -> Result<Tile3DBuffers, PipelineError> {
    // Pass 1: all roads into the graph, then one finalize
    let mut graph = RoadGraph::new();
    let mut polyline_handler = PolylineHandler::new(features.polylines);
    polyline_handler.register_roads(&mut graph);
    graph.init_intersections();
    graph.build_intersection_polygons();

    let mut node_handler = NodeHandler::new(features.nodes);
    let mut area_handler = AreaHandler::new(features.areas);
    let mut handlers: Vec<&mut dyn FeatureHandler> =
        vec![&mut node_handler, &mut polyline_handler, &mut area_handler];

    // Phase 1: one batched height query for the terrain grid corners plus
    // every handler's requested positions
    let mut positions = TerrainGrid::corner_positions(
        options.origin,
        options.extent,
        options.grid_cells,
    );
    let grid_corner_count = positions.len();
    let mut request_ranges: Vec<(usize, usize, usize)> = Vec::new();
    for (index, handler) in handlers.iter_mut().enumerate() {
        if let Some(requested) = handler.requested_height_positions() {
            request_ranges.push((index, positions.len(), requested.len()));
            positions.extend(requested);
        }
    }

    let heights = provider.query(&positions);
    if heights.len() != positions.len() {
        return Err(PipelineError::HeightCountMismatch {
            expected: positions.len(),
            got: heights.len(),
        });
    }

    let grid = TerrainGrid::from_heights(
        options.origin,
        options.extent,
        options.grid_cells,
        heights[..grid_corner_count].to_vec(),
    )?;

    // Phase 2: resolve every handler before asking any of them
    for &(index, offset, len) in &request_ranges {
        handlers[index].provide_heights(heights[offset..offset + len].to_vec())?;
    }

    let context = HandlerContext {
        graph: &graph,
        grid: &grid,
    };
    let mut buffers = Tile3DBuffers::new();
    for handler in handlers.iter_mut() {
        for feature in handler.take_features(&context)? {
            match feature {
                Tile3DFeature::Mesh(mesh) => buffers.group_mut(mesh.category).push(mesh),
                Tile3DFeature::Instance(instance) => buffers.instances.push(instance),
            }
        }
    }

    buffers.extruded.bounding_box.finish();
    buffers.projected.bounding_box.finish();
    buffers.hugging.bounding_box.finish();
    buffers.instances.bounding_box.finish();

    log::debug!(
        "tile assembled: {} extruded / {} projected / {} hugging primitives, {} instances",
        buffers.extruded.primitive_count(),
        buffers.projected.primitive_count(),
        buffers.hugging.primitive_count(),
        buffers.instances.instance_count()
    );
    Ok(buffers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{
        AreaDescriptor, AreaKind, FeatureOrigin, InputArea, InputNode, InputPolyline, InputRing,
        NodeDescriptor, NodeKind, OriginType, PolylineDescriptor, PolylineKind,
    };
    use crate::multipolygon::RingRole;
    use crate::roofs::RoofType;
    use std::cell::RefCell;

    struct CountingProvider {
        calls: RefCell<usize>,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: RefCell::new(0),
            }
        }
    }

    impl HeightProvider for CountingProvider {
        fn query(&self, positions: &[Vec2]) -> Vec<f64> {
            *self.calls.borrow_mut() += 1;
            // Gentle slope so projection has something to follow
            positions.iter().map(|p| p.x * 0.01).collect()
        }
    }

    struct ShortProvider;
    impl HeightProvider for ShortProvider {
        fn query(&self, _positions: &[Vec2]) -> Vec<f64> {
            vec![1.0, 2.0]
        }
    }

    fn origin(origin_type: OriginType, id: u64) -> FeatureOrigin {
        FeatureOrigin { origin_type, id }
    }

    fn sample_features() -> TileFeatures {
        TileFeatures {
            nodes: vec![InputNode {
                origin: origin(OriginType::Node, 100),
                position: Vec2::new(30.0, 30.0),
                descriptor: NodeDescriptor {
                    kind: NodeKind::Tree,
                    height: None,
                    rotation: None,
                },
            }],
            polylines: vec![InputPolyline {
                origin: origin(OriginType::Way, 200),
                vertices: vec![Vec2::new(10.0, 100.0), Vec2::new(180.0, 100.0)],
                descriptor: PolylineDescriptor {
                    kind: PolylineKind::Road,
                    width: Some(6.0),
                    lanes: None,
                    material: None,
                    height: None,
                    graph_group: None,
                },
            }],
            areas: vec![
                InputArea {
                    origin: origin(OriginType::Way, 300),
                    rings: vec![InputRing {
                        vertices: vec![
                            Vec2::new(50.0, 50.0),
                            Vec2::new(60.0, 50.0),
                            Vec2::new(60.0, 60.0),
                            Vec2::new(50.0, 60.0),
                        ],
                        role: RingRole::Outer,
                    }],
                    descriptor: AreaDescriptor {
                        kind: AreaKind::Building,
                        height: Some(12.0),
                        levels: None,
                        roof_type: Some(RoofType::Gabled),
                        roof_height: Some(3.0),
                        roof_angle: None,
                        roof_orientation: None,
                        roof_material: None,
                        roof_color: Some("#cc4444".to_string()),
                        facade_color: Some("#ddddcc".to_string()),
                        window_width: None,
                    },
                },
                InputArea {
                    origin: origin(OriginType::Relation, 400),
                    rings: vec![InputRing {
                        vertices: vec![
                            Vec2::new(120.0, 20.0),
                            Vec2::new(160.0, 20.0),
                            Vec2::new(160.0, 60.0),
                            Vec2::new(120.0, 60.0),
                        ],
                        role: RingRole::Outer,
                    }],
                    descriptor: AreaDescriptor {
                        kind: AreaKind::Water,
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
                    },
                },
            ],
        }
    }

    #[test]
    fn provider_is_queried_exactly_once_per_tile() {
        let provider = CountingProvider::new();
        let buffers =
            build_tile(sample_features(), &provider, &TileOptions::default()).unwrap();
        assert_eq!(*provider.calls.borrow(), 1);

        // Every category got content
        assert!(buffers.extruded.vertex_count() > 0, "building missing");
        assert!(buffers.projected.vertex_count() > 0, "road/water missing");
        assert_eq!(buffers.instances.instance_count(), 1, "tree missing");

        // Attribute arrays stay in lockstep
        for group in [&buffers.extruded, &buffers.projected, &buffers.hugging] {
            let count = group.vertex_count();
            assert_eq!(group.normal.len(), count * 3);
            assert_eq!(group.uv.len(), count * 2);
            assert_eq!(group.texture_id.len(), count);
            assert_eq!(group.color.len(), count * 3);
            assert_eq!(group.id_buffer.len(), group.primitive_count() * 2);
        }

        // Offsets are strictly increasing vertex starts
        let offsets = &buffers.projected.offset_buffer;
        for pair in offsets.windows(2) {
            assert!(pair[0] < pair[1]);
        }

        // The building's id round-trips through the id buffer
        let packed = [
            buffers.extruded.id_buffer[0],
            buffers.extruded.id_buffer[1],
        ];
        let unpacked = crate::features::unpack_origin(packed);
        assert_eq!(unpacked.id, 300);
        assert_eq!(unpacked.origin_type, OriginType::Way);
    }

    #[test]
    fn bounding_boxes_cover_the_geometry() {
        let provider = CountingProvider::new();
        let buffers =
            build_tile(sample_features(), &provider, &TileOptions::default()).unwrap();
        let bbox = &buffers.extruded.bounding_box;
        assert!(bbox.min[0] >= 49.0 && bbox.max[0] <= 61.0);
        // Building top reaches ~12 m above its terrain base
        assert!(bbox.max[2] > 11.0);

        let empty = &buffers.hugging.bounding_box;
        assert_eq!(empty.min, [0.0; 3]);
        assert_eq!(empty.max, [0.0; 3]);
    }

    #[test]
    fn short_provider_response_is_a_contract_error() {
        let result = build_tile(
            sample_features(),
            &ShortProvider,
            &TileOptions::default(),
        );
        assert!(matches!(
            result,
            Err(PipelineError::HeightCountMismatch { .. })
        ));
    }

    #[test]
    fn empty_tile_assembles_to_empty_buffers() {
        let provider = CountingProvider::new();
        let buffers =
            build_tile(TileFeatures::default(), &provider, &TileOptions::default()).unwrap();
        assert_eq!(buffers.extruded.vertex_count(), 0);
        assert_eq!(buffers.projected.vertex_count(), 0);
        assert_eq!(buffers.hugging.vertex_count(), 0);
        assert_eq!(buffers.instances.instance_count(), 0);
    }
}
