// Input feature model (what the tile source hands us, already decoded) and
// the typed 3D features the handlers emit. Also the packed id encoding the
// renderer uses for CPU-side picking.
use serde::Deserialize;

use crate::math::{Vec2, Vec3};
use crate::multipolygon::RingRole;
use crate::roofs::{RoofOrientation, RoofType};
use crate::triangulate::MeshBuffers;

/// Origin reference for stable identification across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
    Node = 0,
    Way = 1,
    Relation = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct FeatureOrigin {
    #[serde(rename = "type")]
    pub origin_type: OriginType,
    pub id: u64,
}

/// Pack an origin into the two id-buffer words: the low 32 id bits, then
/// the remaining id bits with the origin type in the top two bits.
pub fn pack_origin(origin: FeatureOrigin) -> [u32; 2] {
    let low = origin.id as u32;
    let high = ((origin.id >> 32) as u32) & 0x3FFF_FFFF;
    [low, high | ((origin.origin_type as u32) << 30)]
}

pub fn unpack_origin(words: [u32; 2]) -> FeatureOrigin {
    let origin_type = match words[1] >> 30 {
        0 => OriginType::Node,
        1 => OriginType::Way,
        _ => OriginType::Relation,
    };
    let id = ((words[1] & 0x3FFF_FFFF) as u64) << 32 | words[0] as u64;
    FeatureOrigin { origin_type, id }
}

/// Parse a "#RRGGBB" color; anything else falls back to neutral gray.
pub fn parse_color(color: &str) -> [f32; 3] {
    if color.starts_with('#') && color.len() >= 7 {
        let r = u8::from_str_radix(&color[1..3], 16).unwrap_or(255);
        let g = u8::from_str_radix(&color[3..5], 16).unwrap_or(255);
        let b = u8::from_str_radix(&color[5..7], 16).unwrap_or(255);
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
    } else {
        [0.7, 0.7, 0.7]
    }
}

// ---------------------------------------------------------------------------
// Input descriptors

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Tree,
    UtilityPole,
    StreetLamp,
    Bench,
    BusStop,
    Hydrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeDescriptor {
    pub kind: NodeKind,
    #[serde(default)]
    pub height: Option<f64>,
    /// Explicit rotation in radians; nodes without one face the nearest
    /// path instead.
    #[serde(default)]
    pub rotation: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolylineKind {
    Road,
    Footpath,
    Cycleway,
    Fence,
    Hedge,
    PowerLine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMaterial {
    Asphalt,
    Concrete,
    Gravel,
    Wood,
}

impl PathMaterial {
    pub fn texture_name(self) -> &'static str {
        match self {
            PathMaterial::Asphalt => "asphalt",
            PathMaterial::Concrete => "concrete",
            PathMaterial::Gravel => "gravel",
            PathMaterial::Wood => "wood",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PolylineDescriptor {
    pub kind: PolylineKind,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub lanes: Option<u32>,
    #[serde(default)]
    pub material: Option<PathMaterial>,
    /// Fence/hedge height.
    #[serde(default)]
    pub height: Option<f64>,
    /// Road-class group for the adjacency graph; defaults to the kind.
    #[serde(default)]
    pub graph_group: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    Building,
    Water,
    Pitch,
    Ground,
    Forest,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AreaDescriptor {
    pub kind: AreaKind,
    /// Building total height, meters.
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub levels: Option<u32>,
    #[serde(default)]
    pub roof_type: Option<RoofType>,
    #[serde(default)]
    pub roof_height: Option<f64>,
    /// Roof slope in degrees; overrides `roof_height` when present.
    #[serde(default)]
    pub roof_angle: Option<f64>,
    #[serde(default)]
    pub roof_orientation: Option<RoofOrientation>,
    #[serde(default)]
    pub roof_material: Option<String>,
    #[serde(default)]
    pub roof_color: Option<String>,
    #[serde(default)]
    pub facade_color: Option<String>,
    /// Nominal window width; zero suppresses windows.
    #[serde(default)]
    pub window_width: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct InputNode {
    pub origin: FeatureOrigin,
    pub position: Vec2,
    pub descriptor: NodeDescriptor,
}

#[derive(Clone, Debug)]
pub struct InputPolyline {
    pub origin: FeatureOrigin,
    pub vertices: Vec<Vec2>,
    pub descriptor: PolylineDescriptor,
}

#[derive(Clone, Debug)]
pub struct InputRing {
    pub vertices: Vec<Vec2>,
    pub role: RingRole,
}

#[derive(Clone, Debug)]
pub struct InputArea {
    pub origin: FeatureOrigin,
    pub rings: Vec<InputRing>,
    pub descriptor: AreaDescriptor,
}

/// Everything the feature source decoded for one tile.
#[derive(Clone, Debug, Default)]
pub struct TileFeatures {
    pub nodes: Vec<InputNode>,
    pub polylines: Vec<InputPolyline>,
    pub areas: Vec<InputArea>,
}

// ---------------------------------------------------------------------------
// Output features

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshCategory {
    /// Absolute-height solids: buildings, wires.
    Extruded,
    /// Ground-conforming surfaces, already projected onto the terrain grid.
    Projected,
    /// Terrain-hugging strips: fences, hedges.
    Hugging,
}

#[derive(Debug)]
pub struct MeshFeature {
    pub origin: FeatureOrigin,
    pub category: MeshCategory,
    pub mesh: MeshBuffers,
    /// One texture id per vertex.
    pub texture_ids: Vec<u32>,
    /// Three floats per vertex.
    pub colors: Vec<f32>,
}

impl MeshFeature {
    /// Mesh with a single texture and color over every vertex.
    pub fn uniform(
        origin: FeatureOrigin,
        category: MeshCategory,
        mesh: MeshBuffers,
        texture: u32,
        color: [f32; 3],
    ) -> Self {
        let count = mesh.vertex_count();
        let texture_ids = vec![texture; count];
        let mut colors = Vec::with_capacity(count * 3);
        for _ in 0..count {
            colors.extend_from_slice(&color);
        }
        Self {
            origin,
            category,
            mesh,
            texture_ids,
            colors,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceKind {
    Tree = 0,
    UtilityPole = 1,
    StreetLamp = 2,
    Bench = 3,
    BusStop = 4,
    Hydrant = 5,
}

impl From<NodeKind> for InstanceKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Tree => InstanceKind::Tree,
            NodeKind::UtilityPole => InstanceKind::UtilityPole,
            NodeKind::StreetLamp => InstanceKind::StreetLamp,
            NodeKind::Bench => InstanceKind::Bench,
            NodeKind::BusStop => InstanceKind::BusStop,
            NodeKind::Hydrant => InstanceKind::Hydrant,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct InstanceFeature {
    pub origin: FeatureOrigin,
    pub kind: InstanceKind,
    pub position: Vec3,
    pub scale: f64,
    /// Yaw around +z, radians.
    pub rotation: f64,
}

#[derive(Debug)]
pub enum Tile3DFeature {
    Mesh(MeshFeature),
    Instance(InstanceFeature),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_packing_round_trips() {
        for (origin_type, id) in [
            (OriginType::Node, 42u64),
            (OriginType::Way, 4_294_967_297),
            (OriginType::Relation, 123_456_789_012),
        ] {
            let origin = FeatureOrigin { origin_type, id };
            assert_eq!(unpack_origin(pack_origin(origin)), origin);
        }
    }

    #[test]
    fn type_tag_lands_in_the_high_bits() {
        let packed = pack_origin(FeatureOrigin {
            origin_type: OriginType::Relation,
            id: 7,
        });
        assert_eq!(packed[0], 7);
        assert_eq!(packed[1] >> 30, 2);
    }

    #[test]
    fn colors_parse_or_fall_back_to_gray() {
        let red = parse_color("#ff0000");
        assert!((red[0] - 1.0).abs() < 1e-6 && red[1] < 1e-6);
        assert_eq!(parse_color("teal"), [0.7, 0.7, 0.7]);
    }

    #[test]
    fn descriptors_deserialize_from_json() {
        let descriptor: AreaDescriptor = serde_json::from_str(
            r##"{
                "kind": "building",
                "height": 12.0,
                "roof_type": "hipped",
                "roof_angle": 30.0,
                "facade_color": "#aa8866"
            }"##,
        )
        .unwrap();
        assert_eq!(descriptor.kind, AreaKind::Building);
        assert_eq!(descriptor.roof_type, Some(RoofType::Hipped));
        assert!(descriptor.roof_angle.unwrap() > 29.0);

        let node: NodeDescriptor =
            serde_json::from_str(r#"{"kind": "bus_stop"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::BusStop);
    }
}
