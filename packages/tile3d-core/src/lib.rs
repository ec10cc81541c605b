//! Vector-to-3D tile geometry core.
//!
//! Takes one tile's worth of decoded vector map features (buildings, roads,
//! water, vegetation, street furniture) and turns them into packed,
//! renderable mesh buffers: extruded solids, ground-conforming surfaces,
//! terrain-hugging strips and point instances. Pure, synchronous,
//! per-tile computation - the renderer, tile fetching and terrain sampling
//! all live behind narrow interfaces (`HeightProvider`, `TileFeatures`,
//! `Tile3DBuffers`).

// Geometry kernel
pub mod math;
pub mod skeleton;
pub mod triangulate;
// Oriented bounding box math
pub mod ombb;
// Ring sets with cached derived geometry
pub mod multipolygon;
// Road adjacency graph and junction synthesis
pub mod road_graph;
// Mesh builders
pub mod ground;
pub mod roads;
pub mod roofs;
pub mod walls;
pub mod wires;
// Feature model and handlers
pub mod features;
pub mod handlers;
// Tile orchestration
pub mod assembler;
// Shared infrastructure
pub mod error;
pub mod textures;

pub use assembler::{build_tile, HeightProvider, Tile3DBuffers, TileOptions};
pub use error::PipelineError;
pub use features::{TileFeatures, Tile3DFeature};
pub use math::{Vec2, Vec3};
pub use multipolygon::{Multipolygon, RingRole, RingSetBuilder};
