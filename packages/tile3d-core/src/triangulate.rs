// Triangulation helpers shared by every mesh builder. Rings go through
// earcut with holes passed as index offsets into one flattened vertex list;
// output is always a non-indexed triangle soup with one flat normal per
// face, which is what the tile buffers carry.
use crate::math::{Vec2, Vec3};

/// Growing triangle-soup buffers: 3 floats/vertex position, 3 floats/vertex
/// normal, 2 floats/vertex uv. All builders accumulate into this and the
/// assembler concatenates.
#[derive(Debug, Default, Clone)]
pub struct MeshBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
}

impl MeshBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Append one triangle with a shared flat normal. Degenerate triangles
    /// (zero-length cross product) get a Z-up normal instead of NaN.
    pub fn push_triangle(&mut self, points: [Vec3; 3], uvs: [[f64; 2]; 3]) {
        let normal = face_normal(points[0], points[1], points[2]);
        for (p, uv) in points.iter().zip(uvs.iter()) {
            self.positions.push(p.x as f32);
            self.positions.push(p.y as f32);
            self.positions.push(p.z as f32);
            self.normals.push(normal.x as f32);
            self.normals.push(normal.y as f32);
            self.normals.push(normal.z as f32);
            self.uvs.push(uv[0] as f32);
            self.uvs.push(uv[1] as f32);
        }
    }

    /// Append a triangle with explicit per-vertex normals (smooth shading).
    pub fn push_triangle_smooth(
        &mut self,
        points: [Vec3; 3],
        normals: [Vec3; 3],
        uvs: [[f64; 2]; 3],
    ) {
        for ((p, n), uv) in points.iter().zip(normals.iter()).zip(uvs.iter()) {
            self.positions.push(p.x as f32);
            self.positions.push(p.y as f32);
            self.positions.push(p.z as f32);
            self.normals.push(n.x as f32);
            self.normals.push(n.y as f32);
            self.normals.push(n.z as f32);
            self.uvs.push(uv[0] as f32);
            self.uvs.push(uv[1] as f32);
        }
    }

    /// Append a quad `a b c d` (counter-clockwise) as two triangles.
    pub fn push_quad(&mut self, points: [Vec3; 4], uvs: [[f64; 2]; 4]) {
        self.push_triangle(
            [points[0], points[1], points[3]],
            [uvs[0], uvs[1], uvs[3]],
        );
        self.push_triangle(
            [points[1], points[2], points[3]],
            [uvs[1], uvs[2], uvs[3]],
        );
    }

    pub fn extend(&mut self, other: &MeshBuffers) {
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.uvs.extend_from_slice(&other.uvs);
    }

    /// Shift every vertex vertically; used to place roof geometry built in
    /// eave-relative space at its absolute height.
    pub fn translate_z(&mut self, dz: f64) {
        for v in self.positions.chunks_exact_mut(3) {
            v[2] += dz as f32;
        }
    }
}

/// Flat face normal; Z-up when the triangle is degenerate.
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    b.sub(a).cross(c.sub(a)).normalize()
}

/// Triangulate an outer ring plus holes into index triplets over the
/// flattened vertex list `outer ++ holes[0] ++ holes[1] ++ ...`.
///
/// Rings with fewer than 3 distinct points triangulate to nothing, not an
/// error. A failed earcut run is also treated as "no triangles".
pub fn triangulate_with_holes(outer: &[Vec2], holes: &[Vec<Vec2>]) -> (Vec<Vec2>, Vec<usize>) {
    let mut flat: Vec<Vec2> = Vec::with_capacity(
        outer.len() + holes.iter().map(|h| h.len()).sum::<usize>(),
    );
    flat.extend_from_slice(outer);

    let mut data: Vec<f64> = Vec::with_capacity(flat.capacity() * 2);
    for p in outer {
        data.push(p.x);
        data.push(p.y);
    }

    let mut hole_indices: Vec<usize> = Vec::with_capacity(holes.len());
    let mut offset = outer.len();
    for hole in holes {
        hole_indices.push(offset);
        for p in hole.iter() {
            data.push(p.x);
            data.push(p.y);
        }
        flat.extend_from_slice(hole);
        offset += hole.len();
    }

    if outer.len() < 3 {
        return (flat, Vec::new());
    }

    let indices = match earcutr::earcut(&data, &hole_indices, 2) {
        Ok(indices) => indices,
        Err(_) => Vec::new(),
    };
    (flat, indices)
}

/// Build cap geometry from an existing triangulation (flattened vertices +
/// index triplets), with per-vertex height from a function of the 2D
/// position. `flip` turns the cap into underside geometry: reversed
/// winding, normals facing down.
pub fn cap_from_triangulation<F, U>(
    flat: &[Vec2],
    indices: &[usize],
    height_fn: F,
    uv_fn: U,
    flip: bool,
    mesh: &mut MeshBuffers,
) where
    F: Fn(Vec2) -> f64,
    U: Fn(Vec2) -> [f64; 2],
{
    for tri in indices.chunks_exact(3) {
        let mut pts = [flat[tri[0]], flat[tri[1]], flat[tri[2]]];
        // Orient by the plan-view cross product so the cap faces the right
        // way regardless of the input ring winding
        let cross = pts[1].sub(pts[0]).cross(pts[2].sub(pts[0]));
        let want_ccw = !flip;
        if (cross > 0.0) != want_ccw {
            pts.swap(1, 2);
        }

        let p3 = [
            Vec3::from_xy(pts[0], height_fn(pts[0])),
            Vec3::from_xy(pts[1], height_fn(pts[1])),
            Vec3::from_xy(pts[2], height_fn(pts[2])),
        ];
        let uv = [uv_fn(pts[0]), uv_fn(pts[1]), uv_fn(pts[2])];
        mesh.push_triangle(p3, uv);
    }
}

/// Triangulated cap over a ring set; see `cap_from_triangulation`.
pub fn cap_mesh<F, U>(
    outer: &[Vec2],
    holes: &[Vec<Vec2>],
    height_fn: F,
    uv_fn: U,
    flip: bool,
) -> MeshBuffers
where
    F: Fn(Vec2) -> f64,
    U: Fn(Vec2) -> [f64; 2],
{
    let (flat, indices) = triangulate_with_holes(outer, holes);
    let mut mesh = MeshBuffers::new();
    cap_from_triangulation(&flat, &indices, height_fn, uv_fn, flip, &mut mesh);
    mesh
}
