// Wall builder: one quad pair per ring edge, smooth or hard corners from
// the edge-to-edge angle, and per-run window tiling. A run is a maximal
// chain of edges joined by smooth corners; its window count is the run
// length rounded over the nominal window width, and the U coordinate is
// rescaled so windows tile evenly. A run that rounds to zero windows is
// textured as plain wall instead.
use crate::math::{Vec2, Vec3};
use crate::triangulate::MeshBuffers;

/// Corners sharper than this angle keep per-face normals.
const SMOOTH_ANGLE_DEG: f64 = 30.0;

#[derive(Clone, Copy, Debug)]
pub enum WallHeight<'a> {
    /// Same top for every vertex.
    Constant(f64),
    /// Per-vertex top, e.g. from a roof skirt. Length must match the
    /// vertex list.
    PerVertex(&'a [f64]),
}

pub struct WallsInput<'a> {
    /// Ring vertices without a closing duplicate.
    pub vertices: &'a [Vec2],
    /// Closed rings wall every edge including last->first; open chains
    /// (fences) stop at the last vertex.
    pub closed: bool,
    /// Wall bottom; per-vertex for terrain-hugging strips.
    pub bottom: WallHeight<'a>,
    pub top: WallHeight<'a>,
    /// Nominal window width in meters; zero disables windows.
    pub window_width: f64,
    pub wall_texture: u32,
    pub window_texture: u32,
}

#[derive(Debug, Default)]
pub struct WallGeometry {
    pub mesh: MeshBuffers,
    /// One texture id per emitted vertex.
    pub texture_ids: Vec<u32>,
}

struct Run {
    /// Edge indices in walk order.
    edges: Vec<usize>,
    length: f64,
    windows: usize,
}

pub fn build_walls(input: &WallsInput) -> WallGeometry {
    let n = input.vertices.len();
    if n < 2 {
        return WallGeometry::default();
    }
    let edge_count = if input.closed { n } else { n - 1 };

    let edge_dir = |i: usize| -> Vec2 {
        let a = input.vertices[i];
        let b = input.vertices[(i + 1) % n];
        b.sub(a).normalize()
    };
    // Outward normal: the right-hand side of the edge direction, which is
    // the exterior for counter-clockwise rings
    let edge_normal = |i: usize| -> Vec2 { edge_dir(i).perp().scale(-1.0) };

    let smooth_threshold = SMOOTH_ANGLE_DEG.to_radians().cos();
    // Smoothness of the corner at the start vertex of edge i
    let corner_smooth = |i: usize| -> bool {
        if !input.closed && i == 0 {
            return false;
        }
        let prev = (i + edge_count - 1) % edge_count;
        edge_dir(prev).dot(edge_dir(i)) > smooth_threshold
    };

    let sample = |height: &WallHeight, i: usize| -> f64 {
        match height {
            WallHeight::Constant(z) => *z,
            WallHeight::PerVertex(values) => values.get(i).copied().unwrap_or(0.0),
        }
    };
    let top_at = |i: usize| -> f64 { sample(&input.top, i) };
    let bottom_at = |i: usize| -> f64 { sample(&input.bottom, i) };

    // Group consecutive smooth edges into runs. Closed fully-smooth loops
    // (towers) become a single wrapping run.
    let mut run_starts: Vec<usize> = (0..edge_count).filter(|&i| !corner_smooth(i)).collect();
    if run_starts.is_empty() {
        run_starts.push(0);
    }
    let mut runs: Vec<Run> = Vec::with_capacity(run_starts.len());
    for (r, &start) in run_starts.iter().enumerate() {
        let next_start = run_starts[(r + 1) % run_starts.len()];
        let end = if next_start > start {
            next_start
        } else {
            next_start + edge_count
        };
        let edges: Vec<usize> = (start..end).map(|i| i % edge_count).collect();
        let length: f64 = edges
            .iter()
            .map(|&i| input.vertices[i].distance_to(input.vertices[(i + 1) % n]))
            .sum();
        let windows = if input.window_width > 0.0 && length > 0.0 {
            (length / input.window_width).round() as usize
        } else {
            0
        };
        runs.push(Run {
            edges,
            length,
            windows,
        });
    }

    let mut geometry = WallGeometry::default();
    for run in &runs {
        let textured = run.windows >= 1;
        let texture = if textured {
            input.window_texture
        } else {
            input.wall_texture
        };
        // With windows, U spans one unit per window across the run; plain
        // walls keep meters
        let u_scale = if textured && run.length > 0.0 {
            run.windows as f64 / run.length
        } else {
            1.0
        };
        let v_scale = if input.window_width > 0.0 {
            1.0 / input.window_width
        } else {
            1.0
        };

        let mut distance = 0.0f64;
        for &i in &run.edges {
            let a = input.vertices[i];
            let b = input.vertices[(i + 1) % n];
            let edge_len = a.distance_to(b);
            if edge_len < 1e-9 {
                continue;
            }

            // Averaged normals at smooth corners, face normal otherwise
            let normal_at = |edge: usize, at_start: bool| -> Vec3 {
                let corner = if at_start { edge } else { edge + 1 };
                let corner_mod = corner % edge_count;
                let this_n = edge_normal(edge);
                let boundary = !input.closed && (corner == 0 || corner == edge_count);
                let n2 = if !boundary && corner_smooth(corner_mod) {
                    let prev = (corner_mod + edge_count - 1) % edge_count;
                    edge_normal(prev).add(edge_normal(corner_mod))
                } else {
                    this_n
                };
                let n2 = n2.normalize();
                Vec3::new(n2.x, n2.y, 0.0)
            };
            let normal_a = normal_at(i, true);
            let normal_b = normal_at(i, false);

            let (top_a, top_b) = (top_at(i), top_at((i + 1) % n));
            let (bottom_a, bottom_b) = (bottom_at(i), bottom_at((i + 1) % n));
            let u0 = distance * u_scale;
            let u1 = (distance + edge_len) * u_scale;

            let quad = [
                Vec3::from_xy(a, bottom_a),
                Vec3::from_xy(b, bottom_b),
                Vec3::from_xy(b, top_b),
                Vec3::from_xy(a, top_a),
            ];
            let quad_normals = [normal_a, normal_b, normal_b, normal_a];
            let quad_uvs = [
                [u0, 0.0],
                [u1, 0.0],
                [u1, (top_b - bottom_b) * v_scale],
                [u0, (top_a - bottom_a) * v_scale],
            ];

            geometry.mesh.push_triangle_smooth(
                [quad[0], quad[1], quad[3]],
                [quad_normals[0], quad_normals[1], quad_normals[3]],
                [quad_uvs[0], quad_uvs[1], quad_uvs[3]],
            );
            geometry.mesh.push_triangle_smooth(
                [quad[1], quad[2], quad[3]],
                [quad_normals[1], quad_normals[2], quad_normals[3]],
                [quad_uvs[1], quad_uvs[2], quad_uvs[3]],
            );
            geometry.texture_ids.extend(std::iter::repeat(texture).take(6));

            distance += edge_len;
        }
    }
    geometry
}
