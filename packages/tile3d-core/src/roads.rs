// Road ribbon builder: a centerline plus width becomes a continuous strip
// of quads. Interior joints share mitered offset points; sharp turns fall
// back to per-segment offsets on the outer side with a bevel connector
// triangle, and the miter length is clamped so near-U-turns cannot spike.
// The ribbon is emitted flat (z = 0); ground conformance is the projector's
// job.
use crate::math::{Vec2, Vec3};
use crate::triangulate::MeshBuffers;

/// Offset length never exceeds this multiple of the road width.
const MITER_LIMIT_WIDTHS: f64 = 5.0;
/// Turns sharper than this (dot of adjacent directions) get a bevel joint.
const SHARP_TURN_DOT: f64 = -0.5;
/// Tiling period for world-position UVs, meters.
pub const WORLD_UV_PERIOD: f64 = 16.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoadSide {
    Both,
    Left,
    Right,
}

pub struct RoadInput<'a> {
    pub vertices: &'a [Vec2],
    pub width: f64,
    pub side: RoadSide,
    /// Course continuation beyond the first/last vertex, e.g. the
    /// untrimmed neighbor vertex at a junction, so the cut end stays
    /// perpendicular to the original course.
    pub start_adjacent: Option<Vec2>,
    pub end_adjacent: Option<Vec2>,
    /// True: U/V follow travel distance. False: UVs come from world
    /// position (isotropic ground textures).
    pub uv_follows_distance: bool,
}

struct Joint {
    left_in: Vec2,
    left_out: Vec2,
    right_in: Vec2,
    right_out: Vec2,
    /// Bevel connector at sharp turns: (outer end, outer start, pivot).
    bevel: Option<[Vec2; 3]>,
}

pub fn build_road(input: &RoadInput) -> MeshBuffers {
    let vertices = input.vertices;
    let mut mesh = MeshBuffers::new();
    if vertices.len() < 2 || input.width <= 0.0 {
        return mesh;
    }
    let half = input.width * 0.5;
    let n = vertices.len();

    let segment_dir = |i: usize| -> Vec2 { vertices[i + 1].sub(vertices[i]).normalize() };

    let mut joints: Vec<Joint> = Vec::with_capacity(n);
    for i in 0..n {
        let dir_out = if i + 1 < n { segment_dir(i) } else { segment_dir(i - 1) };
        let dir_in = if i > 0 {
            segment_dir(i - 1)
        } else {
            match input.start_adjacent {
                Some(adjacent) => vertices[0].sub(adjacent).normalize(),
                None => dir_out,
            }
        };
        let dir_out = if i + 1 < n {
            dir_out
        } else {
            match input.end_adjacent {
                Some(adjacent) => adjacent.sub(vertices[n - 1]).normalize(),
                None => dir_in,
            }
        };

        let v = vertices[i];
        let mut miter = dir_in.add(dir_out);
        if miter.length() < 1e-9 {
            miter = dir_out.perp();
        }
        let miter = miter.normalize();
        // Offset grows with 1/cos of the half turn angle, clamped so the
        // joint never runs more than MITER_LIMIT_WIDTHS widths out
        let cos_half = miter.dot(dir_out).abs().max(half / (MITER_LIMIT_WIDTHS * input.width));
        let offset = half / cos_half;

        let left = v.add_scaled(miter.perp(), offset);
        let right = v.add_scaled(miter.perp(), -offset);

        let interior = i > 0 && i + 1 < n;
        let sharp = interior && dir_in.dot(dir_out) < SHARP_TURN_DOT;
        if !sharp {
            joints.push(Joint {
                left_in: left,
                left_out: left,
                right_in: right,
                right_out: right,
                bevel: None,
            });
            continue;
        }

        // Sharp turn: the inner side keeps a single reflected point so the
        // ribbon cannot self-intersect; the outer side gets per-segment
        // offsets bridged by a bevel triangle
        let turn_left = dir_in.cross(dir_out) > 0.0;
        let reflect = |p: Vec2| -> Vec2 {
            let w = p.sub(v);
            let parallel = miter.scale(w.dot(miter));
            let perpendicular = w.sub(parallel);
            v.add(parallel).sub(perpendicular)
        };
        if turn_left {
            // Inner = left
            let inner = reflect(right);
            let outer_in = v.add_scaled(dir_in.perp(), -half);
            let outer_out = v.add_scaled(dir_out.perp(), -half);
            joints.push(Joint {
                left_in: inner,
                left_out: inner,
                right_in: outer_in,
                right_out: outer_out,
                bevel: Some([outer_in, outer_out, inner]),
            });
        } else {
            let inner = reflect(left);
            let outer_in = v.add_scaled(dir_in.perp(), half);
            let outer_out = v.add_scaled(dir_out.perp(), half);
            joints.push(Joint {
                left_in: outer_in,
                left_out: outer_out,
                right_in: inner,
                right_out: inner,
                bevel: Some([outer_out, outer_in, inner]),
            });
        }
    }

    let uv_at = |p: Vec2, across: f64, along: f64| -> [f64; 2] {
        if input.uv_follows_distance {
            [across, along / input.width]
        } else {
            [p.x / WORLD_UV_PERIOD, p.y / WORLD_UV_PERIOD]
        }
    };

    let mut distance = 0.0f64;
    for i in 0..n - 1 {
        let seg_len = vertices[i].distance_to(vertices[i + 1]);
        let (d0, d1) = (distance, distance + seg_len);
        distance = d1;

        // Side clipping: attached lanes keep the centerline as one edge
        let (r0, l0) = match input.side {
            RoadSide::Both => (joints[i].right_out, joints[i].left_out),
            RoadSide::Left => (vertices[i], joints[i].left_out),
            RoadSide::Right => (joints[i].right_out, vertices[i]),
        };
        let (r1, l1) = match input.side {
            RoadSide::Both => (joints[i + 1].right_in, joints[i + 1].left_in),
            RoadSide::Left => (vertices[i + 1], joints[i + 1].left_in),
            RoadSide::Right => (joints[i + 1].right_in, vertices[i + 1]),
        };

        mesh.push_quad(
            [
                Vec3::from_xy(r0, 0.0),
                Vec3::from_xy(r1, 0.0),
                Vec3::from_xy(l1, 0.0),
                Vec3::from_xy(l0, 0.0),
            ],
            [
                uv_at(r0, 0.0, d0),
                uv_at(r1, 0.0, d1),
                uv_at(l1, 1.0, d1),
                uv_at(l0, 1.0, d0),
            ],
        );
    }

    // Bevel connectors fill the outer gap at sharp joints
    for (i, joint) in joints.iter().enumerate() {
        if let Some([a, b, pivot]) = joint.bevel {
            if input.side != RoadSide::Both {
                continue;
            }
            let d = vertices[..=i]
                .windows(2)
                .map(|w| w[0].distance_to(w[1]))
                .sum::<f64>();
            mesh.push_triangle(
                [
                    Vec3::from_xy(a, 0.0),
                    Vec3::from_xy(b, 0.0),
                    Vec3::from_xy(pivot, 0.0),
                ],
                [uv_at(a, 0.0, d), uv_at(b, 0.0, d), uv_at(pivot, 1.0, d)],
            );
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_road_is_one_quad_at_full_width() {
        let vertices = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)];
        let mesh = build_road(&RoadInput {
            vertices: &vertices,
            width: 4.0,
            side: RoadSide::Both,
            start_adjacent: None,
            end_adjacent: None,
            uv_follows_distance: true,
        });
        assert_eq!(mesh.vertex_count(), 6);
        let (mut min_y, mut max_y) = (f32::MAX, f32::MIN);
        for v in mesh.positions.chunks_exact(3) {
            min_y = min_y.min(v[1]);
            max_y = max_y.max(v[1]);
        }
        assert!((min_y + 2.0).abs() < 1e-5);
        assert!((max_y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn right_angle_turn_keeps_the_ribbon_connected() {
        let vertices = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
        ];
        let mesh = build_road(&RoadInput {
            vertices: &vertices,
            width: 4.0,
            side: RoadSide::Both,
            start_adjacent: None,
            end_adjacent: None,
            uv_follows_distance: true,
        });
        // Two quads, no bevel (90 degrees is not sharp)
        assert_eq!(mesh.vertex_count(), 12);
        // Miter at the corner: offset sqrt(2) * half width
        let expected = 2.0 * 2.0f64.sqrt();
        let has_miter_point = mesh.positions.chunks_exact(3).any(|v| {
            let p = Vec2::new(v[0] as f64, v[1] as f64);
            (p.distance_to(Vec2::new(10.0, 0.0)) - expected).abs() < 1e-4
        });
        assert!(has_miter_point);
    }

    #[test]
    fn sharp_turn_emits_a_bevel_and_clamps_the_offset() {
        let vertices = [
            Vec2::new(0.0, 0.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(0.0, 3.0),
        ];
        let width = 4.0;
        let mesh = build_road(&RoadInput {
            vertices: &vertices,
            width,
            side: RoadSide::Both,
            start_adjacent: None,
            end_adjacent: None,
            uv_follows_distance: true,
        });
        // Two quads plus one bevel triangle
        assert_eq!(mesh.vertex_count(), 12 + 3);
        // No offset point strays beyond the clamp
        for v in mesh.positions.chunks_exact(3) {
            let p = Vec2::new(v[0] as f64, v[1] as f64);
            let near_any = vertices
                .iter()
                .any(|c| p.distance_to(*c) <= MITER_LIMIT_WIDTHS * width + 1e-6);
            assert!(near_any, "offset point {:?} exceeded the miter clamp", p);
        }
    }

    #[test]
    fn side_modes_clip_to_the_centerline() {
        let vertices = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)];
        let left = build_road(&RoadInput {
            vertices: &vertices,
            width: 4.0,
            side: RoadSide::Left,
            start_adjacent: None,
            end_adjacent: None,
            uv_follows_distance: true,
        });
        for v in left.positions.chunks_exact(3) {
            assert!(v[1] >= -1e-6 && v[1] <= 2.0 + 1e-6);
        }
        let right = build_road(&RoadInput {
            vertices: &vertices,
            width: 4.0,
            side: RoadSide::Right,
            start_adjacent: None,
            end_adjacent: None,
            uv_follows_distance: true,
        });
        for v in right.positions.chunks_exact(3) {
            assert!(v[1] <= 1e-6 && v[1] >= -2.0 - 1e-6);
        }
    }

    #[test]
    fn world_uv_mode_follows_position() {
        let vertices = [Vec2::new(0.0, 0.0), Vec2::new(16.0, 0.0)];
        let mesh = build_road(&RoadInput {
            vertices: &vertices,
            width: 4.0,
            side: RoadSide::Both,
            start_adjacent: None,
            end_adjacent: None,
            uv_follows_distance: false,
        });
        // A vertex at x = 16 maps to u = 1
        let found = mesh
            .positions
            .chunks_exact(3)
            .zip(mesh.uvs.chunks_exact(2))
            .any(|(p, uv)| (p[0] - 16.0).abs() < 1e-5 && (uv[0] - 1.0).abs() < 1e-5);
        assert!(found);
    }

    #[test]
    fn external_adjacent_vertex_angles_the_cut_end() {
        // Trimmed road ending at (10,0); the original course continued to
        // (20, 10). The end offsets must be mitered against that course.
        let vertices = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)];
        let mesh = build_road(&RoadInput {
            vertices: &vertices,
            width: 4.0,
            side: RoadSide::Both,
            start_adjacent: None,
            end_adjacent: Some(Vec2::new(20.0, 10.0)),
            uv_follows_distance: true,
        });
        // The end edge is no longer vertical: its two corners have
        // different x
        let xs: Vec<f32> = mesh
            .positions
            .chunks_exact(3)
            .filter(|v| v[0] > 5.0)
            .map(|v| v[0])
            .collect();
        let min = xs.iter().cloned().fold(f32::MAX, f32::min);
        let max = xs.iter().cloned().fold(f32::MIN, f32::max);
        assert!(max - min > 0.5);
    }
}
