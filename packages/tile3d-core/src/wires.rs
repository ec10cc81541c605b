// Wire builder: sagging ribbon strips between support points (power lines,
// catenary-ish cables). The sag is a parabolic approximation of the
// catenary, deepest at midspan and proportional to span length, which is
// indistinguishable from the exact curve at map scale.
use crate::math::{Vec2, Vec3};
use crate::triangulate::MeshBuffers;

/// Midspan sag as a fraction of span length.
pub const WIRE_SAG_RATIO: f64 = 0.045;
/// Samples per span.
pub const WIRE_SEGMENTS: usize = 8;

pub struct WireInput<'a> {
    /// Support points with absolute heights (e.g. pole tops).
    pub supports: &'a [Vec3],
    /// Ribbon width in meters.
    pub thickness: f64,
    /// Midspan sag fraction; `WIRE_SAG_RATIO` is the usual value.
    pub sag: f64,
}

pub fn build_wire(input: &WireInput) -> MeshBuffers {
    let mut mesh = MeshBuffers::new();
    if input.supports.len() < 2 || input.thickness <= 0.0 {
        return mesh;
    }
    let half = input.thickness * 0.5;

    for pair in input.supports.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let plan_a = Vec2::new(a.x, a.y);
        let plan_b = Vec2::new(b.x, b.y);
        let span = plan_a.distance_to(plan_b);
        if span < 1e-9 {
            continue;
        }
        let across = plan_b.sub(plan_a).normalize().perp().scale(half);
        let max_sag = span * input.sag;

        let point_at = |t: f64| -> Vec3 {
            let plan = plan_a.lerp(plan_b, t);
            // Parabolic sag: zero at the supports, deepest at midspan
            let z = a.z + (b.z - a.z) * t - max_sag * 4.0 * t * (1.0 - t);
            Vec3::from_xy(plan, z)
        };

        for step in 0..WIRE_SEGMENTS {
            let t0 = step as f64 / WIRE_SEGMENTS as f64;
            let t1 = (step + 1) as f64 / WIRE_SEGMENTS as f64;
            let p0 = point_at(t0);
            let p1 = point_at(t1);
            let quad = [
                Vec3::new(p0.x - across.x, p0.y - across.y, p0.z),
                Vec3::new(p1.x - across.x, p1.y - across.y, p1.z),
                Vec3::new(p1.x + across.x, p1.y + across.y, p1.z),
                Vec3::new(p0.x + across.x, p0.y + across.y, p0.z),
            ];
            mesh.push_quad(
                quad,
                [
                    [t0 * span, 0.0],
                    [t1 * span, 0.0],
                    [t1 * span, 1.0],
                    [t0 * span, 1.0],
                ],
            );
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_vertex_count_follows_segments_and_spans() {
        let supports = [
            Vec3::new(0.0, 0.0, 8.0),
            Vec3::new(30.0, 0.0, 8.0),
            Vec3::new(60.0, 0.0, 8.0),
        ];
        let mesh = build_wire(&WireInput {
            supports: &supports,
            thickness: 0.1,
            sag: WIRE_SAG_RATIO,
        });
        assert_eq!(mesh.vertex_count(), 2 * WIRE_SEGMENTS * 6);
    }

    #[test]
    fn sag_is_deepest_at_midspan() {
        let supports = [Vec3::new(0.0, 0.0, 10.0), Vec3::new(40.0, 0.0, 10.0)];
        let mesh = build_wire(&WireInput {
            supports: &supports,
            thickness: 0.1,
            sag: 0.05,
        });
        let min_z = mesh
            .positions
            .chunks_exact(3)
            .map(|v| v[2])
            .fold(f32::MAX, f32::min);
        // Midspan dip: 40 * 0.05 = 2 below the supports
        assert!((min_z - 8.0).abs() < 1e-4);
        // Supports stay put
        let max_z = mesh
            .positions
            .chunks_exact(3)
            .map(|v| v[2])
            .fold(f32::MIN, f32::max);
        assert!((max_z - 10.0).abs() < 1e-4);
    }
}
