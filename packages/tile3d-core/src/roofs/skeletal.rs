// Skeleton-driven roofs: hipped (height proportional to wavefront time),
// mansard (two-pitch time profile with an iso-time split inside every
// face), and pyramidal (edge fan to the pole-of-inaccessibility apex,
// which needs no skeleton at all).
use crate::math::{clip_polygon_to_half_plane, Line, Vec2, Vec3};
use crate::multipolygon::Multipolygon;
use crate::triangulate::{cap_mesh, MeshBuffers};

use super::{RoofGeometry, RoofParams, RoofType, MANSARD_KNEE, MANSARD_SPLIT};

pub fn build_skeletal_roof(footprint: &Multipolygon, params: &RoofParams) -> Option<RoofGeometry> {
    match params.roof_type {
        RoofType::Pyramidal => build_pyramidal(footprint, params),
        RoofType::Hipped => build_from_skeleton(footprint, params, |u| u),
        RoofType::Mansard => build_from_skeleton(footprint, params, mansard_profile),
        _ => None,
    }
}

/// Two-pitch mansard rise profile over normalized wavefront time.
fn mansard_profile(u: f64) -> f64 {
    if u <= MANSARD_SPLIT {
        u / MANSARD_SPLIT * MANSARD_KNEE
    } else {
        MANSARD_KNEE + (u - MANSARD_SPLIT) / (1.0 - MANSARD_SPLIT) * (1.0 - MANSARD_KNEE)
    }
}

fn build_from_skeleton<P>(
    footprint: &Multipolygon,
    params: &RoofParams,
    profile: P,
) -> Option<RoofGeometry>
where
    P: Fn(f64) -> f64,
{
    let skeleton = footprint.straight_skeleton()?;
    if skeleton.max_time <= 1e-9 {
        return None;
    }
    let rise = match params.angle {
        Some(angle) => skeleton.max_time * angle.tan().abs(),
        None => params.height,
    };
    if !rise.is_finite() || rise < 0.0 {
        return None;
    }

    let needs_split = params.roof_type == RoofType::Mansard;
    let mut mesh = MeshBuffers::new();

    for face in &skeleton.faces {
        let height_at = |p: Vec2| -> f64 {
            let u = (face.time_of(p) / skeleton.max_time).clamp(0.0, 1.0);
            params.base + profile(u) * rise
        };

        if !needs_split {
            let cap = cap_mesh(&face.contour, &[], height_at, |p| [p.x, p.y], false);
            mesh.extend(&cap);
            continue;
        }

        // Mansard: insert the pitch-change line (parallel to the base edge
        // at the split time) so the knee actually shows in the geometry
        let split_time = MANSARD_SPLIT * skeleton.max_time;
        let dir = face.edge.1.sub(face.edge.0).normalize();
        let offset_point = face.edge.0.add_scaled(dir.perp(), split_time);
        let keep_upper = Line::new(offset_point, dir);
        let keep_lower = Line::new(offset_point, dir.scale(-1.0));

        for clip_line in [keep_lower, keep_upper] {
            let piece = clip_polygon_to_half_plane(&face.contour, clip_line);
            if piece.is_empty() {
                continue;
            }
            let cap = cap_mesh(&piece, &[], height_at, |p| [p.x, p.y], false);
            mesh.extend(&cap);
        }
    }

    if mesh.is_empty() {
        return None;
    }
    Some(RoofGeometry {
        mesh,
        skirt: None,
        apex_height: rise,
    })
}

fn build_pyramidal(footprint: &Multipolygon, params: &RoofParams) -> Option<RoofGeometry> {
    let (outer, _) = footprint.primary_rings()?;
    if outer.len() < 3 {
        return None;
    }

    let (apex_2d, apex_distance) = match footprint.pole_of_inaccessibility() {
        Some(pole) => pole,
        None => {
            // Centroid fallback for shapes too thin for the pole search
            let mut c = Vec2::new(0.0, 0.0);
            for p in outer {
                c = c.add(*p);
            }
            (c.scale(1.0 / outer.len() as f64), 1.0)
        }
    };

    let rise = match params.angle {
        Some(angle) => apex_distance * angle.tan().abs(),
        None => params.height,
    };
    if !rise.is_finite() || rise < 0.0 {
        return None;
    }

    let apex = Vec3::from_xy(apex_2d, params.base + rise);
    let mut mesh = MeshBuffers::new();
    let n = outer.len();
    for i in 0..n {
        let a = outer[i];
        let b = outer[(i + 1) % n];
        mesh.push_triangle(
            [
                Vec3::from_xy(a, params.base),
                Vec3::from_xy(b, params.base),
                apex,
            ],
            [[a.x, a.y], [b.x, b.y], [apex.x, apex.y]],
        );
    }
    Some(RoofGeometry {
        mesh,
        skirt: None,
        apex_height: rise,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipolygon::{RingRole, RingSetBuilder};

    fn square(size: f64) -> Multipolygon {
        let mut builder = RingSetBuilder::new();
        builder.add_ring(
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(size, 0.0),
                Vec2::new(size, size),
                Vec2::new(0.0, size),
            ],
            RingRole::Outer,
        );
        builder.finalize()
    }

    #[test]
    fn hipped_square_peaks_at_the_center() {
        let fp = square(10.0);
        let params = RoofParams {
            roof_type: RoofType::Hipped,
            base: 9.0,
            height: 3.0,
            ..Default::default()
        };
        let roof = build_skeletal_roof(&fp, &params).unwrap();
        let mut max_z = f32::MIN;
        let mut peak = (0.0f32, 0.0f32);
        for v in roof.mesh.positions.chunks_exact(3) {
            if v[2] > max_z {
                max_z = v[2];
                peak = (v[0], v[1]);
            }
        }
        assert!((max_z - 12.0).abs() < 1e-4);
        assert!((peak.0 - 5.0).abs() < 1e-3 && (peak.1 - 5.0).abs() < 1e-3);
        // Eave corners stay at the base plane
        let min_z = roof
            .mesh
            .positions
            .chunks_exact(3)
            .map(|v| v[2])
            .fold(f32::MAX, f32::min);
        assert!((min_z - 9.0).abs() < 1e-4);
    }

    #[test]
    fn mansard_knee_is_steep_then_shallow() {
        assert!((mansard_profile(0.0)).abs() < 1e-12);
        assert!((mansard_profile(MANSARD_SPLIT) - MANSARD_KNEE).abs() < 1e-12);
        assert!((mansard_profile(1.0) - 1.0).abs() < 1e-12);
        // Steeper before the knee than after it
        let before = mansard_profile(0.15) / 0.15;
        let after = (mansard_profile(0.9) - mansard_profile(0.6)) / 0.3;
        assert!(before > after);
    }

    #[test]
    fn mansard_produces_more_triangles_than_hipped() {
        let fp_a = square(10.0);
        let fp_b = square(10.0);
        let hipped = build_skeletal_roof(
            &fp_a,
            &RoofParams {
                roof_type: RoofType::Hipped,
                height: 3.0,
                ..Default::default()
            },
        )
        .unwrap();
        let mansard = build_skeletal_roof(
            &fp_b,
            &RoofParams {
                roof_type: RoofType::Mansard,
                height: 3.0,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(mansard.mesh.vertex_count() > hipped.mesh.vertex_count());
    }

    #[test]
    fn pyramidal_fans_every_edge_to_one_apex() {
        let fp = square(8.0);
        let params = RoofParams {
            roof_type: RoofType::Pyramidal,
            base: 5.0,
            height: 2.5,
            ..Default::default()
        };
        let roof = build_skeletal_roof(&fp, &params).unwrap();
        // One triangle per outer edge
        assert_eq!(roof.mesh.vertex_count(), 4 * 3);
        let max_z = roof
            .mesh
            .positions
            .chunks_exact(3)
            .map(|v| v[2])
            .fold(f32::MIN, f32::max);
        assert!((max_z - 7.5).abs() < 1e-4);
    }
}
