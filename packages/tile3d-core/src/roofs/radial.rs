// Revolved roofs: onion and dome. The outer ring is stepped toward the
// pole-of-inaccessibility apex with a per-step radius/height pair; each
// step pair is stitched with quads and the last ring fans into the apex.
use crate::math::{Vec2, Vec3};
use crate::multipolygon::Multipolygon;
use crate::triangulate::MeshBuffers;

use super::{RoofGeometry, RoofParams, RoofType};

/// Radius and height factors at normalized progress `t` toward the apex.
fn step_profile(roof_type: RoofType, t: f64) -> (f64, f64) {
    match roof_type {
        RoofType::Dome => {
            let angle = t * std::f64::consts::FRAC_PI_2;
            (angle.cos(), angle.sin())
        }
        // Onion: a dome with a bulge below the waist and a pinched tip
        RoofType::Onion => {
            let angle = t * std::f64::consts::FRAC_PI_2;
            let bulge = 1.0 + 0.35 * (t * std::f64::consts::PI).sin();
            (angle.cos() * bulge, t)
        }
        _ => (1.0 - t, t),
    }
}

pub fn build_radial_roof(footprint: &Multipolygon, params: &RoofParams) -> Option<RoofGeometry> {
    if !matches!(params.roof_type, RoofType::Onion | RoofType::Dome) {
        return None;
    }
    let (outer, holes) = footprint.primary_rings()?;
    if !holes.is_empty() || outer.len() < 3 {
        return None;
    }
    let outer: Vec<Vec2> = outer.to_vec();

    let center = match footprint.pole_of_inaccessibility() {
        Some((pole, _)) => pole,
        None => return None,
    };
    let rise = params.height;
    if !rise.is_finite() || rise < 0.0 {
        return None;
    }
    let steps = params.steps.clamp(2, 64) as usize;

    // Ring at progress t: every outer vertex pulled toward the center by
    // the radius factor, lifted by the height factor
    let ring_at = |t: f64| -> Vec<Vec3> {
        let (radius, height) = step_profile(params.roof_type, t);
        outer
            .iter()
            .map(|p| {
                let scaled = center.add(p.sub(center).scale(radius));
                Vec3::from_xy(scaled, params.base + rise * height)
            })
            .collect()
    };

    let mut mesh = MeshBuffers::new();
    let n = outer.len();
    let mut previous = ring_at(0.0);
    for step in 1..=steps {
        let t = step as f64 / steps as f64;
        let is_apex = step == steps;
        if is_apex {
            let apex = Vec3::from_xy(center, params.base + rise);
            for k in 0..n {
                let a = previous[k];
                let b = previous[(k + 1) % n];
                mesh.push_triangle([a, b, apex], [[a.x, a.y], [b.x, b.y], [apex.x, apex.y]]);
            }
        } else {
            let current = ring_at(t);
            for k in 0..n {
                let k1 = (k + 1) % n;
                mesh.push_quad(
                    [previous[k], previous[k1], current[k1], current[k]],
                    [
                        [previous[k].x, previous[k].y],
                        [previous[k1].x, previous[k1].y],
                        [current[k1].x, current[k1].y],
                        [current[k].x, current[k].y],
                    ],
                );
            }
            previous = current;
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
