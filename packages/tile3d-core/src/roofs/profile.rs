// Cross-profile roof family: skillion, gabled, gambrel and the saltbox
// variant all share one construction. The OMBB fixes a ridge axis, a
// piecewise-linear profile describes the rise across it, and the footprint
// is split into bands at every profile knot so each band triangulates with
// a purely linear height ramp.
use crate::math::{clip_polygon_to_half_plane, Line, Vec2};
use crate::multipolygon::Multipolygon;
use crate::ombb::obb_axes;
use crate::triangulate::{cap_mesh, MeshBuffers};

use super::{RoofGeometry, RoofOrientation, RoofParams, RoofType, SkirtRing};

struct ProfileFrame {
    center: Vec2,
    /// Ridge direction; band clip lines run along this.
    ridge: Vec2,
    /// Profile axis, perpendicular to the ridge.
    axis: Vec2,
    half: f64,
}

/// Normalized profile knots (position across [0..1], rise [0..1]).
fn profile_knots(params: &RoofParams) -> Vec<(f64, f64)> {
    match params.roof_type {
        RoofType::Skillion => vec![(0.0, 0.0), (1.0, 1.0)],
        RoofType::Gabled => vec![(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)],
        RoofType::Gambrel => {
            // Knee at `split` of the slope run, pushed up by `bump`
            let split = params.gambrel_split.clamp(0.05, 0.95);
            let bump = params.gambrel_bump.clamp(0.0, 1.0);
            let knee_u = 0.5 * split;
            let knee_h = (split + bump * (1.0 - split)).min(0.95);
            vec![
                (0.0, 0.0),
                (knee_u, knee_h),
                (0.5, 1.0),
                (1.0 - knee_u, knee_h),
                (1.0, 0.0),
            ]
        }
        RoofType::QuadrupleSaltbox => vec![
            (0.0, 0.0),
            (0.3, 1.0),
            (0.5, 1.0),
            (0.8, 0.4),
            (1.0, 0.0),
        ],
        _ => vec![(0.0, 0.0), (1.0, 0.0)],
    }
}

fn interpolate(knots: &[(f64, f64)], u: f64) -> f64 {
    let u = u.clamp(0.0, 1.0);
    for pair in knots.windows(2) {
        let (u0, h0) = pair[0];
        let (u1, h1) = pair[1];
        if u <= u1 || (u1 - knots.last().unwrap().0).abs() < 1e-12 {
            if u >= u0 {
                let span = u1 - u0;
                if span < 1e-12 {
                    return h1;
                }
                return h0 + (h1 - h0) * (u - u0) / span;
            }
        }
    }
    knots.last().map(|(_, h)| *h).unwrap_or(0.0)
}

pub fn build_profile_roof(footprint: &Multipolygon, params: &RoofParams) -> Option<RoofGeometry> {
    // Holes would need skirted inner walls; those footprints take the flat
    // fallback instead
    let (outer, holes) = footprint.primary_rings()?;
    if !holes.is_empty() || outer.len() < 3 {
        return None;
    }
    let outer: Vec<Vec2> = outer.to_vec();

    let obb = footprint.ombb()?;
    let axes = obb_axes(obb);
    let frame = match params.orientation.unwrap_or(RoofOrientation::Along) {
        RoofOrientation::Along => ProfileFrame {
            center: axes.center,
            ridge: axes.along,
            axis: axes.across,
            half: axes.half_across,
        },
        RoofOrientation::Across => ProfileFrame {
            center: axes.center,
            ridge: axes.across,
            axis: axes.along,
            half: axes.half_along,
        },
    };
    if frame.half < 1e-6 {
        return None;
    }

    let rise = match params.angle {
        Some(angle) => {
            let run = if params.roof_type == RoofType::Skillion {
                frame.half * 2.0
            } else {
                frame.half
            };
            run * angle.tan().abs()
        }
        None => params.height,
    };
    if !rise.is_finite() || rise < 0.0 {
        return None;
    }

    let knots = profile_knots(params);
    let coordinate = |p: Vec2| -> f64 {
        ((p.sub(frame.center).dot(frame.axis)) + frame.half) / (2.0 * frame.half)
    };
    let rise_at = |p: Vec2| -> f64 { interpolate(&knots, coordinate(p)) * rise };

    let mut mesh = MeshBuffers::new();
    for pair in knots.windows(2) {
        let (u0, _) = pair[0];
        let (u1, _) = pair[1];
        if u1 - u0 < 1e-9 {
            continue;
        }
        // Band between the two knot lines, both parallel to the ridge
        let s0 = u0 * 2.0 * frame.half - frame.half;
        let s1 = u1 * 2.0 * frame.half - frame.half;
        let lower = Line::new(frame.center.add_scaled(frame.axis, s0), frame.ridge);
        let upper = Line::new(
            frame.center.add_scaled(frame.axis, s1),
            frame.ridge.scale(-1.0),
        );

        let band = clip_polygon_to_half_plane(&outer, lower);
        if band.is_empty() {
            continue;
        }
        let band = clip_polygon_to_half_plane(&band, upper);
        if band.is_empty() {
            continue;
        }

        let cap = cap_mesh(
            &band,
            &[],
            |p| params.base + rise_at(p),
            |p| [p.x, p.y],
            false,
        );
        mesh.extend(&cap);
    }

    if mesh.is_empty() {
        return None;
    }

    // Skirt: the roof underside meets the wall top at the profile height of
    // every footprint vertex
    let skirt: Vec<SkirtRing> = footprint
        .rings()
        .iter()
        .map(|ring| {
            ring.open_nodes()
                .iter()
                .map(|&p| (p, rise_at(p)))
                .collect()
        })
        .collect();

    Some(RoofGeometry {
        mesh,
        skirt: Some(skirt),
        apex_height: rise,
    })
}
