// Oriented minimum bounding box: convex hull (geo) followed by a rotating
// calipers sweep. The current best rectangle lives in a local accumulator
// and the 4 corners come back in a fixed winding so downstream code can
// derive stable "along"/"across" axes.
use geo::ConvexHull;
use geo_types::{Coord, MultiPoint, Point};
use nalgebra::{Point2 as NaPoint2, Rotation2};

use crate::math::Vec2;

/// Four rectangle corners in counter-clockwise order. Corner 0 -> 1 runs
/// along the longer rectangle side.
pub type Obb = [Vec2; 4];

/// Direction of the longer OMBB side ("along") and its perpendicular
/// ("across"), plus the half extents in both.
#[derive(Debug, Clone, Copy)]
pub struct ObbAxes {
    pub center: Vec2,
    pub along: Vec2,
    pub across: Vec2,
    pub half_along: f64,
    pub half_across: f64,
}

/// Compute the minimum-area oriented bounding box of a point set. Returns
/// `None` for fewer than 3 non-collinear points.
pub fn compute_ombb(points: &[Vec2]) -> Option<Obb> {
    if points.len() < 3 {
        return None;
    }

    let multipoint: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.x, p.y))
        .collect::<Vec<_>>()
        .into();
    let hull = multipoint.convex_hull();
    let hull_points: Vec<Vec2> = hull
        .exterior()
        .coords()
        .map(|c: &Coord<f64>| Vec2::new(c.x, c.y))
        .collect();
    // geo closes the ring; drop the duplicate last point
    let hull_points = if hull_points.len() > 1
        && hull_points[0].distance_to(*hull_points.last().unwrap()) < 1e-12
    {
        &hull_points[..hull_points.len() - 1]
    } else {
        &hull_points[..]
    };
    if hull_points.len() < 3 {
        return None;
    }

    // One caliper orientation per hull edge; the minimum-area rectangle is
    // guaranteed to share a side with the hull.
    let mut best_area = f64::INFINITY;
    let mut best: Option<Obb> = None;

    let n = hull_points.len();
    for i in 0..n {
        let a = hull_points[i];
        let b = hull_points[(i + 1) % n];
        let edge = b.sub(a);
        if edge.length() < 1e-12 {
            continue;
        }
        let angle = edge.y.atan2(edge.x);
        let rotation = Rotation2::new(-angle);

        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in hull_points {
            let r = rotation * NaPoint2::new(p.x, p.y);
            min_x = min_x.min(r.x);
            max_x = max_x.max(r.x);
            min_y = min_y.min(r.y);
            max_y = max_y.max(r.y);
        }

        let area = (max_x - min_x) * (max_y - min_y);
        if area < best_area {
            best_area = area;
            let inverse = Rotation2::new(angle);
            let corner = |x: f64, y: f64| -> Vec2 {
                let p = inverse * NaPoint2::new(x, y);
                Vec2::new(p.x, p.y)
            };
            best = Some([
                corner(min_x, min_y),
                corner(max_x, min_y),
                corner(max_x, max_y),
                corner(min_x, max_y),
            ]);
        }
    }

    // Rotate corner order so side 0->1 is the longer one
    best.map(|obb| {
        let side01 = obb[1].sub(obb[0]).length();
        let side12 = obb[2].sub(obb[1]).length();
        if side01 >= side12 {
            obb
        } else {
            [obb[1], obb[2], obb[3], obb[0]]
        }
    })
}

/// Derive center and orientation axes from the 4 OMBB corners.
pub fn obb_axes(obb: &Obb) -> ObbAxes {
    let center = Vec2::new(
        (obb[0].x + obb[1].x + obb[2].x + obb[3].x) * 0.25,
        (obb[0].y + obb[1].y + obb[2].y + obb[3].y) * 0.25,
    );
    let along_full = obb[1].sub(obb[0]);
    let across_full = obb[3].sub(obb[0]);
    ObbAxes {
        center,
        along: along_full.normalize(),
        across: across_full.normalize(),
        half_along: along_full.length() * 0.5,
        half_across: across_full.length() * 0.5,
    }
}
