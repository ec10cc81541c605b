// Ring-set abstraction over the geometry kernel. Rings are collected in a
// mutable builder and frozen into an immutable `Multipolygon`; every derived
// value (triangulated footprint, straight skeleton, OMBB, pole of
// inaccessibility, area) is computed lazily and memoized behind `OnceCell`,
// so a cached read can never be invalidated by later mutation.
use std::cell::OnceCell;

use geo::{Area, Contains, EuclideanDistance};
use geo_types::{Coord, LineString, Point, Polygon};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::math::{signed_area, Vec2};
use crate::ombb::{compute_ombb, Obb};
use crate::skeleton::{build_skeleton, Skeleton};
use crate::triangulate::{cap_from_triangulation, MeshBuffers};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingRole {
    Outer,
    Inner,
}

/// Closed ring: `nodes.first() == nodes.last()` always holds after
/// construction through the builder.
#[derive(Clone, Debug)]
pub struct Ring {
    pub nodes: Vec<Vec2>,
    pub role: RingRole,
}

impl Ring {
    /// Ring vertices without the closing duplicate.
    pub fn open_nodes(&self) -> &[Vec2] {
        if self.nodes.len() > 1 {
            &self.nodes[..self.nodes.len() - 1]
        } else {
            &self.nodes
        }
    }
}

/// One outer ring with the holes that follow it in traversal order.
#[derive(Clone, Debug)]
struct PolygonGroup {
    outer: usize,
    holes: Vec<usize>,
}

/// Mutable first phase: collect rings, repair topology, then `finalize`.
#[derive(Default)]
pub struct RingSetBuilder {
    rings: Vec<Ring>,
}

impl RingSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ring; open input is closed, winding is normalized (outer CCW,
    /// inner CW) by signed-area check.
    pub fn add_ring(&mut self, mut nodes: Vec<Vec2>, role: RingRole) -> &mut Self {
        if nodes.is_empty() {
            return self;
        }
        if nodes.len() > 1 {
            let closes = nodes[0].distance_to(*nodes.last().unwrap()) < 1e-9;
            if !closes {
                nodes.push(nodes[0]);
            }
        } else {
            let first = nodes[0];
            nodes.push(first);
        }

        let area = signed_area(&nodes[..nodes.len() - 1]);
        let want_ccw = role == RingRole::Outer;
        if (area > 0.0) != want_ccw && area != 0.0 {
            nodes.reverse();
        }
        self.rings.push(Ring { nodes, role });
        self
    }

    /// Freeze into an immutable multipolygon. A hole arriving before any
    /// outer ring is a topology violation; it is logged and reinterpreted
    /// as an outer ring instead of aborting the feature.
    pub fn finalize(self) -> Multipolygon {
        let mut rings = self.rings;
        let mut groups: Vec<PolygonGroup> = Vec::new();

        for i in 0..rings.len() {
            match rings[i].role {
                RingRole::Outer => groups.push(PolygonGroup {
                    outer: i,
                    holes: Vec::new(),
                }),
                RingRole::Inner => {
                    if let Some(group) = groups.last_mut() {
                        group.holes.push(i);
                    } else {
                        log::warn!("inner ring before any outer ring; treating it as an outer");
                        rings[i].role = RingRole::Outer;
                        rings[i].nodes.reverse();
                        groups.push(PolygonGroup {
                            outer: i,
                            holes: Vec::new(),
                        });
                    }
                }
            }
        }

        Multipolygon {
            rings,
            groups,
            triangulations: OnceCell::new(),
            skeleton: OnceCell::new(),
            ombb: OnceCell::new(),
            pole: OnceCell::new(),
            area: OnceCell::new(),
            geo_polygons: OnceCell::new(),
        }
    }
}

/// Immutable ring set with memoized derived geometry.
pub struct Multipolygon {
    rings: Vec<Ring>,
    groups: Vec<PolygonGroup>,
    triangulations: OnceCell<Vec<(Vec<Vec2>, Vec<usize>)>>,
    skeleton: OnceCell<Option<Skeleton>>,
    ombb: OnceCell<Option<Obb>>,
    pole: OnceCell<Option<(Vec2, f64)>>,
    area: OnceCell<f64>,
    geo_polygons: OnceCell<Vec<Polygon<f64>>>,
}

impl Multipolygon {
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Outer ring of the largest polygon group (open form), with its holes.
    /// Roof construction operates on this group.
    pub fn primary_rings(&self) -> Option<(&[Vec2], Vec<&[Vec2]>)> {
        let group = self.primary_group()?;
        let outer = self.rings[group.outer].open_nodes();
        let holes: Vec<&[Vec2]> = group
            .holes
            .iter()
            .map(|&h| self.rings[h].open_nodes())
            .collect();
        Some((outer, holes))
    }

    fn primary_group(&self) -> Option<&PolygonGroup> {
        self.groups.iter().max_by(|a, b| {
            let area_a = signed_area(self.rings[a.outer].open_nodes()).abs();
            let area_b = signed_area(self.rings[b.outer].open_nodes()).abs();
            area_a.total_cmp(&area_b)
        })
    }

    fn triangulations(&self) -> &Vec<(Vec<Vec2>, Vec<usize>)> {
        self.triangulations.get_or_init(|| {
            self.groups
                .iter()
                .map(|group| {
                    let outer = self.rings[group.outer].open_nodes().to_vec();
                    let holes: Vec<Vec<Vec2>> = group
                        .holes
                        .iter()
                        .map(|&h| self.rings[h].open_nodes().to_vec())
                        .collect();
                    crate::triangulate::triangulate_with_holes(&outer, &holes)
                })
                .collect()
        })
    }

    fn geo_polygons(&self) -> &Vec<Polygon<f64>> {
        self.geo_polygons.get_or_init(|| {
            self.groups
                .iter()
                .map(|group| {
                    let to_linestring = |nodes: &[Vec2]| -> LineString<f64> {
                        nodes
                            .iter()
                            .map(|p| Coord { x: p.x, y: p.y })
                            .collect::<Vec<_>>()
                            .into()
                    };
                    let exterior = to_linestring(&self.rings[group.outer].nodes);
                    let interiors: Vec<LineString<f64>> = group
                        .holes
                        .iter()
                        .map(|&h| to_linestring(&self.rings[h].nodes))
                        .collect();
                    Polygon::new(exterior, interiors)
                })
                .collect()
        })
    }

    /// Triangulated cap over the whole ring set at a constant height,
    /// built from the memoized triangulation. `flip` produces underside
    /// geometry (reversed winding, normals down).
    pub fn footprint(&self, height: f64, flip: bool) -> MeshBuffers {
        let mut mesh = MeshBuffers::new();
        for (flat, indices) in self.triangulations().iter() {
            cap_from_triangulation(flat, indices, |_| height, |p| [p.x, p.y], flip, &mut mesh);
        }
        mesh
    }

    /// Straight skeleton of the primary polygon group; `None` when the
    /// geometry does not support one.
    pub fn straight_skeleton(&self) -> Option<&Skeleton> {
        self.skeleton
            .get_or_init(|| {
                let (outer, holes) = self.primary_rings()?;
                let holes: Vec<Vec<Vec2>> = holes.iter().map(|h| h.to_vec()).collect();
                build_skeleton(outer, &holes)
            })
            .as_ref()
    }

    /// Oriented minimum bounding box over all outer-ring vertices.
    /// Memoized: repeated calls return the same reference.
    pub fn ombb(&self) -> Option<&Obb> {
        self.ombb
            .get_or_init(|| {
                let points: Vec<Vec2> = self
                    .groups
                    .iter()
                    .flat_map(|g| self.rings[g.outer].open_nodes().iter().copied())
                    .collect();
                compute_ombb(&points)
            })
            .as_ref()
    }

    /// Pole of inaccessibility of the primary group: the interior point
    /// farthest from the boundary, with that distance. Iterative grid
    /// refinement over the bounding box.
    pub fn pole_of_inaccessibility(&self) -> Option<(Vec2, f64)> {
        *self.pole.get_or_init(|| {
            let group_index = {
                let group = self.primary_group()?;
                self.groups
                    .iter()
                    .position(|g| std::ptr::eq(g, group))
                    .unwrap_or(0)
            };
            let polygon = self.geo_polygons().get(group_index)?;
            let outer = self.rings[self.groups[group_index].outer].open_nodes();

            let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
            let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for p in outer {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }

            let boundary_distance = |p: Vec2| -> f64 {
                let point = Point::new(p.x, p.y);
                if !polygon.contains(&point) {
                    return f64::NEG_INFINITY;
                }
                let mut dist = point.euclidean_distance(polygon.exterior());
                for interior in polygon.interiors() {
                    dist = dist.min(point.euclidean_distance(interior));
                }
                dist
            };

            let mut center = Vec2::new((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);
            let mut best = (center, boundary_distance(center));
            let mut window_x = (max_x - min_x) * 0.5;
            let mut window_y = (max_y - min_y) * 0.5;

            const STEPS: i32 = 4;
            for _ in 0..6 {
                for iy in -STEPS..=STEPS {
                    for ix in -STEPS..=STEPS {
                        let candidate = Vec2::new(
                            center.x + window_x * ix as f64 / STEPS as f64,
                            center.y + window_y * iy as f64 / STEPS as f64,
                        );
                        let d = boundary_distance(candidate);
                        if d > best.1 {
                            best = (candidate, d);
                        }
                    }
                }
                center = best.0;
                window_x *= 0.5;
                window_y *= 0.5;
            }

            if best.1.is_finite() && best.1 > 0.0 {
                Some(best)
            } else {
                None
            }
        })
    }

    /// Total unsigned area (outer areas minus holes).
    pub fn area(&self) -> f64 {
        *self
            .area
            .get_or_init(|| self.geo_polygons().iter().map(|p| p.unsigned_area()).sum())
    }

    /// Whether the point lies inside any polygon group (holes excluded).
    pub fn contains(&self, p: Vec2) -> bool {
        let point = Point::new(p.x, p.y);
        self.geo_polygons().iter().any(|poly| poly.contains(&point))
    }

    /// Deterministic seeded rejection sampling inside the multipolygon,
    /// respecting hole exclusion and a minimum spacing between points.
    /// Used for vegetation placement; the same seed and rings always
    /// reproduce the same point set.
    pub fn populate_with_points(&self, spacing: f64, density: f64, seed: u64) -> Vec<Vec2> {
        let area = self.area();
        if area <= 0.0 || density <= 0.0 || spacing <= 0.0 {
            return Vec::new();
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for group in &self.groups {
            for p in self.rings[group.outer].open_nodes() {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
        }
        if !(min_x.is_finite() && min_y.is_finite()) {
            return Vec::new();
        }

        let target = ((area * density).round() as usize).min(4096);
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut points: Vec<Vec2> = Vec::with_capacity(target);

        // Spatial hash keyed by spacing-sized cells keeps the min-distance
        // check O(1) per sample
        let cell = spacing;
        let key = |p: Vec2| -> (i64, i64) { ((p.x / cell).floor() as i64, (p.y / cell).floor() as i64) };
        let mut grid: std::collections::HashMap<(i64, i64), Vec<Vec2>> =
            std::collections::HashMap::new();

        let mut attempts = 0usize;
        let max_attempts = target.saturating_mul(12).max(64);
        while points.len() < target && attempts < max_attempts {
            attempts += 1;
            let candidate = Vec2::new(
                rng.gen_range(min_x..=max_x),
                rng.gen_range(min_y..=max_y),
            );
            if !self.contains(candidate) {
                continue;
            }
            let (kx, ky) = key(candidate);
            let mut too_close = false;
            'neighbors: for dy in -1..=1 {
                for dx in -1..=1 {
                    if let Some(bucket) = grid.get(&(kx + dx, ky + dy)) {
                        if bucket.iter().any(|p| p.distance_to(candidate) < spacing) {
                            too_close = true;
                            break 'neighbors;
                        }
                    }
                }
            }
            if too_close {
                continue;
            }
            grid.entry((kx, ky)).or_default().push(candidate);
            points.push(candidate);
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_ring(size: f64) -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(size, 0.0),
            Vec2::new(size, size),
            Vec2::new(0.0, size),
        ]
    }

    fn square_multipolygon(size: f64) -> Multipolygon {
        let mut builder = RingSetBuilder::new();
        builder.add_ring(square_ring(size), RingRole::Outer);
        builder.finalize()
    }

    #[test]
    fn rings_are_closed_after_construction() {
        let mp = square_multipolygon(10.0);
        for ring in mp.rings() {
            assert_eq!(ring.nodes.first(), ring.nodes.last());
        }
    }

    #[test]
    fn winding_is_normalized_per_role() {
        let mut builder = RingSetBuilder::new();
        let mut reversed = square_ring(10.0);
        reversed.reverse();
        builder.add_ring(reversed, RingRole::Outer);
        let mut hole = square_ring(2.0);
        hole.iter_mut().for_each(|p| {
            p.x += 4.0;
            p.y += 4.0;
        });
        builder.add_ring(hole, RingRole::Inner);
        let mp = builder.finalize();
        assert!(signed_area(mp.rings()[0].open_nodes()) > 0.0);
        assert!(signed_area(mp.rings()[1].open_nodes()) < 0.0);
    }

    #[test]
    fn hole_before_outer_is_repaired_to_outer() {
        let mut builder = RingSetBuilder::new();
        builder.add_ring(square_ring(5.0), RingRole::Inner);
        let mp = builder.finalize();
        assert!(!mp.is_empty());
        assert!((mp.area() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn ombb_is_reference_stable_and_bounds_area() {
        let mp = square_multipolygon(10.0);
        let first = mp.ombb().expect("square has an OMBB") as *const Obb;
        let second = mp.ombb().unwrap() as *const Obb;
        assert!(std::ptr::eq(first, second));

        let obb = mp.ombb().unwrap();
        let rect_area = signed_area(&obb.to_vec()).abs();
        assert!(rect_area + 1e-9 >= mp.area());
        // Proper quadrilateral: no zero-length side
        for i in 0..4 {
            assert!(obb[i].distance_to(obb[(i + 1) % 4]) > 1e-9);
        }
    }

    #[test]
    fn pole_of_square_is_the_center() {
        let mp = square_multipolygon(10.0);
        let (pole, dist) = mp.pole_of_inaccessibility().unwrap();
        assert!(pole.distance_to(Vec2::new(5.0, 5.0)) < 0.5);
        assert!((dist - 5.0).abs() < 0.5);
    }

    #[test]
    fn populate_is_deterministic_and_respects_spacing() {
        let mp = square_multipolygon(50.0);
        let a = mp.populate_with_points(3.0, 0.05, 42);
        let b = mp.populate_with_points(3.0, 0.05, 42);
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert!(pa.distance_to(*pb) < 1e-12);
        }
        assert!(!a.is_empty());
        for (i, p) in a.iter().enumerate() {
            assert!(mp.contains(*p));
            for q in &a[i + 1..] {
                assert!(p.distance_to(*q) >= 3.0 - 1e-9);
            }
        }
        let c = mp.populate_with_points(3.0, 0.05, 43);
        // Different seed should move at least one point
        let same = a.len() == c.len()
            && a.iter().zip(c.iter()).all(|(p, q)| p.distance_to(*q) < 1e-12);
        assert!(!same);
    }

    #[test]
    fn populate_excludes_holes() {
        let mut builder = RingSetBuilder::new();
        builder.add_ring(square_ring(30.0), RingRole::Outer);
        let hole: Vec<Vec2> = square_ring(10.0)
            .into_iter()
            .map(|p| Vec2::new(p.x + 10.0, p.y + 10.0))
            .collect();
        builder.add_ring(hole, RingRole::Inner);
        let mp = builder.finalize();
        let points = mp.populate_with_points(2.0, 0.05, 7);
        for p in &points {
            let in_hole = p.x > 10.0 && p.x < 20.0 && p.y > 10.0 && p.y < 20.0;
            assert!(!in_hole, "sampled point {:?} inside a hole", p);
        }
    }

    #[test]
    fn square_skeleton_is_cached_and_present() {
        let mp = square_multipolygon(10.0);
        let first = mp.straight_skeleton().expect("square skeletonizes");
        assert_eq!(first.faces.len(), 4);
        let second = mp.straight_skeleton().unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
