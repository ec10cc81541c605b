// Road adjacency graph: roads are grouped per road class, shared vertex
// positions become intersections, and intersections with three or more
// approaches synthesize a junction polygon plus per-approach trim points so
// the incoming ribbons stop at the junction edge.
//
// Queries never error: unknown groups, unknown points and out-of-range
// projections all return `None` and the caller keeps its defaults.
use std::collections::HashMap;

use crate::math::{line_line_intersection, project_point_on_segment, Line, Vec2};

/// Maximum corner distance in junction polygons, in multiples of the widest
/// participating road. Bounds spikes from near-parallel boundaries.
const CORNER_DISTANCE_LIMIT: f64 = 4.0;
/// Default search radius for nearest-path projections, meters.
const PROJECTION_RANGE: f64 = 25.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoadHandle {
    pub group: u32,
    pub index: usize,
}

#[derive(Clone, Debug)]
struct Road {
    vertices: Vec<Vec2>,
    width: f64,
}

/// One approach into an intersection: which road, which of its vertices
/// sits on the intersection, and the neighboring vertex that fixes the
/// approach direction.
#[derive(Clone, Debug)]
pub struct Direction {
    pub road: RoadHandle,
    pub vertex_index: usize,
    pub adjacent: Vec2,
    pub width: f64,
}

#[derive(Clone, Debug)]
pub struct Intersection {
    pub point: Vec2,
    pub directions: Vec<Direction>,
}

/// Synthesized junction area for an intersection with >2 directions.
#[derive(Clone, Debug)]
pub struct IntersectionPolygon {
    pub point: Vec2,
    pub polygon: Vec<Vec2>,
    /// One trim point per direction, in the same order as
    /// `Intersection::directions`.
    pub trim_points: Vec<Vec2>,
}

#[derive(Default)]
struct RoadGroup {
    roads: Vec<Road>,
    intersections: HashMap<(u64, u64), Intersection>,
}

fn position_key(p: Vec2) -> (u64, u64) {
    (p.x.to_bits(), p.y.to_bits())
}

#[derive(Default)]
pub struct RoadGraph {
    groups: HashMap<u32, RoadGroup>,
    initialized: bool,
    /// (handle, vertex_index) -> trim point, filled by
    /// `build_intersection_polygons`.
    trims: HashMap<(RoadHandle, usize), Vec2>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a road polyline in a road-class group. Must be called
    /// before `init_intersections`; later calls are ignored.
    pub fn add_road(&mut self, group: u32, vertices: Vec<Vec2>, width: f64) -> Option<RoadHandle> {
        debug_assert!(!self.initialized, "add_road after init_intersections");
        if self.initialized || vertices.len() < 2 || width <= 0.0 {
            return None;
        }
        let entry = self.groups.entry(group).or_default();
        let handle = RoadHandle {
            group,
            index: entry.roads.len(),
        };
        entry.roads.push(Road { vertices, width });
        Some(handle)
    }

    /// Single finalize pass: group vertices by exact position and create an
    /// intersection wherever at least two road vertices coincide.
    pub fn init_intersections(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        for (&group_id, group) in self.groups.iter_mut() {
            let mut by_position: HashMap<(u64, u64), Vec<(usize, usize)>> = HashMap::new();
            for (road_index, road) in group.roads.iter().enumerate() {
                for (vertex_index, vertex) in road.vertices.iter().enumerate() {
                    by_position
                        .entry(position_key(*vertex))
                        .or_default()
                        .push((road_index, vertex_index));
                }
            }

            for (key, entries) in by_position {
                if entries.len() < 2 {
                    continue;
                }
                let point = group.roads[entries[0].0].vertices[entries[0].1];
                let mut directions = Vec::new();
                for (road_index, vertex_index) in entries {
                    let road = &group.roads[road_index];
                    let handle = RoadHandle {
                        group: group_id,
                        index: road_index,
                    };
                    if vertex_index > 0 {
                        directions.push(Direction {
                            road: handle,
                            vertex_index,
                            adjacent: road.vertices[vertex_index - 1],
                            width: road.width,
                        });
                    }
                    if vertex_index + 1 < road.vertices.len() {
                        directions.push(Direction {
                            road: handle,
                            vertex_index,
                            adjacent: road.vertices[vertex_index + 1],
                            width: road.width,
                        });
                    }
                }
                if directions.len() < 2 {
                    continue;
                }
                group
                    .intersections
                    .insert(key, Intersection { point, directions });
            }
        }
        log::debug!(
            "road graph initialized: {} groups, {} intersections",
            self.groups.len(),
            self.groups.values().map(|g| g.intersections.len()).sum::<usize>()
        );
    }

    pub fn intersection_at(&self, group: u32, point: Vec2) -> Option<&Intersection> {
        self.groups
            .get(&group)?
            .intersections
            .get(&position_key(point))
    }

    /// Build junction polygons for every intersection with more than two
    /// directions, and record the per-direction trim points. Two-direction
    /// intersections are simple pass-throughs and synthesize nothing.
    pub fn build_intersection_polygons(&mut self) -> Vec<IntersectionPolygon> {
        if !self.initialized {
            return Vec::new();
        }
        let mut result = Vec::new();
        let mut trims: Vec<((RoadHandle, usize), Vec2)> = Vec::new();

        for group in self.groups.values() {
            for intersection in group.intersections.values() {
                if intersection.directions.len() <= 2 {
                    continue;
                }
                if let Some(polygon) = synthesize_polygon(intersection) {
                    for (direction, trim) in intersection
                        .directions
                        .iter()
                        .zip(polygon.trim_points.iter())
                    {
                        trims.push(((direction.road, direction.vertex_index), *trim));
                    }
                    result.push(polygon);
                }
            }
        }

        for (key, trim) in trims {
            self.trims.insert(key, trim);
        }
        result
    }

    /// Road polyline with its junction-adjacent vertices moved to the trim
    /// points recorded by `build_intersection_polygons`.
    pub fn trimmed_vertices(&self, handle: RoadHandle) -> Option<Vec<Vec2>> {
        let road = self.groups.get(&handle.group)?.roads.get(handle.index)?;
        let mut vertices = road.vertices.clone();
        for (i, v) in vertices.iter_mut().enumerate() {
            if let Some(trim) = self.trims.get(&(handle, i)) {
                *v = *trim;
            }
        }
        Some(vertices)
    }

    pub fn road_width(&self, handle: RoadHandle) -> Option<f64> {
        Some(self.groups.get(&handle.group)?.roads.get(handle.index)?.width)
    }

    /// Original (untrimmed) vertex of a road, used as the external adjacent
    /// vertex when meshing a trimmed ribbon end.
    pub fn original_vertex(&self, handle: RoadHandle, index: usize) -> Option<Vec2> {
        self.groups
            .get(&handle.group)?
            .roads
            .get(handle.index)?
            .vertices
            .get(index)
            .copied()
    }

    /// Perpendicular projection of `point` onto the nearest road segment.
    /// With `group` set, only that group is searched; otherwise all groups.
    /// Returns `None` when nothing lies within range.
    pub fn closest_projection(&self, point: Vec2, group: Option<u32>) -> Option<Vec2> {
        let mut best: Option<(f64, Vec2)> = None;
        let groups: Vec<&RoadGroup> = match group {
            Some(id) => self.groups.get(&id).into_iter().collect(),
            None => self.groups.values().collect(),
        };
        for group in groups {
            for road in &group.roads {
                for pair in road.vertices.windows(2) {
                    let (projected, _) = project_point_on_segment(point, pair[0], pair[1]);
                    let dist = projected.distance_to(point);
                    if dist <= PROJECTION_RANGE
                        && best.map_or(true, |(best_dist, _)| dist < best_dist)
                    {
                        best = Some((dist, projected));
                    }
                }
            }
        }
        best.map(|(_, p)| p)
    }
}

/// Build the junction polygon for one intersection: sort approaches by
/// angle, intersect each approach's counter-clockwise offset boundary with
/// its neighbor's clockwise one, and fall back to a projected corner when
/// the boundaries are parallel or the corner runs away.
fn synthesize_polygon(intersection: &Intersection) -> Option<IntersectionPolygon> {
    let center = intersection.point;
    let mut ordered: Vec<(f64, &Direction, Vec2)> = intersection
        .directions
        .iter()
        .filter_map(|d| {
            let dir = d.adjacent.sub(center).normalize();
            if dir.length() < 0.5 {
                return None;
            }
            Some((dir.y.atan2(dir.x), d, dir))
        })
        .collect();
    if ordered.len() < 3 {
        return None;
    }
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

    let max_width = ordered
        .iter()
        .map(|(_, d, _)| d.width)
        .fold(0.0f64, f64::max);

    let n = ordered.len();
    let mut corners: Vec<Vec2> = Vec::with_capacity(n);
    for i in 0..n {
        let (_, d_i, dir_i) = ordered[i];
        let (_, d_j, dir_j) = ordered[(i + 1) % n];

        // CCW-side boundary of approach i, CW-side boundary of approach j
        let left_i = Line::new(center.add_scaled(dir_i.perp(), d_i.width * 0.5), dir_i);
        let right_j = Line::new(center.add_scaled(dir_j.perp(), -d_j.width * 0.5), dir_j);

        let fallback = || -> Vec2 {
            let mut mid = dir_i.add(dir_j);
            if mid.length() < 1e-9 {
                mid = dir_i.perp();
            }
            center.add_scaled(mid.normalize(), (d_i.width.max(d_j.width)) * 0.5)
        };

        let corner = match line_line_intersection(left_i, right_j) {
            Some(c) if c.distance_to(center) <= CORNER_DISTANCE_LIMIT * max_width => c,
            _ => fallback(),
        };
        corners.push(corner);
    }

    if corners.len() < 3 {
        return None;
    }

    // Trim each approach where the junction boundary crosses it: the larger
    // of the two adjacent-corner projections along the approach direction
    let mut trim_points = Vec::with_capacity(intersection.directions.len());
    for direction in &intersection.directions {
        let dir = direction.adjacent.sub(center).normalize();
        let mut t_max: f64 = 0.0;
        for (i, (_, d, _)) in ordered.iter().enumerate() {
            if std::ptr::eq(*d, direction) {
                let before = corners[(i + n - 1) % n];
                let after = corners[i];
                t_max = before.sub(center).dot(dir).max(after.sub(center).dot(dir)).max(0.0);
            }
        }
        let max_trim = direction.adjacent.distance_to(center) * 0.5;
        trim_points.push(center.add_scaled(dir, t_max.min(max_trim)));
    }

    Some(IntersectionPolygon {
        point: center,
        polygon: corners,
        trim_points,
    })
}
