// Straight skeleton over an outer ring plus holes, wavefront (SLAV) style:
// every contour vertex moves along its offset velocity, edge events collapse
// wavefront edges, split events let reflex vertices cut the wavefront in
// two. The output is one face polygon per input edge, which is exactly what
// the skeletal roof builders consume (vertex height = distance to the face's
// base edge line).
//
// Degenerate, self-intersecting or numerically hostile input returns `None`;
// it never panics. Callers are required to fall back to a flat roof.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::math::{
    dedup_ring, line_line_intersection, ray_ray_intersection, ring_is_simple, signed_area,
    signed_distance_to_line, Line, Vec2, EPSILON,
};

const MAX_CONTOUR_VERTICES: usize = 512;
const MAX_EVENTS: usize = 20_000;
const MERGE_EPS: f64 = 1e-5;

/// One face of the skeleton, grown from a single contour edge.
#[derive(Debug, Clone)]
pub struct SkeletonFace {
    /// The original contour edge (a -> b, interior on the left).
    pub edge: (Vec2, Vec2),
    /// Closed polygon: the base edge followed by skeleton arcs.
    pub contour: Vec<Vec2>,
}

impl SkeletonFace {
    /// Wavefront time of a point inside this face: perpendicular distance
    /// to the base edge line, clamped at zero.
    pub fn time_of(&self, p: Vec2) -> f64 {
        signed_distance_to_line(p, Line::through(self.edge.0, self.edge.1)).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    pub faces: Vec<SkeletonFace>,
    /// Largest wavefront time reached; the roof apex maps to this.
    pub max_time: f64,
}

struct ContourEdge {
    a: Vec2,
    b: Vec2,
    dir: Vec2,
    line: Line,
    /// Offset velocities of the edge's original endpoints; used to bound
    /// split-event candidates to the strip this edge actually sweeps.
    vel_a: Vec2,
    vel_b: Vec2,
}

struct WavefrontVertex {
    point: Vec2,
    /// Unit bisector direction the vertex travels along.
    direction: Vec2,
    /// Offset speed along `direction`; zero for ridge vertices pinched
    /// between anti-parallel fronts.
    speed: f64,
    start_time: f64,
    edge_left: usize,
    edge_right: usize,
    reflex: bool,
    active: bool,
    prev: usize,
    next: usize,
}

impl WavefrontVertex {
    fn position_at(&self, time: f64) -> Vec2 {
        self.point
            .add_scaled(self.direction, self.speed * (time - self.start_time))
    }

    fn velocity(&self) -> Vec2 {
        self.direction.scale(self.speed)
    }
}

/// Skeleton arc between two wavefront meeting points, bordering two faces.
struct Arc {
    from: Vec2,
    to: Vec2,
    faces: (usize, usize),
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Edge { va: usize, vb: usize },
    Split { v: usize, edge: usize },
}

struct Event {
    time: f64,
    point: Vec2,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time.total_cmp(&other.time)
    }
}

/// Motion of a wavefront vertex between edges with directions `d_left`
/// and `d_right` (interior on the left of both): the offset velocity
/// solving v·n_l = 1, v·n_r = 1, decomposed into unit direction + speed.
/// Anti-parallel fronts have no finite solution; those vertices become
/// ridge vertices sliding along the bisector with zero offset speed.
fn vertex_motion(d_left: Vec2, d_right: Vec2, reflex: bool) -> (Vec2, f64) {
    let n_left = d_left.perp();
    let n_right = d_right.perp();
    let det = n_left.cross(n_right);
    if det.abs() > EPSILON {
        let v = Vec2::new((n_right.y - n_left.y) / det, (n_left.x - n_right.x) / det);
        return (v.normalize(), v.length());
    }
    if n_left.dot(n_right) > 0.0 {
        // Collinear straight vertex: slides inward at unit speed
        (n_left, 1.0)
    } else {
        let mut dir = d_right.sub(d_left);
        if dir.length() < EPSILON {
            dir = d_left;
        }
        if reflex {
            dir = dir.scale(-1.0);
        }
        (dir.normalize(), 0.0)
    }
}

struct SkeletonBuilder {
    edges: Vec<ContourEdge>,
    vertices: Vec<WavefrontVertex>,
    queue: BinaryHeap<Reverse<Event>>,
    arcs: Vec<Arc>,
    max_time: f64,
}

impl SkeletonBuilder {
    fn add_ring(&mut self, ring: &[Vec2]) {
        let n = ring.len();
        let edge_base = self.edges.len();
        let vertex_base = self.vertices.len();

        // Edge i runs from ring[i] to ring[i+1]
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            let dir = b.sub(a).normalize();
            self.edges.push(ContourEdge {
                a,
                b,
                dir,
                line: Line::new(a, dir),
                vel_a: Vec2::new(0.0, 0.0),
                vel_b: Vec2::new(0.0, 0.0),
            });
        }

        // Vertex i sits between edge (i-1) and edge i
        for i in 0..n {
            let e_left = edge_base + (i + n - 1) % n;
            let e_right = edge_base + i;
            let d_left = self.edges[e_left].dir;
            let d_right = self.edges[e_right].dir;
            let reflex = d_left.cross(d_right) < -EPSILON;
            let (direction, speed) = vertex_motion(d_left, d_right, reflex);
            self.vertices.push(WavefrontVertex {
                point: ring[i],
                direction,
                speed,
                start_time: 0.0,
                edge_left: e_left,
                edge_right: e_right,
                reflex,
                active: true,
                prev: vertex_base + (i + n - 1) % n,
                next: vertex_base + (i + 1) % n,
            });
        }

        // Record endpoint velocities on the edges for split validation
        for i in 0..n {
            let va_vel = self.vertices[vertex_base + i].velocity();
            let vb_vel = self.vertices[vertex_base + (i + 1) % n].velocity();
            let edge = &mut self.edges[edge_base + i];
            edge.vel_a = va_vel;
            edge.vel_b = vb_vel;
        }
    }

    fn edge_event_candidate(&self, ia: usize, ib: usize) -> Option<Event> {
        let va = &self.vertices[ia];
        let vb = &self.vertices[ib];
        let shared = va.edge_right;
        let point = ray_ray_intersection(
            Line::new(va.point, va.direction),
            Line::new(vb.point, vb.direction),
        )?;
        if !point.is_finite() {
            return None;
        }
        let time = signed_distance_to_line(point, self.edges[shared].line);
        if time < -EPSILON || !time.is_finite() {
            return None;
        }
        Some(Event {
            time: time.max(0.0),
            point,
            kind: EventKind::Edge { va: ia, vb: ib },
        })
    }

    fn split_event_candidates(&self, iv: usize, out: &mut Vec<Event>) {
        let v = &self.vertices[iv];
        for (ei, edge) in self.edges.iter().enumerate() {
            if ei == v.edge_left || ei == v.edge_right {
                continue;
            }
            // Skip edges touching the vertex position itself
            if edge.a.distance_to(v.point) < MERGE_EPS || edge.b.distance_to(v.point) < MERGE_EPS {
                continue;
            }

            // Build the bisector between the opposite edge and the adjacent
            // edge less parallel to it, then intersect with the vertex ray.
            let d_left = self.edges[v.edge_left].dir.dot(edge.dir).abs();
            let d_right = self.edges[v.edge_right].dir.dot(edge.dir).abs();
            let self_edge = if d_left < d_right {
                v.edge_left
            } else {
                v.edge_right
            };
            let seam = match line_line_intersection(self.edges[self_edge].line, edge.line) {
                Some(p) => p,
                None => continue,
            };
            if seam.distance_to(v.point) < MERGE_EPS {
                continue;
            }
            let toward_vertex = v.point.sub(seam).normalize();
            let mut edge_dir = edge.dir;
            if toward_vertex.dot(edge_dir) < 0.0 {
                edge_dir = edge_dir.scale(-1.0);
            }
            let bisector = edge_dir.add(toward_vertex);
            if bisector.length() < EPSILON {
                continue;
            }
            let candidate = match ray_ray_intersection(
                Line::new(seam, bisector.normalize()),
                Line::new(v.point, v.direction),
            ) {
                Some(p) => p,
                None => continue,
            };
            let time = signed_distance_to_line(candidate, edge.line);
            if time < EPSILON || !time.is_finite() || !candidate.is_finite() {
                continue;
            }

            // The candidate must fall inside the strip this edge sweeps:
            // between the offset positions of its original endpoints.
            let s = candidate.sub(edge.a).dot(edge.dir);
            let s_lo = edge.a.add_scaled(edge.vel_a, time).sub(edge.a).dot(edge.dir);
            let s_hi = edge.b.add_scaled(edge.vel_b, time).sub(edge.a).dot(edge.dir);
            if s < s_lo - MERGE_EPS || s > s_hi + MERGE_EPS {
                continue;
            }

            out.push(Event {
                time,
                point: candidate,
                kind: EventKind::Split { v: iv, edge: ei },
            });
        }
    }

    fn schedule_vertex(&mut self, iv: usize) {
        let mut candidates: Vec<Event> = Vec::new();
        let next = self.vertices[iv].next;
        let prev = self.vertices[iv].prev;
        if let Some(e) = self.edge_event_candidate(iv, next) {
            candidates.push(e);
        }
        if let Some(e) = self.edge_event_candidate(prev, iv) {
            candidates.push(e);
        }
        if self.vertices[iv].reflex {
            self.split_event_candidates(iv, &mut candidates);
        }
        // Keep only the earliest candidate per vertex; stale entries are
        // filtered at pop time via the active flags.
        if let Some(best) = candidates
            .into_iter()
            .min_by(|a, b| a.time.total_cmp(&b.time))
        {
            self.queue.push(Reverse(best));
        }
    }

    fn emit_arc(&mut self, from: Vec2, to: Vec2, faces: (usize, usize), time: f64) {
        self.max_time = self.max_time.max(time);
        if from.distance_to(to) < MERGE_EPS {
            return;
        }
        self.arcs.push(Arc { from, to, faces });
    }

    fn loop_len(&self, start: usize) -> usize {
        let mut count = 1;
        let mut cur = self.vertices[start].next;
        while cur != start && count <= self.vertices.len() {
            count += 1;
            cur = self.vertices[cur].next;
        }
        count
    }

    /// A two-vertex loop is a finished ridge: connect the two points.
    fn try_close_ridge(&mut self, start: usize, time: f64) -> bool {
        if self.loop_len(start) != 2 {
            return false;
        }
        let other = self.vertices[start].next;
        let (pa, pb) = (self.vertices[start].point, self.vertices[other].point);
        let faces = (
            self.vertices[start].edge_left,
            self.vertices[start].edge_right,
        );
        self.emit_arc(pa, pb, faces, time);
        self.vertices[start].active = false;
        self.vertices[other].active = false;
        true
    }

    fn handle_edge_event(&mut self, point: Vec2, time: f64, ia: usize, ib: usize) {
        // Peak: the loop is a triangle and all three vertices meet at once
        if self.vertices[ia].prev == self.vertices[ib].next {
            let ic = self.vertices[ia].prev;
            for &i in &[ia, ib, ic] {
                let v = &self.vertices[i];
                let (p, faces) = (v.point, (v.edge_left, v.edge_right));
                self.emit_arc(p, point, faces, time);
                self.vertices[i].active = false;
            }
            return;
        }

        let (e_left, e_right) = (self.vertices[ia].edge_left, self.vertices[ib].edge_right);
        for &i in &[ia, ib] {
            let v = &self.vertices[i];
            let (p, faces) = (v.point, (v.edge_left, v.edge_right));
            self.emit_arc(p, point, faces, time);
            self.vertices[i].active = false;
        }

        let d_left = self.edges[e_left].dir;
        let d_right = self.edges[e_right].dir;
        let reflex = d_left.cross(d_right) < -EPSILON;
        let (direction, speed) = vertex_motion(d_left, d_right, reflex);
        let prev = self.vertices[ia].prev;
        let next = self.vertices[ib].next;
        let new_index = self.vertices.len();
        self.vertices.push(WavefrontVertex {
            point,
            direction,
            speed,
            start_time: time,
            edge_left: e_left,
            edge_right: e_right,
            reflex,
            active: true,
            prev,
            next,
        });
        self.vertices[prev].next = new_index;
        self.vertices[next].prev = new_index;

        if !self.try_close_ridge(new_index, time) {
            self.schedule_vertex(new_index);
        }
    }

    fn handle_split_event(&mut self, point: Vec2, time: f64, iv: usize, edge: usize) -> bool {
        // Locate the wavefront segment of `edge` the split point lands on
        let mut found: Option<(usize, usize)> = None;
        for (xi, x) in self.vertices.iter().enumerate() {
            if !x.active || x.edge_right != edge {
                continue;
            }
            let y = x.next;
            if !self.vertices[y].active || self.vertices[y].edge_left != edge {
                continue;
            }
            if xi == iv || y == iv {
                continue;
            }
            let dir = self.edges[edge].dir;
            let s = point.sub(self.edges[edge].a).dot(dir);
            let s_lo = x.position_at(time).sub(self.edges[edge].a).dot(dir);
            let s_hi = self.vertices[y]
                .position_at(time)
                .sub(self.edges[edge].a)
                .dot(dir);
            if s >= s_lo - MERGE_EPS && s <= s_hi + MERGE_EPS {
                found = Some((xi, y));
                break;
            }
        }
        let (x, y) = match found {
            Some(pair) => pair,
            // The opposite edge's wavefront is gone; the event is stale
            None => return true,
        };

        let (v_point, v_edge_left, v_edge_right, v_prev, v_next) = {
            let v = &self.vertices[iv];
            (v.point, v.edge_left, v.edge_right, v.prev, v.next)
        };
        self.emit_arc(v_point, point, (v_edge_left, v_edge_right), time);
        self.vertices[iv].active = false;

        // Loop 1: ... v_prev -> V1 -> y ...   (between edge_left and edge)
        // Loop 2: ... x -> V2 -> v_next ...   (between edge and edge_right)
        let make_vertex = |builder: &mut Self, e_left: usize, e_right: usize, prev: usize, next: usize| {
            let d_left = builder.edges[e_left].dir;
            let d_right = builder.edges[e_right].dir;
            let reflex = d_left.cross(d_right) < -EPSILON;
            let (direction, speed) = vertex_motion(d_left, d_right, reflex);
            let idx = builder.vertices.len();
            builder.vertices.push(WavefrontVertex {
                point,
                direction,
                speed,
                start_time: time,
                edge_left: e_left,
                edge_right: e_right,
                reflex,
                active: true,
                prev,
                next,
            });
            builder.vertices[prev].next = idx;
            builder.vertices[next].prev = idx;
            idx
        };

        let v1 = make_vertex(self, v_edge_left, edge, v_prev, y);
        let v2 = make_vertex(self, edge, v_edge_right, x, v_next);

        for idx in [v1, v2] {
            if !self.try_close_ridge(idx, time) {
                self.schedule_vertex(idx);
            }
        }
        true
    }

    fn run(mut self) -> Option<Skeleton> {
        let initial: Vec<usize> = (0..self.vertices.len()).collect();
        for iv in initial {
            self.schedule_vertex(iv);
        }

        let mut processed = 0usize;
        while let Some(Reverse(event)) = self.queue.pop() {
            processed += 1;
            if processed > MAX_EVENTS {
                return None;
            }
            if !event.point.is_finite() || !event.time.is_finite() {
                return None;
            }
            match event.kind {
                EventKind::Edge { va, vb } => {
                    if !self.vertices[va].active || !self.vertices[vb].active {
                        // Stale; reschedule survivors so their next event
                        // still fires
                        if self.vertices[va].active {
                            self.schedule_vertex(va);
                        }
                        if self.vertices[vb].active {
                            self.schedule_vertex(vb);
                        }
                        continue;
                    }
                    if self.vertices[va].next != vb {
                        self.schedule_vertex(va);
                        continue;
                    }
                    self.handle_edge_event(event.point, event.time, va, vb);
                }
                EventKind::Split { v, edge } => {
                    if !self.vertices[v].active {
                        continue;
                    }
                    if !self.handle_split_event(event.point, event.time, v, edge) {
                        return None;
                    }
                }
            }
        }

        if self.vertices.iter().any(|v| v.active) {
            // The wavefront never fully collapsed: unsupported geometry
            return None;
        }

        self.stitch_faces()
    }

    fn stitch_faces(self) -> Option<Skeleton> {
        let mut faces = Vec::with_capacity(self.edges.len());
        for (ei, edge) in self.edges.iter().enumerate() {
            let mut segments: Vec<(Vec2, Vec2)> = self
                .arcs
                .iter()
                .filter(|arc| arc.faces.0 == ei || arc.faces.1 == ei)
                .map(|arc| (arc.from, arc.to))
                .collect();

            let mut contour = vec![edge.a, edge.b];
            let mut guard = 0;
            loop {
                guard += 1;
                if guard > segments.len() + 4 {
                    return None;
                }
                let current = *contour.last().unwrap();
                if current.distance_to(edge.a) < MERGE_EPS && contour.len() > 2 {
                    contour.pop();
                    break;
                }
                let position = segments.iter().position(|(a, b)| {
                    a.distance_to(current) < MERGE_EPS || b.distance_to(current) < MERGE_EPS
                });
                let idx = match position {
                    Some(idx) => idx,
                    None => return None,
                };
                let (a, b) = segments.swap_remove(idx);
                let other = if a.distance_to(current) < MERGE_EPS { b } else { a };
                if other.distance_to(edge.a) < MERGE_EPS {
                    break;
                }
                contour.push(other);
            }

            dedup_ring(&mut contour);
            if contour.len() < 3 {
                return None;
            }
            faces.push(SkeletonFace {
                edge: (edge.a, edge.b),
                contour,
            });
        }

        if self.max_time <= EPSILON {
            return None;
        }
        Some(Skeleton {
            faces,
            max_time: self.max_time,
        })
    }
}

/// Build the straight skeleton of `outer` (any winding) with optional
/// holes. Returns `None` for degenerate or self-intersecting input and for
/// anything the wavefront propagation cannot finish cleanly.
pub fn build_skeleton(outer: &[Vec2], holes: &[Vec<Vec2>]) -> Option<Skeleton> {
    let mut outer: Vec<Vec2> = outer.to_vec();
    dedup_ring(&mut outer);
    if outer.len() < 3 {
        return None;
    }
    // Interior must be on the left of every edge: outer CCW, holes CW
    if signed_area(&outer) < 0.0 {
        outer.reverse();
    }
    if !ring_is_simple(&outer) {
        return None;
    }

    let mut clean_holes: Vec<Vec<Vec2>> = Vec::with_capacity(holes.len());
    for hole in holes {
        let mut h = hole.clone();
        dedup_ring(&mut h);
        if h.len() < 3 {
            continue;
        }
        if signed_area(&h) > 0.0 {
            h.reverse();
        }
        if !ring_is_simple(&h) {
            return None;
        }
        clean_holes.push(h);
    }

    let total = outer.len() + clean_holes.iter().map(|h| h.len()).sum::<usize>();
    if total > MAX_CONTOUR_VERTICES {
        return None;
    }

    let mut builder = SkeletonBuilder {
        edges: Vec::with_capacity(total),
        vertices: Vec::with_capacity(total * 2),
        queue: BinaryHeap::new(),
        arcs: Vec::new(),
        max_time: 0.0,
    };
    builder.add_ring(&outer);
    for hole in &clean_holes {
        builder.add_ring(hole);
    }
    builder.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(size, 0.0),
            Vec2::new(size, size),
            Vec2::new(0.0, size),
        ]
    }

    #[test]
    fn square_skeleton_is_four_corner_triangles() {
        let skeleton = build_skeleton(&square(10.0), &[]).expect("square must skeletonize");
        assert_eq!(skeleton.faces.len(), 4);
        assert!((skeleton.max_time - 5.0).abs() < 1e-6);
        for face in &skeleton.faces {
            assert_eq!(face.contour.len(), 3);
            // The apex of each face is the center
            let apex = face
                .contour
                .iter()
                .cloned()
                .max_by(|a, b| face.time_of(*a).total_cmp(&face.time_of(*b)))
                .unwrap();
            assert!(apex.distance_to(Vec2::new(5.0, 5.0)) < 1e-5);
        }
    }

    #[test]
    fn rectangle_skeleton_has_a_ridge() {
        let rect = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(0.0, 10.0),
        ];
        let skeleton = build_skeleton(&rect, &[]).expect("rectangle must skeletonize");
        assert_eq!(skeleton.faces.len(), 4);
        assert!((skeleton.max_time - 5.0).abs() < 1e-6);
        // Long edges grow trapezoids (4 vertices), short edges triangles
        let mut triangles = 0;
        let mut quads = 0;
        for face in &skeleton.faces {
            match face.contour.len() {
                3 => triangles += 1,
                4 => quads += 1,
                other => panic!("unexpected face vertex count {}", other),
            }
        }
        assert_eq!(triangles, 2);
        assert_eq!(quads, 2);
    }

    #[test]
    fn winding_is_normalized() {
        let mut ring = square(10.0);
        ring.reverse();
        assert!(build_skeleton(&ring, &[]).is_some());
    }

    #[test]
    fn self_intersecting_ring_yields_none() {
        let bowtie = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(0.0, 10.0),
        ];
        assert!(build_skeleton(&bowtie, &[]).is_none());
    }

    #[test]
    fn degenerate_input_yields_none() {
        let line = vec![Vec2::new(0.0, 0.0), Vec2::new(5.0, 0.0)];
        assert!(build_skeleton(&line, &[]).is_none());
        let dot = vec![
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 1.0),
        ];
        assert!(build_skeleton(&dot, &[]).is_none());
    }
}
