// Terrain grid and ground projection. The grid is an N x N cell lattice of
// corner heights over the tile square; ground-hugging geometry (roads,
// water, pitches) is cut against every covered cell triangle and re-emitted
// with the cell plane's heights, so it follows terrain curvature without
// per-vertex height queries.
use nalgebra::Matrix2;

use crate::error::PipelineError;
use crate::math::{clip_polygon_to_half_plane, Line, Vec2, Vec3};
use crate::triangulate::MeshBuffers;

/// Small lift applied to projected geometry so it does not z-fight the
/// terrain surface itself.
pub const GROUND_OFFSET: f64 = 0.08;

#[derive(Debug, Clone)]
pub struct TerrainGrid {
    origin: Vec2,
    extent: f64,
    cells: usize,
    /// Row-major (cells+1)^2 corner heights.
    heights: Vec<f64>,
}

impl TerrainGrid {
    /// Corner positions in query order, for the batched height request.
    pub fn corner_positions(origin: Vec2, extent: f64, cells: usize) -> Vec<Vec2> {
        let step = extent / cells as f64;
        let side = cells + 1;
        let mut positions = Vec::with_capacity(side * side);
        for iy in 0..side {
            for ix in 0..side {
                positions.push(Vec2::new(
                    origin.x + ix as f64 * step,
                    origin.y + iy as f64 * step,
                ));
            }
        }
        positions
    }

    pub fn from_heights(
        origin: Vec2,
        extent: f64,
        cells: usize,
        heights: Vec<f64>,
    ) -> Result<Self, PipelineError> {
        let expected = (cells + 1) * (cells + 1);
        if heights.len() != expected {
            return Err(PipelineError::HeightCountMismatch {
                expected,
                got: heights.len(),
            });
        }
        Ok(Self {
            origin,
            extent,
            cells,
            heights,
        })
    }

    pub fn flat(origin: Vec2, extent: f64, cells: usize) -> Self {
        Self {
            origin,
            extent,
            cells,
            heights: vec![0.0; (cells + 1) * (cells + 1)],
        }
    }

    fn step(&self) -> f64 {
        self.extent / self.cells as f64
    }

    fn corner_height(&self, ix: usize, iy: usize) -> f64 {
        let side = self.cells + 1;
        self.heights[iy.min(self.cells) * side + ix.min(self.cells)]
    }

    fn corner(&self, ix: usize, iy: usize) -> Vec3 {
        Vec3::new(
            self.origin.x + ix as f64 * self.step(),
            self.origin.y + iy as f64 * self.step(),
            self.corner_height(ix, iy),
        )
    }

    /// Bilinear height sample, clamped to the grid bounds.
    pub fn height_at(&self, p: Vec2) -> f64 {
        let step = self.step();
        let fx = ((p.x - self.origin.x) / step).clamp(0.0, self.cells as f64 - 1e-9);
        let fy = ((p.y - self.origin.y) / step).clamp(0.0, self.cells as f64 - 1e-9);
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.cells);
        let y1 = (y0 + 1).min(self.cells);
        let dx = fx - x0 as f64;
        let dy = fy - y0 as f64;

        let v00 = self.corner_height(x0, y0);
        let v10 = self.corner_height(x1, y0);
        let v01 = self.corner_height(x0, y1);
        let v11 = self.corner_height(x1, y1);

        let v0 = v00 * (1.0 - dx) + v10 * dx;
        let v1 = v01 * (1.0 - dx) + v11 * dx;
        v0 * (1.0 - dy) + v1 * dy
    }

    /// Cell index range covered by a 2D bounding box, clamped to the grid.
    fn covered_cells(&self, min: Vec2, max: Vec2) -> (usize, usize, usize, usize) {
        let step = self.step();
        let clamp_cell = |v: f64| -> usize {
            (v.floor().max(0.0) as usize).min(self.cells.saturating_sub(1))
        };
        (
            clamp_cell((min.x - self.origin.x) / step),
            clamp_cell((min.y - self.origin.y) / step),
            clamp_cell((max.x - self.origin.x) / step),
            clamp_cell((max.y - self.origin.y) / step),
        )
    }
}

fn barycentric(tri: &[Vec2; 3], p: Vec2) -> Option<[f64; 3]> {
    let m = Matrix2::new(
        tri[1].x - tri[0].x,
        tri[2].x - tri[0].x,
        tri[1].y - tri[0].y,
        tri[2].y - tri[0].y,
    );
    let inv = m.try_inverse()?;
    let rhs = nalgebra::Vector2::new(p.x - tri[0].x, p.y - tri[0].y);
    let uv = inv * rhs;
    Some([1.0 - uv.x - uv.y, uv.x, uv.y])
}

/// Project one triangle (with per-vertex uvs) onto the grid surface. Every
/// covered cell contributes the clipped overlap with both of its surface
/// triangles; attributes are carried via barycentric coordinates of the
/// original triangle.
pub fn project_triangle(
    grid: &TerrainGrid,
    tri: [Vec2; 3],
    uvs: [[f64; 2]; 3],
    out: &mut MeshBuffers,
) {
    let min = Vec2::new(
        tri[0].x.min(tri[1].x).min(tri[2].x),
        tri[0].y.min(tri[1].y).min(tri[2].y),
    );
    let max = Vec2::new(
        tri[0].x.max(tri[1].x).max(tri[2].x),
        tri[0].y.max(tri[1].y).max(tri[2].y),
    );
    let (x0, y0, x1, y1) = grid.covered_cells(min, max);

    for cy in y0..=y1 {
        for cx in x0..=x1 {
            let c00 = grid.corner(cx, cy);
            let c10 = grid.corner(cx + 1, cy);
            let c01 = grid.corner(cx, cy + 1);
            let c11 = grid.corner(cx + 1, cy + 1);
            // The two surface triangles of this cell, counter-clockwise
            let cell_triangles = [[c00, c10, c11], [c00, c11, c01]];

            for cell_tri in &cell_triangles {
                let cell_2d = [
                    Vec2::new(cell_tri[0].x, cell_tri[0].y),
                    Vec2::new(cell_tri[1].x, cell_tri[1].y),
                    Vec2::new(cell_tri[2].x, cell_tri[2].y),
                ];
                // Clip the input triangle against the cell triangle's
                // three half-planes
                let mut polygon: Vec<Vec2> = tri.to_vec();
                for k in 0..3 {
                    let a = cell_2d[k];
                    let b = cell_2d[(k + 1) % 3];
                    polygon =
                        clip_polygon_to_half_plane(&polygon, Line::new(a, b.sub(a).normalize()));
                    if polygon.is_empty() {
                        break;
                    }
                }
                if polygon.len() < 3 {
                    continue;
                }

                // Fan-triangulate the convex overlap; heights come from the
                // cell plane, uvs from the source triangle
                let lift = |p: Vec2| -> Option<(Vec3, [f64; 2])> {
                    let cell_bary = barycentric(&cell_2d, p)?;
                    let z = cell_bary[0] * cell_tri[0].z
                        + cell_bary[1] * cell_tri[1].z
                        + cell_bary[2] * cell_tri[2].z;
                    let src_bary = barycentric(&tri, p)?;
                    let uv = [
                        src_bary[0] * uvs[0][0] + src_bary[1] * uvs[1][0] + src_bary[2] * uvs[2][0],
                        src_bary[0] * uvs[0][1] + src_bary[1] * uvs[1][1] + src_bary[2] * uvs[2][1],
                    ];
                    Some((Vec3::new(p.x, p.y, z + GROUND_OFFSET), uv))
                };

                let anchor = match lift(polygon[0]) {
                    Some(a) => a,
                    None => continue,
                };
                for w in polygon[1..].windows(2) {
                    let (pa, pb) = (lift(w[0]), lift(w[1]));
                    if let (Some(pa), Some(pb)) = (pa, pb) {
                        out.push_triangle([anchor.0, pa.0, pb.0], [anchor.1, pa.1, pb.1]);
                    }
                }
            }
        }
    }
}

/// Project a whole flat (z = 0) triangle soup onto the grid surface.
pub fn project_mesh(grid: &TerrainGrid, mesh: &MeshBuffers) -> MeshBuffers {
    let mut out = MeshBuffers::new();
    for (tri, uv) in mesh
        .positions
        .chunks_exact(9)
        .zip(mesh.uvs.chunks_exact(6))
    {
        let t = [
            Vec2::new(tri[0] as f64, tri[1] as f64),
            Vec2::new(tri[3] as f64, tri[4] as f64),
            Vec2::new(tri[6] as f64, tri[7] as f64),
        ];
        let uvs = [
            [uv[0] as f64, uv[1] as f64],
            [uv[2] as f64, uv[3] as f64],
            [uv[4] as f64, uv[5] as f64],
        ];
        project_triangle(grid, t, uvs, &mut out);
    }
    out
}

/// Project a polyline onto the grid: inserts a sample at every grid-line
/// crossing so the result follows the surface.
pub fn project_polyline(grid: &TerrainGrid, vertices: &[Vec2]) -> Vec<Vec3> {
    let mut result: Vec<Vec3> = Vec::new();
    let step = grid.step();
    for pair in vertices.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let mut ts: Vec<f64> = vec![0.0, 1.0];
        // Crossings with vertical and horizontal grid lines
        for (da, db, origin) in [(a.x, b.x, grid.origin.x), (a.y, b.y, grid.origin.y)] {
            if (db - da).abs() < 1e-12 {
                continue;
            }
            let (lo, hi) = if da < db { (da, db) } else { (db, da) };
            let mut k = ((lo - origin) / step).ceil() as i64;
            loop {
                let line = origin + k as f64 * step;
                if line > hi {
                    break;
                }
                let t = (line - da) / (db - da);
                if t > 1e-9 && t < 1.0 - 1e-9 {
                    ts.push(t);
                }
                k += 1;
            }
        }
        ts.sort_by(|x, y| x.total_cmp(y));
        for (idx, &t) in ts.iter().enumerate() {
            if idx == 0 && !result.is_empty() {
                // The segment start repeats the previous segment's end
                continue;
            }
            let p = a.lerp(b, t);
            result.push(Vec3::new(p.x, p.y, grid.height_at(p) + GROUND_OFFSET));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sloped_grid() -> TerrainGrid {
        // 4x4 cells over a 40 m square, height = x / 4
        let positions = TerrainGrid::corner_positions(Vec2::new(0.0, 0.0), 40.0, 4);
        let heights: Vec<f64> = positions.iter().map(|p| p.x / 4.0).collect();
        TerrainGrid::from_heights(Vec2::new(0.0, 0.0), 40.0, 4, heights).unwrap()
    }

    #[test]
    fn height_count_is_validated() {
        let result = TerrainGrid::from_heights(Vec2::new(0.0, 0.0), 40.0, 4, vec![0.0; 7]);
        assert!(matches!(
            result,
            Err(PipelineError::HeightCountMismatch { expected: 25, got: 7 })
        ));
    }

    #[test]
    fn bilinear_sampling_matches_the_plane() {
        let grid = sloped_grid();
        assert!((grid.height_at(Vec2::new(0.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((grid.height_at(Vec2::new(20.0, 13.0)) - 5.0).abs() < 1e-9);
        assert!((grid.height_at(Vec2::new(33.0, 2.0)) - 8.25).abs() < 1e-9);
    }

    #[test]
    fn projection_preserves_plan_area() {
        let grid = sloped_grid();
        let tri = [
            Vec2::new(2.0, 2.0),
            Vec2::new(28.0, 4.0),
            Vec2::new(12.0, 30.0),
        ];
        let mut out = MeshBuffers::new();
        project_triangle(&grid, tri, [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]], &mut out);
        assert!(out.vertex_count() >= 3);

        let mut plan_area = 0.0f64;
        for t in out.positions.chunks_exact(9) {
            let (ax, ay) = (t[0] as f64, t[1] as f64);
            let (bx, by) = (t[3] as f64, t[4] as f64);
            let (cx, cy) = (t[6] as f64, t[7] as f64);
            plan_area += ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs() * 0.5;
        }
        let src_area = 0.5
            * ((tri[1].x - tri[0].x) * (tri[2].y - tri[0].y)
                - (tri[2].x - tri[0].x) * (tri[1].y - tri[0].y))
                .abs();
        assert!(
            (plan_area - src_area).abs() < src_area * 0.01,
            "plan area {} vs source {}",
            plan_area,
            src_area
        );
    }

    #[test]
    fn projected_heights_follow_the_surface() {
        let grid = sloped_grid();
        let tri = [
            Vec2::new(5.0, 5.0),
            Vec2::new(15.0, 5.0),
            Vec2::new(5.0, 15.0),
        ];
        let mut out = MeshBuffers::new();
        project_triangle(&grid, tri, [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]], &mut out);
        for v in out.positions.chunks_exact(3) {
            let expected = v[0] as f64 / 4.0 + GROUND_OFFSET;
            assert!(
                (v[2] as f64 - expected).abs() < 1e-6,
                "vertex at x={} has z={} expected {}",
                v[0],
                v[2],
                expected
            );
        }
    }

    #[test]
    fn uvs_interpolate_barycentrically() {
        let grid = TerrainGrid::flat(Vec2::new(0.0, 0.0), 40.0, 4);
        let tri = [
            Vec2::new(0.0, 0.0),
            Vec2::new(8.0, 0.0),
            Vec2::new(0.0, 8.0),
        ];
        let mut out = MeshBuffers::new();
        project_triangle(&grid, tri, [[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]], &mut out);
        // Wherever a vertex lands, u must equal x/4 and v must equal y/4
        for (p, uv) in out
            .positions
            .chunks_exact(3)
            .zip(out.uvs.chunks_exact(2))
        {
            assert!((uv[0] as f64 - p[0] as f64 / 4.0).abs() < 1e-5);
            assert!((uv[1] as f64 - p[1] as f64 / 4.0).abs() < 1e-5);
        }
    }

    #[test]
    fn polyline_projection_samples_grid_crossings() {
        let grid = sloped_grid();
        let line = project_polyline(
            &grid,
            &[Vec2::new(5.0, 5.0), Vec2::new(35.0, 5.0)],
        );
        // Crosses x = 10, 20, 30: two endpoints plus three crossings
        assert_eq!(line.len(), 5);
        for p in &line {
            let expected = p.x / 4.0 + GROUND_OFFSET;
            assert!((p.z - expected).abs() < 1e-9);
        }
    }
}
