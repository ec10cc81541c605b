// Roof construction. Ten strategies share one contract: a stateless build
// from (footprint, params) to buffers-or-none. Whatever a strategy returns
// runs through the geometry validator; `None` or invalid output falls back
// to the flat builder. The fallback is mandatory - a building always gets a
// roof, a broken footprint just gets a simpler one.
mod flat;
mod profile;
mod radial;
mod skeletal;

use serde::Deserialize;

use crate::math::Vec2;
use crate::multipolygon::Multipolygon;
use crate::triangulate::MeshBuffers;

pub use flat::build_flat_roof;

/// Default fractional position of the gambrel knee along the slope run.
pub const GAMBREL_SPLIT: f64 = 0.3;
/// Default extra height pushed into the gambrel knee.
pub const GAMBREL_BUMP: f64 = 0.3;
/// Mansard: fraction of the wavefront where the pitch changes.
pub const MANSARD_SPLIT: f64 = 0.3;
/// Mansard: fraction of the total rise reached at the pitch change.
pub const MANSARD_KNEE: f64 = 0.7;
/// Default ring count for the revolved (onion/dome) shapes.
pub const RADIAL_STEPS: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoofType {
    Flat,
    Skillion,
    Gabled,
    Gambrel,
    #[serde(rename = "saltbox")]
    QuadrupleSaltbox,
    Hipped,
    Pyramidal,
    Mansard,
    Onion,
    Dome,
}

impl Default for RoofType {
    fn default() -> Self {
        RoofType::Flat
    }
}

/// Ridge orientation for the cross-profile family. `Along` puts the ridge
/// on the longer OMBB axis (the common case for gabled streets).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoofOrientation {
    Along,
    Across,
}

#[derive(Clone, Debug)]
pub struct RoofParams {
    pub roof_type: RoofType,
    /// Eave plane height, absolute z.
    pub base: f64,
    /// Nominal rise from eave to apex. Ignored when `angle` is set.
    pub height: f64,
    /// Slope angle in radians; when set, the rise is derived from the
    /// footprint (skeleton depth or profile half-extent).
    pub angle: Option<f64>,
    pub orientation: Option<RoofOrientation>,
    /// Ring count for onion/dome.
    pub steps: u32,
    pub gambrel_split: f64,
    pub gambrel_bump: f64,
}

impl Default for RoofParams {
    fn default() -> Self {
        Self {
            roof_type: RoofType::Flat,
            base: 0.0,
            height: 0.0,
            angle: None,
            orientation: None,
            steps: RADIAL_STEPS,
            gambrel_split: GAMBREL_SPLIT,
            gambrel_bump: GAMBREL_BUMP,
        }
    }
}

/// Where the roof meets the wall top: per ring, ordered (position, rise)
/// pairs. The rise is relative to the eave plane; the wall builder adds it
/// to the facade height at that vertex.
pub type SkirtRing = Vec<(Vec2, f64)>;

#[derive(Debug, Default)]
pub struct RoofGeometry {
    pub mesh: MeshBuffers,
    /// One entry per footprint ring, present for roof shapes whose
    /// underside is not flat at the eave (gable ends and friends).
    pub skirt: Option<Vec<SkirtRing>>,
    /// Actual rise from the eave plane to the apex. Callers that size the
    /// facade from total building height subtract this.
    pub apex_height: f64,
}

/// Sanity checks on finished roof geometry: finite coordinates, whole
/// triangles, and a plan-area coverage close to the footprint (a broken
/// split or skeleton shows up as a collapsed or exploded cap).
pub fn validate_roof_geometry(geometry: &RoofGeometry, footprint_area: f64) -> bool {
    let mesh = &geometry.mesh;
    if mesh.positions.is_empty() || mesh.positions.len() % 9 != 0 {
        return false;
    }
    if mesh.positions.iter().any(|v| !v.is_finite())
        || mesh.normals.iter().any(|v| !v.is_finite())
    {
        return false;
    }
    if !geometry.apex_height.is_finite() || geometry.apex_height < 0.0 {
        return false;
    }

    let mut plan_area = 0.0f64;
    for tri in mesh.positions.chunks_exact(9) {
        let ax = tri[0] as f64;
        let ay = tri[1] as f64;
        let bx = tri[3] as f64;
        let by = tri[4] as f64;
        let cx = tri[6] as f64;
        let cy = tri[7] as f64;
        plan_area += ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs() * 0.5;
    }
    if footprint_area > 1.0 {
        let ratio = plan_area / footprint_area;
        if !(0.5..=4.0).contains(&ratio) {
            return false;
        }
    }
    true
}

/// Build a roof, falling back to the flat builder whenever the requested
/// strategy declines the footprint or produces invalid output.
pub fn build_roof(footprint: &Multipolygon, params: &RoofParams) -> RoofGeometry {
    // Non-simple footprints go straight to the fallback: every shaped
    // strategy keys off derived geometry that is undefined for them
    let simple = footprint
        .primary_rings()
        .map_or(false, |(outer, _)| crate::math::ring_is_simple(outer));
    if !simple {
        return build_flat_roof(footprint, params);
    }

    let attempted = match params.roof_type {
        RoofType::Flat => None,
        RoofType::Skillion
        | RoofType::Gabled
        | RoofType::Gambrel
        | RoofType::QuadrupleSaltbox => profile::build_profile_roof(footprint, params),
        RoofType::Hipped | RoofType::Pyramidal | RoofType::Mansard => {
            skeletal::build_skeletal_roof(footprint, params)
        }
        RoofType::Onion | RoofType::Dome => radial::build_radial_roof(footprint, params),
    };

    let area = footprint.area();
    match attempted {
        Some(geometry) if validate_roof_geometry(&geometry, area) => geometry,
        Some(_) => {
            log::debug!(
                "{:?} roof failed validation, falling back to flat",
                params.roof_type
            );
            build_flat_roof(footprint, params)
        }
        None => {
            if params.roof_type != RoofType::Flat {
                log::debug!(
                    "{:?} roof unsupported on this footprint, falling back to flat",
                    params.roof_type
                );
            }
            build_flat_roof(footprint, params)
        }
    }
}
