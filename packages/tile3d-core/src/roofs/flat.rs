// Flat roof: a constant-height cap over the footprint. Also the mandatory
// fallback target for every other strategy, so it must accept anything the
// triangulator accepts (and a footprint earcut cannot handle simply yields
// an empty cap).
use crate::multipolygon::Multipolygon;

use super::{RoofGeometry, RoofParams};

pub fn build_flat_roof(footprint: &Multipolygon, params: &RoofParams) -> RoofGeometry {
    RoofGeometry {
        mesh: footprint.footprint(params.base, false),
        skirt: None,
        apex_height: 0.0,
    }
}
