// Global material -> texture-array-slot registry. The renderer owns the
// actual texture array; this side only has to hand out stable slot ids for
// material names, with the well-known surfaces pre-registered so ids stay
// deterministic across tiles.
use std::collections::HashMap;

use lazy_static::lazy_static;
use parking_lot::Mutex;

pub struct TextureRegistry {
    ids: HashMap<String, u32>,
    next: u32,
}

/// Surfaces every tile may reference, registered in fixed order.
const BUILTIN_TEXTURES: &[&str] = &[
    "facade",
    "window",
    "roof_default",
    "roof_tiles",
    "roof_metal",
    "asphalt",
    "concrete",
    "gravel",
    "wood",
    "water",
    "grass",
    "pitch",
    "fence",
    "hedge",
    "wire",
];

impl TextureRegistry {
    fn new() -> Self {
        let mut registry = TextureRegistry {
            ids: HashMap::new(),
            next: 0,
        };
        for name in BUILTIN_TEXTURES {
            registry.id_for(name);
        }
        registry
    }

    fn id_for(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(name.to_string(), id);
        id
    }
}

lazy_static! {
    static ref REGISTRY: Mutex<TextureRegistry> = Mutex::new(TextureRegistry::new());
}

/// Stable texture slot for a material name; unknown names are assigned the
/// next free slot on first use.
pub fn texture_id(name: &str) -> u32 {
    REGISTRY.lock().id_for(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_stable() {
        assert_eq!(texture_id("facade"), 0);
        assert_eq!(texture_id("window"), 1);
        assert_eq!(texture_id("facade"), 0);
    }

    #[test]
    fn unknown_materials_get_fresh_slots() {
        let a = texture_id("test_material_a");
        let b = texture_id("test_material_b");
        assert_ne!(a, b);
        assert_eq!(texture_id("test_material_a"), a);
        assert!(a >= BUILTIN_TEXTURES.len() as u32);
    }
}
