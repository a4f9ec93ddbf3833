//! The process-wide element factory registry.
//!
//! Element classes advertise themselves by registering a constructor;
//! traits (port-count, processing, and flow codes) are read off a
//! prototype instance. The registry seeds the default element map
//! used when no external registry file is loaded.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::sync::Once;

use crate::registry::{ElementMap, Traits};

use super::Element;

/// Constructs a fresh, unconfigured element instance.
pub type Constructor = fn() -> Box<dyn Element>;

struct FactoryEntry {
    ctor: Constructor,
    traits: Traits,
}

static REGISTRY: Lazy<RwLock<FxHashMap<SmolStr, FactoryEntry>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

static DEFAULTS: Once = Once::new();

/// Register an element class. The prototype's metadata becomes its
/// traits entry; a later registration of the same name replaces the
/// earlier one.
pub fn register_element(ctor: Constructor) {
    let proto = ctor();
    let mut traits = Traits::new(proto.class_name());
    traits.port_count_code = proto.port_count().to_string();
    traits.processing_code = proto.processing().to_string();
    traits.flow_code = proto.flow_code().to_string();
    REGISTRY.write().insert(
        SmolStr::new(proto.class_name()),
        FactoryEntry { ctor, traits },
    );
}

/// Register the built-in element library. Idempotent.
pub fn install_defaults() {
    DEFAULTS.call_once(|| {
        for ctor in super::elements::DEFAULT_ELEMENTS {
            register_element(*ctor);
        }
    });
}

/// Construct an instance of a registered class.
pub fn make_element(class_name: &str) -> Option<Box<dyn Element>> {
    REGISTRY.read().get(class_name).map(|e| (e.ctor)())
}

pub fn has_element(class_name: &str) -> bool {
    REGISTRY.read().contains_key(class_name)
}

/// An element map seeded with every registered class's traits.
pub fn default_elementmap() -> ElementMap {
    install_defaults();
    let mut map = ElementMap::new();
    let reg = REGISTRY.read();
    let mut names: Vec<&SmolStr> = reg.keys().collect();
    names.sort();
    for name in names {
        map.add(reg[name].traits.clone());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        install_defaults();
        assert!(has_element("Counter"));
        assert!(has_element("Queue"));
        assert!(has_element("Discard"));
        let q = make_element("Queue").unwrap();
        assert_eq!(q.class_name(), "Queue");
    }

    #[test]
    fn test_default_elementmap_has_codes() {
        let map = default_elementmap();
        assert_eq!(map.traits("Queue").unwrap().processing_code, "h/l");
        assert_eq!(map.traits("Counter").unwrap().processing_code, "a/a");
    }
}
