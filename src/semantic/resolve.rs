//! Element-class resolution against the traits table.

use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::graph::{ERROR_CLASS, ElementClass, Router};
use crate::registry::ElementMap;

use super::Processing;

/// Check every element's class. Unknown primitive names are reported
/// and replaced by the reserved error class; overload chains are
/// checked for cycles.
pub fn resolve_classes(router: &mut Router, emap: &ElementMap, errh: &mut dyn ErrorSink) {
    let mut replacements: Vec<(crate::graph::ElementId, ElementClass)> = Vec::new();

    for (id, e) in router.elements() {
        if e.tunnel || e.dead {
            continue;
        }
        let resolved = e.class.resolve_synonyms();
        if resolved.is_primitive() && !emap.has_type(resolved.name()) && resolved.name() != ERROR_CLASS
        {
            errh.error(
                &e.landmark,
                format!("unknown element class '{}'", resolved.printable_name()),
            );
            replacements.push((id, ElementClass::primitive(ERROR_CLASS)));
        } else if let Some(compound) = resolved.compound() {
            // overload chains must be acyclic
            let chain = resolved.overload_chain();
            let mut cyclic = false;
            if let Some(last) = chain.last() {
                if let Some(c) = last.compound() {
                    cyclic = c
                        .overload
                        .as_ref()
                        .is_some_and(|next| chain.iter().any(|p| p.same(next)));
                }
            }
            if cyclic {
                errh.error(
                    &compound.landmark,
                    format!(
                        "overload chain of '{}' contains a cycle",
                        resolved.printable_name()
                    ),
                );
                replacements.push((id, ElementClass::primitive(ERROR_CLASS)));
            }
        }
    }

    for (id, class) in replacements {
        router.element_mut(id).class = class;
    }
}

/// Run processing inference over every locally declared compound
/// class, recursively, reporting errors in their bodies.
pub fn check_types(router: &Router, emap: &ElementMap, errh: &mut dyn ErrorSink) {
    for class in router.declared_types() {
        for alt in class.overload_chain() {
            if let Some(compound) = alt.compound() {
                let _ = Processing::new(&compound.body, emap, errh);
                check_types(&compound.body, emap, errh);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Landmark;
    use crate::errors::BufferSink;
    use crate::graph::Port;
    use crate::registry::Traits;

    fn emap() -> ElementMap {
        let mut m = ElementMap::new();
        let mut t = Traits::new("Known");
        t.port_count_code = "1/1".into();
        t.processing_code = "a/a".into();
        m.add(t);
        m
    }

    #[test]
    fn test_unknown_class_replaced() {
        let lm = Landmark::new("t", 1);
        let mut r = Router::new(lm.clone());
        let a = r.add_element("a", ElementClass::primitive("Known"), "", lm.clone());
        let b = r.add_element("b", ElementClass::primitive("Mystery"), "", lm.clone());
        r.add_connection(Port::new(a, 0), Port::new(b, 0), lm);

        let mut errh = BufferSink::new();
        resolve_classes(&mut r, &emap(), &mut errh);
        assert_eq!(errh.nerrors(), 1);
        assert_eq!(r.element(b).class.name(), ERROR_CLASS);
        assert_eq!(r.element(a).class.name(), "Known");
    }
}
