//! Element classes: primitives, compounds, synonyms, and tunnels.

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::base::Landmark;

use super::Router;

/// A reference to an element class. Cloning is cheap; identity is the
/// shared allocation, so two classes with the same name declared in
/// different scopes stay distinct.
#[derive(Clone)]
pub struct ElementClass(Arc<ClassKind>);

/// The variants of an element class.
pub enum ClassKind {
    /// A named leaf class whose behavior and traits come from the
    /// element registry.
    Primitive(SmolStr),
    /// A class defined by a nested router.
    Compound(CompoundClass),
    /// A new name for another class (`elementclass A B;`).
    Synonym { name: SmolStr, of: ElementClass },
    /// The marker class of `input` / `output` pseudoelements inside a
    /// compound body.
    Tunnel,
}

/// A compound element class: a nested router with formal parameters,
/// possibly chained to overload alternatives.
pub struct CompoundClass {
    pub name: SmolStr,
    /// Name shown in diagnostics; `<anonymousN>` for unnamed classes.
    pub printable_name: SmolStr,
    pub landmark: Landmark,
    pub body: Router,
    /// Next alternative in an `A || B ... C` overload chain.
    pub overload: Option<ElementClass>,
}

impl ElementClass {
    pub fn primitive(name: impl Into<SmolStr>) -> Self {
        Self(Arc::new(ClassKind::Primitive(name.into())))
    }

    pub fn new_compound(compound: CompoundClass) -> Self {
        Self(Arc::new(ClassKind::Compound(compound)))
    }

    pub fn synonym(name: impl Into<SmolStr>, of: ElementClass) -> Self {
        Self(Arc::new(ClassKind::Synonym {
            name: name.into(),
            of,
        }))
    }

    pub fn tunnel() -> Self {
        Self(Arc::new(ClassKind::Tunnel))
    }

    pub fn kind(&self) -> &ClassKind {
        &self.0
    }

    /// The class's declared name; empty for anonymous compounds and
    /// tunnels.
    pub fn name(&self) -> &str {
        match &*self.0 {
            ClassKind::Primitive(n) => n,
            ClassKind::Compound(c) => &c.name,
            ClassKind::Synonym { name, .. } => name,
            ClassKind::Tunnel => "",
        }
    }

    /// The name to use in diagnostics; never empty.
    pub fn printable_name(&self) -> &str {
        match &*self.0 {
            ClassKind::Primitive(n) => n,
            ClassKind::Compound(c) => {
                if c.name.is_empty() {
                    &c.printable_name
                } else {
                    &c.name
                }
            }
            ClassKind::Synonym { name, .. } => name,
            ClassKind::Tunnel => "<tunnel>",
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(&*self.0, ClassKind::Primitive(_))
    }

    pub fn is_tunnel(&self) -> bool {
        matches!(&*self.0, ClassKind::Tunnel)
    }

    /// Follow synonym links to the underlying class.
    pub fn resolve_synonyms(&self) -> ElementClass {
        match &*self.0 {
            ClassKind::Synonym { of, .. } => of.resolve_synonyms(),
            _ => self.clone(),
        }
    }

    /// The compound body, if this class (after synonyms) is compound.
    pub fn compound(&self) -> Option<&CompoundClass> {
        match &*self.0 {
            ClassKind::Compound(c) => Some(c),
            ClassKind::Synonym { of, .. } => of.compound(),
            _ => None,
        }
    }

    /// Walk the overload chain starting here, yielding every
    /// alternative in declaration order. The chain is finite by
    /// construction; a cycle guard caps the walk.
    pub fn overload_chain(&self) -> Vec<ElementClass> {
        let mut out = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(c) = cur {
            if out.len() > 64 || out.iter().any(|p: &ElementClass| p.same(&c)) {
                break;
            }
            cur = c.compound().and_then(|cc| cc.overload.clone());
            out.push(c);
        }
        out
    }

    /// Identity comparison: same shared allocation.
    pub fn same(&self, other: &ElementClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ClassKind::Primitive(n) => write!(f, "Primitive({n})"),
            ClassKind::Compound(c) => write!(f, "Compound({})", c.printable_name),
            ClassKind::Synonym { name, of } => write!(f, "Synonym({name} -> {:?})", of),
            ClassKind::Tunnel => write!(f, "Tunnel"),
        }
    }
}

impl PartialEq for ElementClass {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for ElementClass {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonym_resolution() {
        let base = ElementClass::primitive("Counter");
        let syn = ElementClass::synonym("MyCounter", base.clone());
        assert_eq!(syn.name(), "MyCounter");
        assert!(syn.resolve_synonyms().same(&base));
    }

    #[test]
    fn test_identity_not_name_equality() {
        let a = ElementClass::primitive("X");
        let b = ElementClass::primitive("X");
        assert!(!a.same(&b));
        assert!(a.same(&a.clone()));
    }
}
