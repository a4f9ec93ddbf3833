//! The router graph: elements, connections, classes, scope.

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::base::Landmark;
use crate::errors::{ErrorSink, ErrorSinkExt};

use super::{
    Connection, Element, ElementClass, ElementId, Formal, Port, Scope, TUNNEL_INPUT, TUNNEL_OUTPUT,
};

/// A graph of elements and connections, with the declarations that
/// surround it. Also serves as the body of a compound element class,
/// in which case `formals` is nonempty and tunnels model the external
/// ports.
#[derive(Clone, Debug, Default)]
pub struct Router {
    /// Compound-class name; empty for a top-level router.
    pub name: SmolStr,
    pub landmark: Landmark,
    elements: Vec<Element>,
    names: IndexMap<SmolStr, ElementId>,
    connections: Vec<Connection>,
    declared_classes: Vec<ElementClass>,
    requirements: Vec<(SmolStr, String)>,
    provisions: Vec<String>,
    pub scope: Scope,
    pub formals: Vec<Formal>,
}

impl Router {
    pub fn new(landmark: Landmark) -> Self {
        Self {
            landmark,
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<SmolStr>, landmark: Landmark) -> Self {
        Self {
            name: name.into(),
            landmark,
            ..Self::default()
        }
    }

    // ========================================================================
    // ELEMENTS
    // ========================================================================

    pub fn nelements(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.index()]
    }

    pub fn element_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id.index()]
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId(i as u32), e))
    }

    pub fn eindex(&self, name: &str) -> Option<ElementId> {
        self.names.get(name).copied()
    }

    pub fn element_by_name(&self, name: &str) -> Option<&Element> {
        self.eindex(name).map(|id| self.element(id))
    }

    /// Add a new element; the name must be unused.
    pub fn add_element(
        &mut self,
        name: impl Into<SmolStr>,
        class: ElementClass,
        config: impl Into<String>,
        landmark: Landmark,
    ) -> ElementId {
        let name = name.into();
        debug_assert!(!self.names.contains_key(&name), "duplicate element {name}");
        let id = ElementId(self.elements.len() as u32);
        self.elements
            .push(Element::new(name.clone(), class, config.into(), landmark));
        self.names.insert(name, id);
        id
    }

    /// Return the element with `name`, creating it if absent.
    pub fn get_element(
        &mut self,
        name: impl Into<SmolStr>,
        class: ElementClass,
        config: impl Into<String>,
        landmark: Landmark,
    ) -> ElementId {
        let name = name.into();
        match self.names.get(&name) {
            Some(&id) => id,
            None => self.add_element(name, class, config, landmark),
        }
    }

    /// Get or create the tunnel pseudoelement `input` or `output`.
    pub fn get_tunnel(&mut self, which: &str, landmark: Landmark) -> ElementId {
        debug_assert!(which == TUNNEL_INPUT || which == TUNNEL_OUTPUT);
        self.get_element(which, ElementClass::tunnel(), String::new(), landmark)
    }

    /// Rename an element. The new name must be unused.
    fn rename_element(&mut self, id: ElementId, new_name: SmolStr) {
        let old = self.elements[id.index()].name.clone();
        self.names.shift_remove(&old);
        self.names.insert(new_name.clone(), id);
        self.elements[id.index()].name = new_name;
    }

    /// Resolve parser-synthesized anonymous names (leading `;`) into
    /// final unique names of the form `Class@N`.
    pub fn assign_element_names(&mut self) {
        for i in 0..self.elements.len() {
            let id = ElementId(i as u32);
            if !self.elements[i].is_anonymous() {
                continue;
            }
            let base = self.elements[i].name[1..].to_string();
            let mut candidate = SmolStr::new(&base);
            // bump the @N suffix until the name is free
            let (stem, mut n) = match base.rsplit_once('@') {
                Some((stem, digits)) => {
                    (stem.to_string(), digits.parse::<u64>().unwrap_or(0))
                }
                None => (base.clone(), 0),
            };
            while self.names.contains_key(&candidate) {
                n += 1;
                candidate = SmolStr::new(format!("{stem}@{n}"));
            }
            self.rename_element(id, candidate);
        }
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    pub fn nconnections(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Add a connection, growing the endpoint elements' port counts to
    /// cover the referenced ports.
    pub fn add_connection(&mut self, from: Port, to: Port, landmark: Landmark) {
        {
            let fe = &mut self.elements[from.element.index()];
            fe.noutputs = fe.noutputs.max(from.port + 1);
        }
        {
            let te = &mut self.elements[to.element.index()];
            te.ninputs = te.ninputs.max(to.port + 1);
        }
        self.connections.push(Connection::new(from, to, landmark));
    }

    /// Swap in a new connection list wholesale (used by flattening).
    pub fn replace_connections(&mut self, connections: Vec<Connection>) {
        self.connections = connections;
    }

    /// Recompute every element's port counts from the connection list.
    pub fn recompute_port_counts(&mut self) {
        for e in &mut self.elements {
            e.ninputs = 0;
            e.noutputs = 0;
        }
        for c in &self.connections {
            let fe = &mut self.elements[c.from.element.index()];
            fe.noutputs = fe.noutputs.max(c.from.port + 1);
            let te = &mut self.elements[c.to.element.index()];
            te.ninputs = te.ninputs.max(c.to.port + 1);
        }
    }

    pub fn connections_from(&self, port: Port) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.from == port)
    }

    pub fn connections_to(&self, port: Port) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.to == port)
    }

    // ========================================================================
    // CLASSES, REQUIREMENTS, SCOPE
    // ========================================================================

    /// Look up a class declared in this router, most recent first (a
    /// later declaration shadows an earlier one of the same name).
    pub fn declared_type(&self, name: &str) -> Option<ElementClass> {
        self.declared_classes
            .iter()
            .rev()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub fn add_declared_type(&mut self, class: ElementClass) {
        self.declared_classes.push(class);
    }

    pub fn declared_types(&self) -> &[ElementClass] {
        &self.declared_classes
    }

    pub fn clear_declared_types(&mut self) {
        self.declared_classes.clear();
    }

    pub fn add_requirement(&mut self, rtype: impl Into<SmolStr>, value: impl Into<String>) {
        self.requirements.push((rtype.into(), value.into()));
    }

    pub fn requirements(&self) -> &[(SmolStr, String)] {
        &self.requirements
    }

    pub fn add_provision(&mut self, value: impl Into<String>) {
        self.provisions.push(value.into());
    }

    pub fn provisions(&self) -> &[String] {
        &self.provisions
    }

    /// Apply overriding definitions (for example CLI `define`s) on top
    /// of the configuration's own scope.
    pub fn redefine(&mut self, overrides: &Scope) {
        for (name, value) in overrides.iter() {
            self.scope.redefine(name.clone(), value.clone());
        }
    }

    /// Whether this router is a compound-class body.
    pub fn is_compound_body(&self) -> bool {
        !self.formals.is_empty()
            || self.names.contains_key(TUNNEL_INPUT)
            || self.names.contains_key(TUNNEL_OUTPUT)
    }

    /// Add a formal parameter; false if the name repeats.
    pub fn add_formal(&mut self, formal: Formal) -> bool {
        if self.formals.iter().any(|f| f.name == formal.name) {
            false
        } else {
            self.formals.push(formal);
            true
        }
    }

    // ========================================================================
    // TUNNEL PORT CHECKS
    // ========================================================================

    /// Check that a tunnel's ports are contiguously used and return the
    /// port count. For the `input` tunnel the relevant side is its
    /// outputs; for `output`, its inputs.
    pub fn check_tunnel_ports(
        &self,
        id: ElementId,
        is_output_tunnel: bool,
        context: &str,
        errh: &mut dyn ErrorSink,
    ) -> u32 {
        let e = self.element(id);
        let nports = if is_output_tunnel {
            e.ninputs()
        } else {
            e.noutputs()
        };
        let mut used = vec![false; nports as usize];
        for c in &self.connections {
            if is_output_tunnel {
                if c.to.element == id {
                    used[c.to.port as usize] = true;
                }
            } else if c.from.element == id {
                used[c.from.port as usize] = true;
            }
        }
        for (p, u) in used.iter().enumerate() {
            if !u {
                let side = if is_output_tunnel { "output" } else { "input" };
                errh.error(
                    &e.landmark,
                    format!("{context} {side} {p} unused"),
                );
            }
        }
        nports
    }

    /// Port arity of this router viewed as a compound body:
    /// (external inputs, external outputs).
    pub fn tunnel_arity(&self) -> (u32, u32) {
        let nin = self
            .element_by_name(TUNNEL_INPUT)
            .map(|e| e.noutputs())
            .unwrap_or(0);
        let nout = self
            .element_by_name(TUNNEL_OUTPUT)
            .map(|e| e.ninputs())
            .unwrap_or(0);
        (nin, nout)
    }

    // ========================================================================
    // TYPE COLLECTION
    // ========================================================================

    /// Collect every class used by elements of this router, without
    /// descending into compound bodies.
    pub fn collect_types(&self) -> Vec<ElementClass> {
        let mut seen: Vec<ElementClass> = Vec::new();
        for e in &self.elements {
            if e.tunnel {
                continue;
            }
            if !seen.iter().any(|c| c.same(&e.class)) {
                seen.push(e.class.clone());
            }
        }
        seen
    }

    /// Remove dead elements, renumbering ids and dropping their
    /// connections.
    pub fn compact(&mut self) {
        let mut remap: Vec<Option<ElementId>> = Vec::with_capacity(self.elements.len());
        let mut next = 0u32;
        for e in &self.elements {
            if e.dead {
                remap.push(None);
            } else {
                remap.push(Some(ElementId(next)));
                next += 1;
            }
        }
        self.elements.retain(|e| !e.dead);
        self.names.clear();
        for (i, e) in self.elements.iter().enumerate() {
            self.names.insert(e.name.clone(), ElementId(i as u32));
        }
        self.connections.retain_mut(|c| {
            match (remap[c.from.element.index()], remap[c.to.element.index()]) {
                (Some(f), Some(t)) => {
                    c.from.element = f;
                    c.to.element = t;
                    true
                }
                _ => false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm() -> Landmark {
        Landmark::new("test", 1)
    }

    #[test]
    fn test_add_connection_grows_ports() {
        let mut r = Router::new(lm());
        let a = r.add_element("a", ElementClass::primitive("Src"), "", lm());
        let b = r.add_element("b", ElementClass::primitive("Sink"), "", lm());
        r.add_connection(Port::new(a, 2), Port::new(b, 0), lm());
        assert_eq!(r.element(a).noutputs(), 3);
        assert_eq!(r.element(b).ninputs(), 1);
    }

    #[test]
    fn test_anonymous_name_assignment() {
        let mut r = Router::new(lm());
        r.add_element("Foo@1", ElementClass::primitive("Foo"), "", lm());
        let anon = r.add_element(";Foo@1", ElementClass::primitive("Foo"), "", lm());
        r.assign_element_names();
        assert_eq!(r.element(anon).name, "Foo@2");
        assert!(r.eindex("Foo@2").is_some());
    }

    #[test]
    fn test_compact_renumbers() {
        let mut r = Router::new(lm());
        let a = r.add_element("a", ElementClass::primitive("X"), "", lm());
        let b = r.add_element("b", ElementClass::primitive("X"), "", lm());
        let c = r.add_element("c", ElementClass::primitive("X"), "", lm());
        r.add_connection(Port::new(a, 0), Port::new(b, 0), lm());
        r.add_connection(Port::new(b, 0), Port::new(c, 0), lm());
        r.element_mut(b).dead = true;
        r.compact();
        assert_eq!(r.nelements(), 2);
        assert_eq!(r.nconnections(), 0);
        assert_eq!(r.eindex("c"), Some(ElementId(1)));
    }
}
