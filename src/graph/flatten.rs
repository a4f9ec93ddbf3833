//! Flattening: inlining compound-class instances.
//!
//! Each compound instance is replaced by a copy of its body. Inner
//! elements are renamed with the enclosing element's path as prefix,
//! formal parameters are bound from the instance's configuration, and
//! the `input` / `output` tunnels are rewritten into pass-through
//! connections. Flattening is idempotent: a flattened router contains
//! only primitive elements.

use smol_str::SmolStr;

use crate::base::Landmark;
use crate::confparse::split_args;
use crate::errors::{ErrorSink, ErrorSinkExt};

use super::{
    CompoundClass, Connection, ElementClass, ElementId, Formal, Port, REST_FORMAL, Router, Scope,
    ScopeChain, TUNNEL_INPUT, TUNNEL_OUTPUT,
};

/// Upper bound on inlining rounds; a configuration this deep is
/// assumed cyclic.
const MAX_ROUNDS: usize = 1000;

/// Select the overload alternative of `class` that admits the given
/// port counts: the first compound alternative whose tunnel arity
/// matches, else a trailing non-compound fallback.
pub fn select_overload(
    class: &ElementClass,
    ninputs: u32,
    noutputs: u32,
) -> Result<ElementClass, ()> {
    let resolved = class.resolve_synonyms();
    if resolved.compound().is_none() {
        return Ok(resolved);
    }
    for alt in resolved.overload_chain() {
        match alt.resolve_synonyms().compound() {
            Some(c) => {
                if c.body.tunnel_arity() == (ninputs, noutputs) {
                    return Ok(alt);
                }
            }
            // a non-compound tail is the catch-all fallback
            None => return Ok(alt.resolve_synonyms()),
        }
    }
    Err(())
}

/// Inline every compound instance of `router`, in place.
pub fn flatten(router: &mut Router, errh: &mut dyn ErrorSink) {
    let mut rounds = 0;
    while let Some((id, selection)) = next_compound_instance(router) {
        rounds += 1;
        if rounds > MAX_ROUNDS {
            let lm = router.element(id).landmark.clone();
            errh.error(&lm, "compound elements nested too deeply");
            break;
        }
        match selection {
            Ok(selected) if selected.compound().is_some() => {
                inline_compound(router, id, &selected, errh);
            }
            Ok(selected) => {
                // overload resolved to a primitive fallback
                router.element_mut(id).class = selected;
            }
            Err(()) => {
                let e = router.element(id);
                let lm = e.landmark.clone();
                let msg = format!(
                    "no overload of '{}' accepts {} inputs and {} outputs",
                    e.class.printable_name(),
                    e.ninputs(),
                    e.noutputs()
                );
                errh.error(&lm, msg);
                router.element_mut(id).class = ElementClass::primitive(super::ERROR_CLASS);
            }
        }
    }
    router.assign_element_names();
    router.compact();
    router.recompute_port_counts();
    router.clear_declared_types();
}

/// Find an element whose class resolves to a compound, together with
/// the overload alternative selected by its port counts.
fn next_compound_instance(router: &Router) -> Option<(ElementId, Result<ElementClass, ()>)> {
    for (id, e) in router.elements() {
        if e.dead || e.tunnel || e.class.resolve_synonyms().compound().is_none() {
            continue;
        }
        return Some((id, select_overload(&e.class, e.ninputs(), e.noutputs())));
    }
    None
}

/// Bind a compound's formal parameters from an instance configuration
/// (already variable-expanded), yielding the scope used to expand the
/// body's configuration strings.
fn bind_formals(
    compound: &CompoundClass,
    config: &str,
    landmark: &Landmark,
    errh: &mut dyn ErrorSink,
) -> Scope {
    let mut scope = Scope::new();
    let args = split_args(config);
    let formals = &compound.body.formals;
    let is_rest =
        |f: &&Formal| f.name == REST_FORMAL || f.keyword.as_deref() == Some(REST_FORMAL);

    let positional: Vec<&SmolStr> = formals
        .iter()
        .filter(|f| f.keyword.is_none() && f.name != REST_FORMAL)
        .map(|f| &f.name)
        .collect();
    let rest_formal = formals.iter().find(is_rest);

    let mut next_positional = 0;
    let mut rest: Vec<String> = Vec::new();

    'args: for arg in &args {
        let mut tail = arg.clone();
        let word = crate::confparse::shift_spacevec(&mut tail);
        for f in formals {
            if let Some(kw) = &f.keyword {
                if *kw != REST_FORMAL && *kw == word {
                    if scope.contains(&f.name) {
                        errh.error(
                            landmark,
                            format!(
                                "repeated keyword argument '{kw}' for '{}'",
                                compound_name(compound)
                            ),
                        );
                    } else {
                        scope.redefine(f.name.clone(), tail);
                    }
                    continue 'args;
                }
            }
        }
        if next_positional < positional.len() {
            scope.redefine(positional[next_positional].clone(), arg.clone());
            next_positional += 1;
        } else if rest_formal.is_some() {
            rest.push(arg.clone());
        } else if !arg.is_empty() {
            errh.error(
                landmark,
                format!(
                    "too many arguments to compound element '{}'",
                    compound_name(compound)
                ),
            );
        }
    }

    if let Some(rf) = rest_formal {
        scope.redefine(rf.name.clone(), rest.join(", "));
    }

    // unbound formals expand to the empty string
    for f in formals {
        if !scope.contains(&f.name) {
            scope.redefine(f.name.clone(), String::new());
        }
    }
    scope
}

fn compound_name(c: &CompoundClass) -> &str {
    if c.name.is_empty() {
        &c.printable_name
    } else {
        &c.name
    }
}

/// Replace element `id` with the body of `class`, renaming inner
/// elements `outer/inner` and splicing tunnel connections.
fn inline_compound(
    router: &mut Router,
    id: ElementId,
    class: &ElementClass,
    errh: &mut dyn ErrorSink,
) {
    let compound = class.compound().expect("compound class");
    let outer_name = router.element(id).name.clone();
    let outer_landmark = router.element(id).landmark.clone();
    let config = {
        let globals = router.scope.clone();
        ScopeChain::of(&globals).expand(&router.element(id).config)
    };

    let formal_scope = bind_formals(compound, &config, &outer_landmark, errh);
    let globals = router.scope.clone();
    let mut chain = ScopeChain::of(&globals);
    chain.push(&formal_scope);
    let body_scope = compound.body.scope.clone();
    chain.push(&body_scope);

    let body = &compound.body;
    let input_id = body.eindex(TUNNEL_INPUT);
    let output_id = body.eindex(TUNNEL_OUTPUT);

    // copy inner elements, building the id map
    let mut id_map: Vec<Option<ElementId>> = vec![None; body.nelements()];
    for (iid, ie) in body.elements() {
        if ie.tunnel {
            continue;
        }
        let new_name = SmolStr::new(format!("{outer_name}/{}", ie.name));
        let new_config = chain.expand(&ie.config);
        let nid = router.add_element(new_name, ie.class.clone(), new_config, ie.landmark.clone());
        id_map[iid.index()] = Some(nid);
    }

    // classify inner connections
    let mut inner_conns: Vec<Connection> = Vec::new();
    let mut in_map: Vec<Vec<Port>> = Vec::new();
    let mut out_map: Vec<Vec<Port>> = Vec::new();
    let mut passthrough: Vec<(u32, u32)> = Vec::new();
    let grow = |v: &mut Vec<Vec<Port>>, i: u32| {
        if v.len() <= i as usize {
            v.resize(i as usize + 1, Vec::new());
        }
    };
    for c in body.connections() {
        let from_tunnel = Some(c.from.element) == input_id;
        let to_tunnel = Some(c.to.element) == output_id;
        match (from_tunnel, to_tunnel) {
            (true, true) => passthrough.push((c.from.port, c.to.port)),
            (true, false) => {
                if let Some(t) = id_map[c.to.element.index()] {
                    grow(&mut in_map, c.from.port);
                    in_map[c.from.port as usize].push(Port::new(t, c.to.port));
                }
            }
            (false, true) => {
                if let Some(f) = id_map[c.from.element.index()] {
                    grow(&mut out_map, c.to.port);
                    out_map[c.to.port as usize].push(Port::new(f, c.from.port));
                }
            }
            (false, false) => {
                if let (Some(f), Some(t)) =
                    (id_map[c.from.element.index()], id_map[c.to.element.index()])
                {
                    inner_conns.push(Connection::new(
                        Port::new(f, c.from.port),
                        Port::new(t, c.to.port),
                        c.landmark.clone(),
                    ));
                }
            }
        }
    }

    // collect and detach outer connections touching the instance
    let mut outer_in: Vec<Connection> = Vec::new();
    let mut outer_out: Vec<Connection> = Vec::new();
    let mut keep: Vec<Connection> = Vec::new();
    for c in router.connections().iter().cloned() {
        if c.to.element == id {
            outer_in.push(c);
        } else if c.from.element == id {
            outer_out.push(c);
        } else {
            keep.push(c);
        }
    }
    router.replace_connections(keep);

    for c in inner_conns {
        router.add_connection(c.from, c.to, c.landmark);
    }
    for c in &outer_in {
        let p = c.to.port as usize;
        if let Some(targets) = in_map.get(p) {
            for t in targets {
                router.add_connection(c.from, *t, c.landmark.clone());
            }
        }
        for &(pp, qq) in &passthrough {
            if pp == c.to.port {
                for oc in &outer_out {
                    if oc.from.port == qq {
                        router.add_connection(c.from, oc.to, c.landmark.clone());
                    }
                }
            }
        }
    }
    for c in &outer_out {
        let q = c.from.port as usize;
        if let Some(sources) = out_map.get(q) {
            for f in sources {
                router.add_connection(*f, c.to, c.landmark.clone());
            }
        }
    }

    router.element_mut(id).dead = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Formal;

    fn lm() -> Landmark {
        Landmark::new("t", 1)
    }

    fn simple_compound(name: &str) -> ElementClass {
        // { $n | input -> Inner($n) -> output }
        let mut body = Router::named(name, lm());
        body.formals.push(Formal::positional("n"));
        let tin = body.get_tunnel(TUNNEL_INPUT, lm());
        let inner = body.add_element("Inner@1", ElementClass::primitive("Inner"), "$n", lm());
        let tout = body.get_tunnel(TUNNEL_OUTPUT, lm());
        body.add_connection(Port::new(tin, 0), Port::new(inner, 0), lm());
        body.add_connection(Port::new(inner, 0), Port::new(tout, 0), lm());
        ElementClass::new_compound(CompoundClass {
            name: name.into(),
            printable_name: name.into(),
            landmark: lm(),
            body,
            overload: None,
        })
    }

    #[test]
    fn test_inline_with_formal_binding() {
        let mut r = Router::new(lm());
        let src = r.add_element("src", ElementClass::primitive("Source"), "", lm());
        let comp = r.add_element("d", simple_compound("Doubled"), "3", lm());
        let sink = r.add_element("sink", ElementClass::primitive("Sink"), "", lm());
        r.add_connection(Port::new(src, 0), Port::new(comp, 0), lm());
        r.add_connection(Port::new(comp, 0), Port::new(sink, 0), lm());

        let mut errh = crate::errors::BufferSink::new();
        flatten(&mut r, &mut errh);
        assert_eq!(errh.nerrors(), 0, "{}", errh.take_text());

        assert_eq!(r.nelements(), 3);
        assert_eq!(r.nconnections(), 2);
        let inner = r.element_by_name("d/Inner@1").expect("inlined element");
        assert_eq!(inner.config, "3");
        // src -> d/Inner@1 -> sink
        let iid = r.eindex("d/Inner@1").unwrap();
        assert!(
            r.connections()
                .iter()
                .any(|c| c.from.element == r.eindex("src").unwrap() && c.to.element == iid)
        );
        assert!(
            r.connections()
                .iter()
                .any(|c| c.from.element == iid && c.to.element == r.eindex("sink").unwrap())
        );
    }

    #[test]
    fn test_flatten_idempotent() {
        let mut r = Router::new(lm());
        let src = r.add_element("src", ElementClass::primitive("Source"), "", lm());
        let comp = r.add_element("d", simple_compound("D"), "1", lm());
        r.add_connection(Port::new(src, 0), Port::new(comp, 0), lm());
        let sink = r.add_element("sink", ElementClass::primitive("Sink"), "", lm());
        r.add_connection(Port::new(comp, 0), Port::new(sink, 0), lm());

        let mut errh = crate::errors::SilentSink::new();
        flatten(&mut r, &mut errh);
        let once = r.unparse();
        flatten(&mut r, &mut errh);
        assert_eq!(r.unparse(), once);
    }
}
