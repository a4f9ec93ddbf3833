//! Emitting a router back as configuration text.
//!
//! The output reparses to an isomorphic router: same element names,
//! classes, configurations, and connections (landmarks excepted).

use std::fmt::Write;

use super::{ClassKind, CompoundClass, ElementClass, Router};

impl Router {
    /// Render this router as configuration text.
    pub fn unparse(&self) -> String {
        let mut out = String::new();
        self.unparse_body(&mut out, 0);
        out
    }

    fn unparse_body(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);

        for (rtype, value) in self.requirements() {
            if value.is_empty() {
                let _ = writeln!(out, "{pad}require({rtype});");
            } else {
                let _ = writeln!(out, "{pad}require({rtype} {value});");
            }
        }
        for value in self.provisions() {
            let _ = writeln!(out, "{pad}provide({value});");
        }
        for (name, value) in self.scope.iter() {
            let _ = writeln!(out, "{pad}define(${name} {value});");
        }

        for class in self.declared_types() {
            match class.kind() {
                ClassKind::Compound(c) if !c.name.is_empty() => {
                    let _ = write!(out, "{pad}elementclass {} ", c.name);
                    unparse_compound(c, out, depth);
                    out.push_str(";\n");
                }
                ClassKind::Synonym { name, of } => {
                    let _ = writeln!(out, "{pad}elementclass {name} {};", of.printable_name());
                }
                _ => {}
            }
        }

        for (_, e) in self.elements() {
            if e.tunnel || e.dead {
                continue;
            }
            let _ = write!(out, "{pad}{} :: ", e.name);
            unparse_classref(&e.class, out, depth);
            if e.config.is_empty() {
                out.push_str(";\n");
            } else {
                let _ = writeln!(out, "({});", e.config);
            }
        }

        for c in self.connections() {
            let from = self.element(c.from.element);
            let to = self.element(c.to.element);
            let _ = writeln!(
                out,
                "{pad}{} [{}] -> [{}] {};",
                from.name, c.from.port, c.to.port, to.name
            );
        }
    }
}

fn unparse_classref(class: &ElementClass, out: &mut String, depth: usize) {
    match class.kind() {
        ClassKind::Compound(c) if c.name.is_empty() => unparse_compound(c, out, depth),
        _ => out.push_str(class.printable_name()),
    }
}

fn unparse_compound(first: &CompoundClass, out: &mut String, depth: usize) {
    out.push_str("{\n");
    let pad = "  ".repeat(depth + 1);
    let mut cur = first;
    loop {
        if !cur.body.formals.is_empty() {
            let formals: Vec<String> = cur
                .body
                .formals
                .iter()
                .map(|f| match &f.keyword {
                    Some(kw) => format!("{kw} ${}", f.name),
                    None => format!("${}", f.name),
                })
                .collect();
            let _ = writeln!(out, "{pad}{} |", formals.join(", "));
        }
        cur.body.unparse_body(out, depth + 1);
        match &cur.overload {
            None => break,
            Some(next) => match next.kind() {
                ClassKind::Compound(c) => {
                    let _ = writeln!(out, "{pad}||");
                    cur = c;
                }
                _ => {
                    // non-compound tail of the chain is the fallback class
                    let _ = writeln!(out, "{pad}... {}", next.printable_name());
                    break;
                }
            },
        }
    }
    let _ = write!(out, "{}}}", "  ".repeat(depth));
}
