//! Variable scopes and compound-class formal parameters.

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::confparse::expand_variables;

/// A formal parameter of a compound class: `$name`, or `TYPE $name`
/// for a keyword parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formal {
    pub name: SmolStr,
    /// Keyword under which call sites supply this parameter; `None`
    /// for positional formals.
    pub keyword: Option<SmolStr>,
}

impl Formal {
    pub fn positional(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            keyword: None,
        }
    }

    pub fn keyword(name: impl Into<SmolStr>, kw: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            keyword: Some(kw.into()),
        }
    }
}

/// An ordered mapping from variable name (without the `$` sigil) to
/// string value. Scopes chain at expansion time through
/// [`ScopeChain`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    vars: IndexMap<SmolStr, String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. Returns false if the name is already defined.
    pub fn define(&mut self, name: impl Into<SmolStr>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.vars.contains_key(&name) {
            false
        } else {
            self.vars.insert(name, value.into());
            true
        }
    }

    /// Add or replace a definition.
    pub fn redefine(&mut self, name: impl Into<SmolStr>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &String)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Expand `$var` references in `s` against this scope alone.
    pub fn expand(&self, s: &str) -> String {
        expand_variables(s, &|name| self.get(name).map(str::to_string))
    }
}

/// A borrow of nested scopes, innermost last. Lookup walks from the
/// innermost scope outward.
#[derive(Default)]
pub struct ScopeChain<'a> {
    scopes: Vec<&'a Scope>,
}

impl<'a> ScopeChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(scope: &'a Scope) -> Self {
        Self {
            scopes: vec![scope],
        }
    }

    pub fn push(&mut self, scope: &'a Scope) {
        self.scopes.push(scope);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn expand(&self, s: &str) -> String {
        expand_variables(s, &|name| self.get(name).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_rejects_duplicates() {
        let mut s = Scope::new();
        assert!(s.define("x", "1"));
        assert!(!s.define("x", "2"));
        assert_eq!(s.get("x"), Some("1"));
    }

    #[test]
    fn test_chain_shadows_outward() {
        let mut outer = Scope::new();
        outer.define("a", "outer-a");
        outer.define("b", "outer-b");
        let mut inner = Scope::new();
        inner.define("a", "inner-a");

        let mut chain = ScopeChain::of(&outer);
        chain.push(&inner);
        assert_eq!(chain.get("a"), Some("inner-a"));
        assert_eq!(chain.get("b"), Some("outer-b"));
        assert_eq!(chain.expand("$a/$b"), "inner-a/outer-b");
    }
}
