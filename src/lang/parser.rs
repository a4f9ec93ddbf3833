//! Recursive-descent parser: token stream to router graph.
//!
//! Statements are connection chains, `elementclass` declarations, and
//! the `require` / `provide` / `define` directives. The connection
//! sub-language pairs output ports with input ports across `->`
//! (one-to-one) and `=>` (many-to-many), with expandable end ports,
//! anonymous groups, and implicit `input` / `output` references inside
//! compound bodies.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::trace;

use crate::base::Landmark;
use crate::confparse::{shift_spacevec, split_args, unquote};
use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::graph::{
    CompoundClass, ElementClass, ElementId, Formal, Port, REST_FORMAL, Router, TUNNEL_INPUT,
    TUNNEL_OUTPUT,
};
use crate::registry::find_file;

use super::{Token, TokenKind, tokenize};

/// Parse a configuration string into a router.
pub fn parse_string(source: &str, filename: &str, errh: &mut dyn ErrorSink) -> Router {
    Parser::new(source, filename, None, errh).run()
}

/// Parse a configuration file; `require(library ...)` paths resolve
/// relative to its directory.
pub fn parse_file(path: &Path, errh: &mut dyn ErrorSink) -> std::io::Result<Router> {
    let source = fs::read_to_string(path)?;
    let filename = path.display().to_string();
    let dir = path.parent().map(Path::to_path_buf);
    Ok(Parser::new(&source, &filename, dir, errh).run())
}

// ============================================================================
// PORT SPECIFICATIONS
// ============================================================================

/// A bracketed port list attached to one side of a chain element.
/// `[0,1]` lists ports; a trailing comma (`[2,]`) or empty brackets
/// mark the final port expandable.
#[derive(Clone, Debug, Default)]
struct PortSpec {
    present: bool,
    ports: Vec<u32>,
    expandable: bool,
}

impl PortSpec {
    fn implied(n: u32) -> Self {
        PortSpec {
            present: n > 0,
            ports: (0..n).collect(),
            expandable: false,
        }
    }

    /// Stored-entry count, matching the original encoding where the
    /// expandable sentinel occupies a slot.
    fn len(&self) -> usize {
        if self.present {
            self.ports.len() + usize::from(self.expandable)
        } else {
            0
        }
    }
}

/// One resolved chain element with its port specifications.
#[derive(Clone, Debug)]
struct EltRef {
    element: ElementId,
    input: PortSpec,
    output: PortSpec,
}

/// An element list entry before elements are materialized.
struct Pending {
    name: SmolStr,
    /// Set when the name token referred to a known class.
    class_ref: Option<ElementClass>,
    decl_type: Option<ElementClass>,
    bare: bool,
    config: String,
    landmark: Landmark,
}

// ============================================================================
// PARSER
// ============================================================================

pub struct Parser<'e> {
    tokens: Vec<Token>,
    pos: usize,
    errh: &'e mut dyn ErrorSink,
    /// Lazily created primitive classes, one shared instance per name.
    base_types: FxHashMap<SmolStr, ElementClass>,
    /// Declared-class snapshots of enclosing routers, outermost first.
    class_scopes: Vec<Vec<ElementClass>>,
    /// Libraries already inlined by `require(library ...)`.
    libraries: Vec<PathBuf>,
    /// Directory of the file being parsed, for library resolution.
    file_dir: Option<PathBuf>,
    compound_depth: usize,
    group_depth: usize,
    anon_class_count: usize,
    ignore_line_directives: bool,
}

impl<'e> Parser<'e> {
    pub fn new(
        source: &str,
        filename: &str,
        file_dir: Option<PathBuf>,
        errh: &'e mut dyn ErrorSink,
    ) -> Self {
        let tokens = tokenize(source, filename, false, errh);
        Self {
            tokens,
            pos: 0,
            errh,
            base_types: FxHashMap::default(),
            class_scopes: Vec::new(),
            libraries: Vec::new(),
            file_dir,
            compound_depth: 0,
            group_depth: 0,
            anon_class_count: 0,
            ignore_line_directives: false,
        }
    }

    /// Parse every top-level statement and finish the router.
    pub fn run(mut self) -> Router {
        let landmark = self
            .tokens
            .first()
            .map(|t| t.landmark.clone())
            .unwrap_or_default();
        let mut router = Router::new(landmark);
        while self.ystatement(&mut router, None) {}
        router.assign_element_names();
        router
    }

    // ------------------------------------------------------------------
    // token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn lex(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if t.kind != TokenKind::Eof {
            self.pos += 1;
        }
        t
    }

    fn unlex(&mut self, t: &Token) {
        if t.kind != TokenKind::Eof {
            debug_assert!(self.pos > 0);
            self.pos -= 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            let lm = self.peek().landmark.clone();
            self.err(&lm, format!("expected {}", kind.name()));
            false
        }
    }

    fn expect_quiet(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn err(&mut self, landmark: &Landmark, msg: impl Into<String>) {
        self.errh.error(landmark, msg.into());
    }

    fn warn(&mut self, landmark: &Landmark, msg: impl Into<String>) {
        self.errh.warning(landmark, msg.into());
    }

    fn near(t: &Token) -> String {
        if t.kind == TokenKind::Eof {
            "end of file".to_string()
        } else {
            format!("'{}'", t.text)
        }
    }

    // ------------------------------------------------------------------
    // element classes
    // ------------------------------------------------------------------

    /// Look up a class name without creating it: the current router's
    /// declarations, enclosing scopes, then previously seen base
    /// types.
    fn element_type(&self, router: &Router, name: &str) -> Option<ElementClass> {
        if let Some(c) = router.declared_type(name) {
            return Some(c);
        }
        for scope in self.class_scopes.iter().rev() {
            if let Some(c) = scope.iter().rev().find(|c| c.name() == name) {
                return Some(c.clone());
            }
        }
        self.base_types.get(name).cloned()
    }

    /// Look up a class name, creating a primitive placeholder if
    /// unknown. All references to one name share a class instance.
    fn force_element_type(
        &mut self,
        router: &Router,
        name: &SmolStr,
        landmark: &Landmark,
    ) -> ElementClass {
        if let Some(c) = self.element_type(router, name) {
            return c;
        }
        if router.eindex(name).is_some() {
            self.err(
                landmark,
                format!("'{name}' was previously used as an element name"),
            );
        }
        self.base_types
            .entry(name.clone())
            .or_insert_with(|| ElementClass::primitive(name.clone()))
            .clone()
    }

    // ------------------------------------------------------------------
    // elements
    // ------------------------------------------------------------------

    /// Synthesized name for an anonymous element; finalized by
    /// `assign_element_names`.
    fn anon_element_name(&self, router: &Router, class_name: &str) -> SmolStr {
        let tunnels = usize::from(router.eindex(TUNNEL_INPUT).is_some())
            + usize::from(router.eindex(TUNNEL_OUTPUT).is_some());
        let n = router.nelements() - tunnels + 1;
        SmolStr::new(format!(";{class_name}@{n}"))
    }

    fn make_element(
        &mut self,
        router: &mut Router,
        name: SmolStr,
        class: ElementClass,
        config: String,
        landmark: Landmark,
    ) -> ElementId {
        for component in name.split('/') {
            if !component.is_empty()
                && !component.starts_with(';')
                && component.bytes().all(|b| b.is_ascii_digit())
            {
                self.err(
                    &landmark,
                    format!("element name '{name}' has all-digit component"),
                );
                break;
            }
        }
        router.add_element(name, class, config, landmark)
    }

    // ------------------------------------------------------------------
    // ports
    // ------------------------------------------------------------------

    /// Parse an optional `[...]` port list.
    fn yport(&mut self) -> PortSpec {
        let tbrack = self.lex();
        if !tbrack.is(TokenKind::LBracket) {
            self.unlex(&tbrack);
            return PortSpec::default();
        }

        let mut spec = PortSpec {
            present: true,
            ports: Vec::new(),
            expandable: false,
        };
        loop {
            let t = self.lex();
            match t.kind {
                TokenKind::Ident => {
                    let text = t.text.as_str();
                    match text.parse::<u32>() {
                        Ok(p) => spec.ports.push(p),
                        Err(_) => {
                            self.err(&t.landmark, "syntax error: port number should be integer");
                            spec.ports.push(0);
                        }
                    }
                }
                TokenKind::RBracket => {
                    // ']' where a port was expected: implicit zero port
                    // plus the expandable sentinel
                    if spec.ports.is_empty() {
                        spec.ports.push(0);
                    }
                    spec.expandable = true;
                    return spec;
                }
                _ => {
                    self.err(&t.landmark, "syntax error: expected port number");
                    self.unlex(&t);
                    if spec.ports.is_empty() {
                        spec.present = false;
                    }
                    return spec;
                }
            }

            let t = self.lex();
            if t.is(TokenKind::RBracket) {
                return spec;
            } else if !t.is(TokenKind::Comma) {
                self.err(&t.landmark, "syntax error: expected ','");
                self.unlex(&t);
            }
        }
    }

    // ------------------------------------------------------------------
    // element lists
    // ------------------------------------------------------------------

    /// Parse a comma-separated element list with port specifications.
    /// `in_allowed` is true when a previous chain segment exists (so
    /// implicit references mean `output`).
    fn yelement(&mut self, router: &mut Router, in_allowed: bool) -> Option<Vec<EltRef>> {
        let mut pendings: Vec<Pending> = Vec::new();
        let mut specs: Vec<(PortSpec, PortSpec)> = Vec::new();
        let mut any_implicit = false;
        let mut any_ports = false;
        let mut t;

        loop {
            let mut in_spec = self.yport();
            let mut out_spec = PortSpec::default();
            let mut this_implicit = false;

            t = self.lex();
            let landmark = t.landmark.clone();
            let name: SmolStr;
            let mut class_ref: Option<ElementClass> = None;
            let mut bare = false;

            match t.kind {
                TokenKind::Ident => {
                    name = t.text.clone();
                    class_ref = self.element_type(router, &name);
                    bare = true;
                }
                TokenKind::LBrace => {
                    let class = self.ycompound(router, SmolStr::default(), &landmark);
                    name = SmolStr::default();
                    class_ref = Some(class);
                }
                TokenKind::LParen => {
                    let (class, gin, gout) = self.ygroup(router, &landmark);
                    name = SmolStr::default();
                    class_ref = Some(class);
                    // a group carries implied, overridable port lists
                    // covering all its inputs and outputs
                    if !in_spec.present {
                        in_spec = PortSpec::implied(gin);
                    }
                    out_spec = PortSpec::implied(gout);
                }
                _ => {
                    let nested = self.compound_depth > 0 || self.group_depth > 0;
                    if nested && matches!(t.kind, TokenKind::Arrow | TokenKind::Arrow2) {
                        this_implicit = !in_allowed && (in_spec.present || pendings.is_empty());
                    } else if nested && t.kind == TokenKind::Comma {
                        this_implicit = in_spec.present;
                    } else if nested && t.kind != TokenKind::ColonColon {
                        this_implicit = in_allowed && (in_spec.present || pendings.is_empty());
                    }

                    if this_implicit {
                        any_implicit = true;
                        if in_allowed {
                            name = SmolStr::new(TUNNEL_OUTPUT);
                        } else {
                            name = SmolStr::new(TUNNEL_INPUT);
                            std::mem::swap(&mut in_spec, &mut out_spec);
                        }
                        self.unlex(&t);
                    } else {
                        if in_spec.present {
                            self.err(&t.landmark, "stranded port ignored");
                        }
                        if pendings.is_empty() {
                            if in_allowed {
                                self.unlex(&t);
                            } else {
                                self.err(
                                    &t.landmark,
                                    format!("syntax error near {}", Self::near(&t)),
                                );
                            }
                            return None;
                        }
                        break;
                    }
                }
            }

            let mut pending = Pending {
                name,
                class_ref,
                decl_type: None,
                bare,
                config: String::new(),
                landmark: landmark.clone(),
            };

            // ':: CLASS' declaration
            t = self.lex();
            if t.is(TokenKind::ColonColon) && !this_implicit {
                t = self.lex();
                match t.kind {
                    TokenKind::Ident => {
                        let (text, lm) = (t.text.clone(), t.landmark.clone());
                        pending.decl_type = Some(self.force_element_type(router, &text, &lm));
                    }
                    TokenKind::LBrace => {
                        let lm = t.landmark.clone();
                        pending.decl_type =
                            Some(self.ycompound(router, SmolStr::default(), &lm));
                    }
                    _ => {
                        self.err(&t.landmark, "missing element type in declaration");
                        let (pname, plm) = (pending.name.clone(), pending.landmark.clone());
                        pending.decl_type = Some(self.force_element_type(router, &pname, &plm));
                        self.unlex(&t);
                    }
                }
                pending.bare = false;
                t = self.lex();
            }

            // configuration string
            if t.is(TokenKind::LParen) && !this_implicit {
                if router.eindex(&pending.name).is_some() {
                    self.err(&t.landmark, "configuration string ignored on element reference");
                }
                let cfg = self.lex();
                if cfg.is(TokenKind::Config) {
                    pending.config = cfg.text.to_string();
                } else {
                    self.unlex(&cfg);
                }
                self.expect(TokenKind::RParen);
                pending.bare = false;
                t = self.lex();
            }

            // final port
            if t.is(TokenKind::LBracket) && !this_implicit {
                self.unlex(&t);
                out_spec = self.yport();
                t = self.lex();
            }
            any_ports = any_ports || in_spec.present || out_spec.present;

            pendings.push(pending);
            specs.push((in_spec, out_spec));

            if !t.is(TokenKind::Comma) {
                break;
            }
        }

        self.unlex(&t);

        if any_implicit && in_allowed && matches!(t.kind, TokenKind::Arrow | TokenKind::Arrow2) {
            self.err(&t.landmark, "implicit ports used in the middle of a chain");
        }

        // spread class and configuration across a standalone
        // multiple-element declaration: `a, b, c :: Class(cfg);`
        if pendings.len() > 1
            && !in_allowed
            && !matches!(t.kind, TokenKind::Arrow | TokenKind::Arrow2)
            && !any_ports
            && !any_implicit
        {
            let all_bare_before = pendings[..pendings.len() - 1].iter().all(|p| p.bare);
            let last = pendings.last().unwrap();
            if all_bare_before && last.decl_type.is_some() {
                let dt = last.decl_type.clone();
                let cfg = last.config.clone();
                let n = pendings.len() - 1;
                for p in &mut pendings[..n] {
                    p.decl_type = dt.clone();
                    p.config = cfg.clone();
                }
            }
        }

        // materialize elements
        let mut out = Vec::new();
        for (p, (in_spec, out_spec)) in pendings.into_iter().zip(specs) {
            let id = if p.class_ref.is_some() || router.eindex(&p.name).is_none() {
                let mut class_ref = p.class_ref;
                if p.decl_type.is_some()
                    && (class_ref.is_some()
                        || p.name == p.decl_type.as_ref().unwrap().name())
                {
                    self.err(
                        &p.landmark,
                        format!("class '{}' used as element name", p.name),
                    );
                } else if class_ref.is_none() && p.decl_type.is_none() {
                    // a bare unknown name is a class reference
                    class_ref = Some(self.force_element_type(router, &p.name, &p.landmark));
                }
                let (name, class) = match class_ref {
                    Some(class) => {
                        let n = self.anon_element_name(router, class.name());
                        (n, class)
                    }
                    None => (p.name, p.decl_type.clone().unwrap()),
                };
                self.make_element(router, name, class, p.config, p.landmark)
            } else {
                let id = router.eindex(&p.name).unwrap();
                if p.decl_type.is_some() {
                    let prev = router.element(id).landmark.clone();
                    self.err(
                        &p.landmark,
                        format!("redeclaration of element '{}' (first declared at {prev})", p.name),
                    );
                }
                id
            };
            out.push(EltRef {
                element: id,
                input: in_spec,
                output: out_spec,
            });
        }
        Some(out)
    }

    // ------------------------------------------------------------------
    // connections
    // ------------------------------------------------------------------

    /// Warn about port lists that cannot take part in a connection.
    fn check_useless(&mut self, refs: &[EltRef], isoutput: bool) {
        for r in refs {
            let spec = if isoutput { &r.output } else { &r.input };
            if spec.len() > 0 {
                let lm = self.peek().landmark.clone();
                self.warn(
                    &lm,
                    if isoutput {
                        "output ports ignored at end of chain"
                    } else {
                        "input ports ignored at start of chain"
                    },
                );
                break;
            }
        }
    }

    fn analyze_side(refs: &[EltRef], isoutput: bool) -> (usize, usize) {
        let mut min_ports = 0;
        let mut expandable = 0;
        for r in refs {
            let spec = if isoutput { &r.output } else { &r.input };
            let n = spec.len();
            if n <= 1 {
                min_ports += 1;
            } else if spec.expandable {
                min_ports += n - 1;
                expandable += 1;
            } else {
                min_ports += n;
            }
        }
        (min_ports, expandable)
    }

    /// Pair the output ports of `outputs` with the input ports of
    /// `inputs` and add the resulting connections.
    fn connect_all(
        &mut self,
        router: &mut Router,
        outputs: &[EltRef],
        inputs: &[EltRef],
        connector: TokenKind,
        landmark: &Landmark,
    ) {
        let sides: [&[EltRef]; 2] = [inputs, outputs];
        let mut minp = [0usize; 2];
        let mut expandable = [0usize; 2];
        for k in 0..2 {
            let (m, e) = Self::analyze_side(sides[k], k == 1);
            minp[k] = m;
            expandable[k] = e;
        }

        if expandable[0] + expandable[1] > 1 {
            self.err(landmark, "at most one expandable port allowed per connection");
            expandable[usize::from(minp[0] < minp[1])] = 0;
        }

        if connector == TokenKind::Arrow2 {
            // '=>' reads a missing port list as an expandable port
            for k in 0..2 {
                let spec_len = match sides[k].first() {
                    Some(r) => if k == 1 { r.output.len() } else { r.input.len() },
                    None => 0,
                };
                if minp[k] == 1 && minp[1 - k] > 1 && spec_len == 0 {
                    expandable[k] = 1;
                }
            }
        }

        let mut step = [false; 2];
        let mut nexpandable = [0i64; 2];
        for k in 0..2 {
            step[k] = minp[k] > 1 || expandable[k] > 0;
            nexpandable[k] = if expandable[k] > 0 {
                minp[1 - k] as i64 - minp[k] as i64
            } else {
                0
            };
        }

        if step[0] && step[1] {
            if expandable[0] == 0 && expandable[1] == 0 && minp[0] != minp[1] {
                self.err(
                    landmark,
                    format!(
                        "connection mismatch: {} outputs connected to {} inputs",
                        minp[1], minp[0]
                    ),
                );
            } else if expandable[0] == 0 && minp[0] < minp[1] {
                self.err(
                    landmark,
                    format!(
                        "connection mismatch: {} or more outputs connected to {} inputs",
                        minp[1], minp[0]
                    ),
                );
            } else if expandable[1] == 0 && minp[1] < minp[0] {
                self.err(
                    landmark,
                    format!(
                        "connection mismatch: {} outputs connected to {} or more inputs",
                        minp[1], minp[0]
                    ),
                );
            }
        } else if !step[0] && !step[1] {
            step[0] = true;
        }

        #[derive(Default)]
        struct Cursor {
            idx: usize,
            ppos: usize,
            port: Option<u32>,
        }
        let mut cur = [Cursor::default(), Cursor::default()];

        while cur[0].idx < inputs.len() && cur[1].idx < outputs.len() {
            for k in 0..2 {
                if cur[k].port.is_none() {
                    let r = &sides[k][cur[k].idx];
                    let spec = if k == 1 { &r.output } else { &r.input };
                    cur[k].port =
                        Some(spec.ports.first().copied().unwrap_or(0));
                }
            }

            router.add_connection(
                Port::new(outputs[cur[1].idx].element, cur[1].port.unwrap()),
                Port::new(inputs[cur[0].idx].element, cur[0].port.unwrap()),
                landmark.clone(),
            );

            for k in 0..2 {
                if !step[k] {
                    continue;
                }
                let r = &sides[k][cur[k].idx];
                let spec = if k == 1 { &r.output } else { &r.input };
                cur[k].ppos += 1;
                if cur[k].ppos < spec.ports.len() {
                    cur[k].port = Some(spec.ports[cur[k].ppos]);
                } else if spec.present && spec.expandable && nexpandable[k] > 0 {
                    let last = *spec.ports.last().unwrap();
                    cur[k].port =
                        Some(last + (cur[k].ppos - (spec.ports.len() - 1)) as u32);
                    nexpandable[k] -= 1;
                } else if spec.len() == 0 && minp[k] == 1 && nexpandable[k] > 0 {
                    cur[k].port = Some(cur[k].ppos as u32);
                    nexpandable[k] -= 1;
                } else {
                    cur[k].port = None;
                    cur[k].ppos = 0;
                    cur[k].idx += 1;
                }
            }
        }
    }

    /// Parse one connection chain.
    fn yconnection(&mut self, router: &mut Router) -> bool {
        let mut elements1: Vec<EltRef> = Vec::new();
        let mut connector = TokenKind::Arrow;

        loop {
            let elements2 = match self.yelement(router, !elements1.is_empty()) {
                Some(e) => e,
                None => {
                    self.check_useless(&elements1, true);
                    return !elements1.is_empty();
                }
            };

            if elements1.is_empty() {
                self.check_useless(&elements2, false);
            } else {
                let lm = self.peek().landmark.clone();
                self.connect_all(router, &elements1, &elements2, connector, &lm);
            }

            loop {
                let t = self.lex();
                match t.kind {
                    TokenKind::Comma | TokenKind::ColonColon => {
                        self.err(
                            &t.landmark,
                            format!("syntax error before {}", Self::near(&t)),
                        );
                        continue;
                    }
                    TokenKind::Arrow | TokenKind::Arrow2 => {
                        connector = t.kind;
                    }
                    TokenKind::Ident
                    | TokenKind::LBrace
                    | TokenKind::RBrace
                    | TokenKind::LBracket
                    | TokenKind::RParen
                    | TokenKind::BarBar
                    | TokenKind::Elementclass
                    | TokenKind::Require
                    | TokenKind::Provide
                    | TokenKind::Define => {
                        self.unlex(&t);
                        self.check_useless(&elements2, true);
                        return true;
                    }
                    TokenKind::Semicolon | TokenKind::Eof => {
                        self.check_useless(&elements2, true);
                        return true;
                    }
                    _ => {
                        self.err(
                            &t.landmark,
                            format!("syntax error near {}", Self::near(&t)),
                        );
                        return true;
                    }
                }
                break;
            }

            elements1 = elements2;
        }
    }

    // ------------------------------------------------------------------
    // compound classes and groups
    // ------------------------------------------------------------------

    /// Parse a compound body's formal parameters, through the `|`.
    fn ycompound_arguments(&mut self, body: &mut Router) {
        let mut order_error = false;
        loop {
            let t1 = self.lex();
            let formal = match t1.kind {
                TokenKind::Ident => {
                    let t2 = self.lex();
                    if t2.is(TokenKind::Variable) {
                        Formal::keyword(t2.text.clone(), t1.text.clone())
                    } else {
                        if !body.formals.is_empty() {
                            self.err(&t2.landmark, "expected variable");
                        }
                        self.unlex(&t2);
                        self.unlex(&t1);
                        break;
                    }
                }
                TokenKind::Variable => Formal::positional(t1.text.clone()),
                TokenKind::Bar => break,
                _ => {
                    if !body.formals.is_empty() {
                        self.err(&t1.landmark, "expected variable");
                    }
                    self.unlex(&t1);
                    break;
                }
            };

            if let Some(kw) = &formal.keyword {
                if body
                    .formals
                    .iter()
                    .any(|f| f.keyword.as_deref() == Some(kw.as_str()))
                {
                    self.err(
                        &t1.landmark,
                        format!("repeated keyword parameter '{kw}' in compound element"),
                    );
                }
            }
            let was_positional = formal.keyword.is_none();
            if !body.add_formal(formal) {
                self.err(&t1.landmark, "parameter multiply defined");
            } else if !order_error && body.formals.len() > 1 {
                let prev = &body.formals[body.formals.len() - 2];
                let prev_rest =
                    prev.keyword.as_deref() == Some(REST_FORMAL) || prev.name == REST_FORMAL;
                if (was_positional && prev.keyword.is_some()) || prev_rest {
                    self.err(
                        &t1.landmark,
                        "compound element parameters out of order\n\
                         (The correct order is '[positional], [keywords], [__REST__]'.)",
                    );
                    order_error = true;
                }
            }

            let tsep = self.lex();
            if tsep.is(TokenKind::Bar) {
                break;
            } else if !tsep.is(TokenKind::Comma) {
                self.err(&tsep.landmark, "expected ',' or '|'");
                self.unlex(&tsep);
                break;
            }
        }
    }

    /// Parse a compound class after its opening `{`: one or more
    /// alternatives joined by `||`, with an optional trailing
    /// `... Class` fallback.
    fn ycompound(
        &mut self,
        outer: &mut Router,
        name: SmolStr,
        landmark: &Landmark,
    ) -> ElementClass {
        let anonymous = name.is_empty();
        let printable = if anonymous {
            self.anon_class_count += 1;
            SmolStr::new(format!("<anonymous{}>", self.anon_class_count))
        } else {
            name.clone()
        };

        let mut alternatives: Vec<Router> = Vec::new();
        let mut extension: Option<ElementClass> = None;

        loop {
            let dots = self.lex();
            if dots.is(TokenKind::Dots3) {
                let tname = self.lex();
                let ext_name = if tname.is(TokenKind::Ident) {
                    tname.text.clone()
                } else {
                    self.unlex(&tname);
                    if anonymous {
                        self.err(
                            &dots.landmark,
                            "cannot extend anonymous compound element class",
                        );
                        SmolStr::new(crate::graph::ERROR_CLASS)
                    } else {
                        name.clone()
                    }
                };
                extension = Some(self.force_element_type(outer, &ext_name, &dots.landmark));

                let t = self.lex();
                if alternatives.is_empty() || !t.is(TokenKind::RBrace) {
                    self.err(
                        &t.landmark,
                        "'...' should occur last, after one or more compounds",
                    );
                }
                if t.is(TokenKind::RBrace) && !alternatives.is_empty() {
                    break;
                }
                self.unlex(&t);
                continue;
            }
            self.unlex(&dots);

            // one compound alternative
            let mut body = Router::named(name.clone(), landmark.clone());
            body.get_tunnel(TUNNEL_INPUT, landmark.clone());
            body.get_tunnel(TUNNEL_OUTPUT, landmark.clone());

            self.compound_depth += 1;
            self.class_scopes.push(outer.declared_types().to_vec());
            self.ycompound_arguments(&mut body);
            while self.ystatement(&mut body, Some(TokenKind::RBrace)) {}
            self.class_scopes.pop();
            self.compound_depth -= 1;

            self.finish_compound_body(&mut body, &printable);
            alternatives.push(body);

            let t = self.lex();
            if t.is(TokenKind::BarBar) {
                continue;
            }
            if t.is(TokenKind::Dots3) {
                // trailing '... Class' fallback; handled at loop top
                self.unlex(&t);
                continue;
            }
            if !t.is(TokenKind::RBrace) {
                self.err(&t.landmark, format!("expected {}", TokenKind::RBrace.name()));
                self.unlex(&t);
            }
            break;
        }

        // build the overload chain back to front
        let mut chain = extension;
        for body in alternatives.into_iter().rev() {
            chain = Some(ElementClass::new_compound(CompoundClass {
                name: name.clone(),
                printable_name: printable.clone(),
                landmark: landmark.clone(),
                body,
                overload: chain,
            }));
        }
        let first = chain
            .unwrap_or_else(|| ElementClass::primitive(crate::graph::ERROR_CLASS));

        if !anonymous {
            outer.add_declared_type(first.clone());
        }
        trace!(class = %printable, "parsed compound class");
        first
    }

    /// Finish one compound body: finalize names and check that tunnel
    /// ports are contiguously used.
    fn finish_compound_body(&mut self, body: &mut Router, printable: &str) {
        body.assign_element_names();
        for (which, is_output) in [(TUNNEL_INPUT, false), (TUNNEL_OUTPUT, true)] {
            if let Some(id) = body.eindex(which) {
                let context = format!("'{printable}' {which}");
                body.check_tunnel_ports(id, is_output, &context, self.errh);
            }
        }
    }

    /// Parse an anonymous group `( ... )` as an anonymous compound.
    /// Returns the class and its derived (inputs, outputs) arity.
    fn ygroup(&mut self, outer: &mut Router, landmark: &Landmark) -> (ElementClass, u32, u32) {
        self.anon_class_count += 1;
        let printable = SmolStr::new(format!("<anonymous{}>", self.anon_class_count));

        let mut body = Router::new(landmark.clone());
        body.get_tunnel(TUNNEL_INPUT, landmark.clone());
        body.get_tunnel(TUNNEL_OUTPUT, landmark.clone());

        self.group_depth += 1;
        self.class_scopes.push(outer.declared_types().to_vec());
        while self.ystatement(&mut body, Some(TokenKind::RParen)) {}
        self.expect(TokenKind::RParen);
        self.class_scopes.pop();
        self.group_depth -= 1;

        self.finish_compound_body(&mut body, "<anonymous group>");
        let (nin, nout) = body.tunnel_arity();

        let class = ElementClass::new_compound(CompoundClass {
            name: SmolStr::default(),
            printable_name: printable,
            landmark: landmark.clone(),
            body,
            overload: None,
        });
        (class, nin, nout)
    }

    /// Parse an `elementclass` declaration: compound or synonym.
    fn yelementclass(&mut self, router: &mut Router) {
        let tname = self.lex();
        let mut eclass_name = SmolStr::default();
        if !tname.is(TokenKind::Ident) {
            self.unlex(&tname);
            self.err(&tname.landmark, "expected element type name");
        } else if router.eindex(&tname.text).is_some() {
            self.err(
                &tname.landmark,
                format!("'{}' already used as an element name", tname.text),
            );
        } else {
            eclass_name = tname.text.clone();
        }

        let tnext = self.lex();
        if tnext.is(TokenKind::LBrace) {
            let lm = tname.landmark.clone();
            let _ = self.ycompound(router, eclass_name, &lm);
        } else if tnext.is(TokenKind::Ident) {
            let (text, lm) = (tnext.text.clone(), tnext.landmark.clone());
            let of = self.force_element_type(router, &text, &lm);
            if !eclass_name.is_empty() {
                router.add_declared_type(ElementClass::synonym(eclass_name, of));
            }
        } else {
            self.err(
                &tnext.landmark,
                format!("syntax error near {}", Self::near(&tnext)),
            );
        }
    }

    // ------------------------------------------------------------------
    // directives
    // ------------------------------------------------------------------

    /// Read the parenthesized configuration of a directive, returning
    /// its split arguments.
    fn directive_args(&mut self) -> Option<(Vec<String>, Landmark)> {
        if !self.expect(TokenKind::LParen) {
            return None;
        }
        let cfg = self.lex();
        let (text, landmark) = if cfg.is(TokenKind::Config) {
            (cfg.text.to_string(), cfg.landmark.clone())
        } else {
            self.unlex(&cfg);
            (String::new(), cfg.landmark.clone())
        };
        self.expect(TokenKind::RParen);
        self.expect_quiet(TokenKind::Semicolon);
        Some((split_args(&text), landmark))
    }

    fn yrequire(&mut self, router: &mut Router) {
        let Some((args, landmark)) = self.directive_args() else {
            return;
        };
        for arg in args {
            let mut rest = arg.clone();
            let mut rtype = shift_spacevec(&mut rest);
            if rtype.is_empty() {
                continue;
            }
            // a bare word means 'require(package WORD)'
            if rtype != "compact_config" && rtype != "package" && rtype != "library" && rest.is_empty()
            {
                rest = rtype.clone();
                rtype = "package".to_string();
            }

            match rtype.as_str() {
                "compact_config" if rest.is_empty() => {
                    router.add_requirement("compact_config", "");
                }
                "package" if !rest.is_empty() => {
                    let value = String::from_utf8_lossy(&unquote(&rest)).to_string();
                    router.add_requirement("package", value);
                }
                "library" if !rest.is_empty() => {
                    let value = String::from_utf8_lossy(&unquote(&rest)).to_string();
                    self.yrequire_library(router, &value, &landmark);
                }
                _ => {
                    self.err(&landmark, "syntax error at requirement");
                }
            }
        }
    }

    /// Resolve and inline a `require(library ...)` file.
    fn yrequire_library(&mut self, router: &mut Router, value: &str, landmark: &Landmark) {
        if self.compound_depth > 0 || self.group_depth > 0 {
            self.err(landmark, "'require library' must be used at file scope");
            return;
        }

        let Some(path) = find_file(value, "conf", self.file_dir.as_deref()) else {
            self.err(
                landmark,
                format!("library '{value}' not found in CLICKPATH/conf"),
            );
            return;
        };
        if self.libraries.contains(&path) {
            return; // each library is inlined at most once
        }
        self.libraries.push(path.clone());

        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) => {
                self.err(landmark, format!("library '{}': {e}", path.display()));
                return;
            }
        };

        trace!(library = %path.display(), "inlining required library");
        let filename = path.display().to_string();
        let lib_tokens = tokenize(&data, &filename, self.ignore_line_directives, self.errh);
        let saved_tokens = std::mem::replace(&mut self.tokens, lib_tokens);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let saved_dir = std::mem::replace(&mut self.file_dir, path.parent().map(Path::to_path_buf));

        while self.ystatement(router, None) {}

        self.tokens = saved_tokens;
        self.pos = saved_pos;
        self.file_dir = saved_dir;
    }

    fn yprovide(&mut self, router: &mut Router) {
        let Some((args, _)) = self.directive_args() else {
            return;
        };
        for arg in args {
            let mut rest = arg;
            loop {
                let word = shift_spacevec(&mut rest);
                if word.is_empty() {
                    break;
                }
                router.add_provision(String::from_utf8_lossy(&unquote(&word)).to_string());
            }
        }
    }

    fn ydefine(&mut self, router: &mut Router) {
        let Some((args, landmark)) = self.directive_args() else {
            return;
        };
        for arg in args {
            if arg.is_empty() {
                continue;
            }
            let mut rest = arg;
            let var = shift_spacevec(&mut rest);
            let valid = var.len() >= 2
                && var.starts_with('$')
                && var[1..]
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_');
            if !valid {
                self.err(&landmark, "bad 'define' declaration: not a variable");
            } else if !router.scope.define(&var[1..], rest) {
                self.err(
                    &landmark,
                    format!("parameter '{}' multiply defined", &var[1..]),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    /// Parse one statement. `nested` names the closer that ends the
    /// surrounding construct. Returns false when the statement list is
    /// done.
    fn ystatement(&mut self, router: &mut Router, nested: Option<TokenKind>) -> bool {
        let t = self.lex();
        match t.kind {
            TokenKind::Ident
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::LParen
            | TokenKind::Arrow
            | TokenKind::Arrow2 => {
                self.unlex(&t);
                self.yconnection(router);
                true
            }
            TokenKind::Elementclass => {
                self.yelementclass(router);
                true
            }
            TokenKind::Require => {
                self.yrequire(router);
                true
            }
            TokenKind::Provide => {
                self.yprovide(router);
                true
            }
            TokenKind::Define => {
                self.ydefine(router);
                true
            }
            TokenKind::Semicolon => true,
            TokenKind::RBrace | TokenKind::BarBar | TokenKind::Dots3 => {
                if nested != Some(TokenKind::RBrace) {
                    self.err(&t.landmark, format!("syntax error near {}", Self::near(&t)));
                    return true;
                }
                self.unlex(&t);
                false
            }
            TokenKind::RParen => {
                if nested != Some(TokenKind::RParen) {
                    self.err(&t.landmark, format!("syntax error near {}", Self::near(&t)));
                    return true;
                }
                self.unlex(&t);
                false
            }
            TokenKind::Eof => {
                if let Some(closer) = nested {
                    self.err(&t.landmark, format!("expected {}", closer.name()));
                }
                false
            }
            _ => {
                self.err(&t.landmark, format!("syntax error near {}", Self::near(&t)));
                true
            }
        }
    }
}
