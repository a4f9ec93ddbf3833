//! Processing inference: assigning push/pull disciplines to ports.
//!
//! Each element class declares a processing code (`h` push, `l` pull,
//! `a` agnostic, uppercase for decorated agnostic). Inference
//! propagates definite disciplines across connections and, via flow
//! codes, through agnostic elements, to fixpoint; residual agnostic
//! ports resolve to push. Validation then rejects reused push outputs
//! and pull inputs, unconnected ports, and port counts outside the
//! class's port-count code.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::errors::{ErrorSink, ErrorSinkExt, SilentSink};
use crate::graph::{
    Connection, Element, ElementId, Port, Router, TUNNEL_INPUT, TUNNEL_OUTPUT, select_overload,
};
use crate::registry::{ElementMap, OutputCount, PortCount, Traits};

use super::flow::{FlowCode, port_flow};

/// Port discipline bits. `AGNOSTIC | PUSH` is an agnostic port
/// resolved to push; `PERROR` marks ports involved in an error.
pub const PUSH: u8 = 1;
pub const PULL: u8 = 2;
pub const AGNOSTIC: u8 = 4;
pub const PERROR: u8 = 8;

const LETTERS: &[u8; 8] = b"ahlXahlX";
const DECORATED_LETTERS: &[u8; 8] = b"ahlXaHLX";

/// Input side index.
const END_TO: usize = 0;
/// Output side index.
const END_FROM: usize = 1;

/// Resolved per-element codes used during inference.
struct ElemCodes {
    class_name: SmolStr,
    processing_code: String,
    flow: Option<FlowCode>,
    port_count: Result<PortCount, ()>,
    known: bool,
}

/// The inference engine and its results for one router.
pub struct Processing<'r> {
    router: &'r Router,
    /// Cumulative port index per element, per side, with a final
    /// sentinel entry.
    pidx: [Vec<usize>; 2],
    /// Owning element of each port index.
    elt: [Vec<ElementId>; 2],
    processing: [Vec<u8>; 2],
    codes: Vec<ElemCodes>,
}

impl<'r> Processing<'r> {
    /// Infer processing for `router`, resolving residual agnostic
    /// ports to push and validating connections.
    pub fn new(router: &'r Router, emap: &ElementMap, errh: &mut dyn ErrorSink) -> Self {
        Self::create(router, emap, "", true, true, errh)
    }

    /// Inference for a compound body: tunnel ports are seeded from
    /// the enclosing processing code, and agnostic ports stay
    /// agnostic so the derived codes keep them visible.
    pub fn new_compound(
        router: &'r Router,
        emap: &ElementMap,
        compound_pcode: &str,
        errh: &mut dyn ErrorSink,
    ) -> Self {
        Self::create(router, emap, compound_pcode, false, false, errh)
    }

    fn create(
        router: &'r Router,
        emap: &ElementMap,
        compound_pcode: &str,
        resolve_agnostics: bool,
        validate: bool,
        errh: &mut dyn ErrorSink,
    ) -> Self {
        let mut p = Processing {
            router,
            pidx: [Vec::new(), Vec::new()],
            elt: [Vec::new(), Vec::new()],
            processing: [Vec::new(), Vec::new()],
            codes: Vec::new(),
        };
        p.create_pidx(errh);
        p.collect_codes(emap, compound_pcode, errh);

        let mut conn: Vec<Connection> = router.connections().to_vec();
        let mut invalid = vec![false; conn.len()];
        p.initial_processing(errh);
        p.check_processing(&mut conn, &mut invalid, errh);
        if resolve_agnostics {
            p.resolve_agnostics();
        }
        if validate {
            p.check_connections(&conn, &invalid, errh);
        }
        p
    }

    // ------------------------------------------------------------------
    // construction
    // ------------------------------------------------------------------

    fn create_pidx(&mut self, errh: &mut dyn ErrorSink) {
        let mut ci = 0usize;
        let mut co = 0usize;
        for (_, e) in self.router.elements() {
            self.pidx[END_TO].push(ci);
            self.pidx[END_FROM].push(co);
            ci += e.ninputs() as usize;
            co += e.noutputs() as usize;
        }
        self.pidx[END_TO].push(ci);
        self.pidx[END_FROM].push(co);

        for (id, e) in self.router.elements() {
            for _ in 0..e.ninputs() {
                self.elt[END_TO].push(id);
            }
            for _ in 0..e.noutputs() {
                self.elt[END_FROM].push(id);
            }
            if e.dead && (e.ninputs() > 0 || e.noutputs() > 0) {
                errh.warning(
                    &e.landmark,
                    format!("dead element '{}' has live connections", e.name),
                );
            }
        }
    }

    fn collect_codes(&mut self, emap: &ElementMap, compound_pcode: &str, errh: &mut dyn ErrorSink) {
        let reversed = reverse_processing_code(compound_pcode);
        let mut warned: FxHashMap<SmolStr, ()> = FxHashMap::default();

        for (_, e) in self.router.elements() {
            if e.tunnel {
                let pcode = if e.name == TUNNEL_INPUT || e.name == TUNNEL_OUTPUT {
                    reversed.clone()
                } else {
                    String::new()
                };
                self.codes.push(ElemCodes {
                    class_name: SmolStr::new("<tunnel>"),
                    processing_code: pcode,
                    flow: None,
                    port_count: Ok(PortCount::unrestricted()),
                    known: true,
                });
                continue;
            }

            let codes = element_codes(e, emap, errh);
            if !codes.known
                && !warned.contains_key(&codes.class_name)
                && !e.dead
            {
                warned.insert(codes.class_name.clone(), ());
                errh.warning(
                    &e.landmark,
                    format!("unknown element class '{}'", codes.class_name),
                );
            }
            self.codes.push(codes);
        }
    }

    fn initial_processing(&mut self, errh: &mut dyn ErrorSink) {
        self.processing[END_TO] = vec![AGNOSTIC; self.npidx(false)];
        self.processing[END_FROM] = vec![AGNOSTIC; self.npidx(true)];

        for (id, e) in self.router.elements() {
            let pc = self.codes[id.index()].processing_code.clone();
            if pc.is_empty() {
                continue;
            }
            let (invals, outvals) = parse_processing_code(&pc, e.ninputs(), e.noutputs());
            let (invals, outvals) = match (invals, outvals) {
                (Some(i), Some(o)) => (i, o),
                _ => {
                    errh.error(
                        &e.landmark,
                        format!(
                            "syntax error in processing code '{}' for '{}'",
                            pc,
                            self.codes[id.index()].class_name
                        ),
                    );
                    continue;
                }
            };
            let start_in = self.pidx[END_TO][id.index()];
            let start_out = self.pidx[END_FROM][id.index()];
            for (i, v) in invals.into_iter().enumerate() {
                self.processing[END_TO][start_in + i] =
                    if v & AGNOSTIC != 0 { AGNOSTIC } else { v };
            }
            for (i, v) in outvals.into_iter().enumerate() {
                self.processing[END_FROM][start_out + i] =
                    if v & AGNOSTIC != 0 { AGNOSTIC } else { v };
            }
        }
    }

    /// Spread disciplines across connections to fixpoint. Agnostic
    /// elements couple their own inputs and outputs through synthetic
    /// intra-element connections derived from the flow code.
    fn check_processing(
        &mut self,
        conn: &mut Vec<Connection>,
        invalid: &mut Vec<bool>,
        errh: &mut dyn ErrorSink,
    ) {
        let real_count = conn.len();

        for i in 0..self.npidx(false) {
            if self.processing[END_TO][i] != AGNOSTIC {
                continue;
            }
            let eid = self.elt[END_TO][i];
            let e = self.router.element(eid);
            let port = i - self.pidx[END_TO][eid.index()];
            let opidx = self.pidx[END_FROM][eid.index()];
            let noutputs = e.noutputs() as usize;
            let reach = port_flow(
                self.codes[eid.index()].flow.as_ref(),
                port,
                false,
                noutputs,
            );
            for (j, reachable) in reach.into_iter().enumerate() {
                if reachable && self.processing[END_FROM][opidx + j] == AGNOSTIC {
                    conn.push(Connection::new(
                        Port::new(eid, j as u32),
                        Port::new(eid, port as u32),
                        e.landmark.clone(),
                    ));
                }
            }
        }
        invalid.resize(conn.len(), false);

        let mut round = 0;
        loop {
            let mut changed = false;
            for (c, inv) in conn.iter().zip(invalid.iter_mut()) {
                if *inv {
                    continue;
                }
                let offf = self.output_pidx(c.from);
                let offt = self.input_pidx(c.to);
                let pf = self.processing[END_FROM][offf];
                let pt = self.processing[END_TO][offt];

                if pt & 7 == AGNOSTIC {
                    if pf != AGNOSTIC {
                        self.processing[END_TO][offt] = AGNOSTIC | (pf & 3);
                        changed = true;
                    }
                } else if pf == AGNOSTIC {
                    self.processing[END_FROM][offf] = AGNOSTIC | (pt & 3);
                    changed = true;
                } else if (pf ^ pt) & 3 != 0 {
                    self.processing_error(c, pf, errh);
                    *inv = true;
                }
            }
            round += 1;
            if !changed {
                break;
            }
        }
        debug!(rounds = round, "processing inference reached fixpoint");

        conn.truncate(real_count);
        invalid.truncate(real_count);
    }

    fn processing_error(&mut self, c: &Connection, pf: u8, errh: &mut dyn ErrorSink) {
        let (type1, type2) = if pf & PUSH != 0 {
            ("push", "pull")
        } else {
            ("pull", "push")
        };
        let from = self.router.element(c.from.element);
        let to = self.router.element(c.to.element);
        if c.from.element == c.to.element {
            errh.error(
                &from.landmark,
                format!(
                    "agnostic '{}' in mixed context: {} input {}, {} output {}",
                    from.name, type2, c.to.port, type1, c.from.port
                ),
            );
        } else {
            errh.error(
                &c.landmark,
                format!(
                    "'{}' {} output {} connected to '{}' {} input {}",
                    from.name, type1, c.from.port, to.name, type2, c.to.port
                ),
            );
        }
        let offt = self.input_pidx(c.to);
        let offf = self.output_pidx(c.from);
        self.processing[END_TO][offt] |= PERROR;
        self.processing[END_FROM][offf] |= PERROR;
    }

    fn resolve_agnostics(&mut self) {
        for side in &mut self.processing {
            for p in side.iter_mut() {
                if *p & 7 == AGNOSTIC {
                    *p += PUSH;
                }
            }
        }
    }

    /// Validate port reuse, unconnected ports, and port counts.
    fn check_connections(
        &mut self,
        conn: &[Connection],
        invalid: &[bool],
        errh: &mut dyn ErrorSink,
    ) {
        let mut input_used: Vec<Option<usize>> = vec![None; self.npidx(false)];
        let mut output_used: Vec<Option<usize>> = vec![None; self.npidx(true)];

        for (ci, c) in conn.iter().enumerate() {
            let fp = self.output_pidx(c.from);
            let tp = self.input_pidx(c.to);

            let push_reuse = self.processing[END_FROM][fp] & PUSH != 0
                && !invalid[ci]
                && output_used[fp].is_some_and(|prev| conn[prev].to != c.to);
            if push_reuse {
                let prev = output_used[fp].unwrap();
                let fe = self.router.element(c.from.element);
                errh.error(
                    &c.landmark,
                    format!("illegal reuse of '{}' push output {}", fe.name, c.from.port),
                );
                errh.message(
                    &conn[prev].landmark,
                    format!("'{}' output {} previously used here", fe.name, c.from.port),
                );
                self.processing[END_FROM][fp] |= PERROR;
            } else {
                output_used[fp] = Some(ci);
            }

            let pull_reuse = self.processing[END_TO][tp] & PULL != 0
                && !invalid[ci]
                && input_used[tp].is_some_and(|prev| conn[prev].from != c.from);
            if pull_reuse {
                let prev = input_used[tp].unwrap();
                let te = self.router.element(c.to.element);
                errh.error(
                    &c.landmark,
                    format!("illegal reuse of '{}' pull input {}", te.name, c.to.port),
                );
                errh.message(
                    &conn[prev].landmark,
                    format!("'{}' input {} previously used here", te.name, c.to.port),
                );
                self.processing[END_TO][tp] |= PERROR;
            } else {
                input_used[tp] = Some(ci);
            }
        }

        for (id, e) in self.router.elements() {
            if e.dead || e.tunnel {
                continue;
            }
            self.check_nports(id, e, errh);
            let ipdx = self.pidx[END_TO][id.index()];
            let opdx = self.pidx[END_FROM][id.index()];
            for i in 0..e.ninputs() as usize {
                if input_used[ipdx + i].is_none() {
                    errh.error(
                        &e.landmark,
                        format!(
                            "'{}' {} input {} not connected",
                            e.name,
                            processing_name(self.processing[END_TO][ipdx + i]),
                            i
                        ),
                    );
                    self.processing[END_TO][ipdx + i] |= PERROR;
                }
            }
            for i in 0..e.noutputs() as usize {
                if output_used[opdx + i].is_none() {
                    errh.error(
                        &e.landmark,
                        format!(
                            "'{}' {} output {} not connected",
                            e.name,
                            processing_name(self.processing[END_FROM][opdx + i]),
                            i
                        ),
                    );
                    self.processing[END_FROM][opdx + i] |= PERROR;
                }
            }
        }
    }

    fn check_nports(&self, id: ElementId, e: &Element, errh: &mut dyn ErrorSink) {
        let codes = &self.codes[id.index()];
        let pc = match codes.port_count {
            Ok(pc) => pc,
            Err(()) => {
                errh.error(
                    &e.landmark,
                    format!("syntax error in port count code for '{}'", codes.class_name),
                );
                return;
            }
        };

        let ninputs = e.ninputs();
        if ninputs < pc.ninlo {
            let qual = if pc.ninlo == pc.ninhi { "" } else { "at least " };
            errh.error(
                &e.landmark,
                format!("too few inputs for '{}', {qual}{} required", e.name, pc.ninlo),
            );
        } else if ninputs > pc.ninhi {
            let qual = if pc.ninlo == pc.ninhi { "" } else { "at most " };
            errh.error(
                &e.landmark,
                format!("too many inputs for '{}', {qual}{} allowed", e.name, pc.ninhi),
            );
        }
        let ninputs = ninputs.clamp(pc.ninlo, pc.ninhi.max(pc.ninlo));

        let (noutlo, nouthi, with) = match pc.out {
            OutputCount::Range { noutlo, nouthi } => (noutlo, nouthi, String::new()),
            OutputCount::EqualsInputs { bias } => {
                let n = ninputs + bias;
                let with = if e.noutputs() != n {
                    let plural = if ninputs == 1 { "" } else { "s" };
                    format!(" with {ninputs} input{plural}")
                } else {
                    String::new()
                };
                (n, n, with)
            }
        };
        if e.noutputs() < noutlo {
            let qual = if noutlo == nouthi { "" } else { "at least " };
            errh.error(
                &e.landmark,
                format!("too few outputs for '{}'{with}, {qual}{noutlo} required", e.name),
            );
        } else if e.noutputs() > nouthi {
            let qual = if noutlo == nouthi { "" } else { "at most " };
            errh.error(
                &e.landmark,
                format!("too many outputs for '{}'{with}, {qual}{nouthi} allowed", e.name),
            );
        }
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn npidx(&self, isoutput: bool) -> usize {
        let side = if isoutput { END_FROM } else { END_TO };
        *self.pidx[side].last().unwrap_or(&0)
    }

    pub fn input_pidx(&self, port: Port) -> usize {
        self.pidx[END_TO][port.element.index()] + port.port as usize
    }

    pub fn output_pidx(&self, port: Port) -> usize {
        self.pidx[END_FROM][port.element.index()] + port.port as usize
    }

    /// The element and local port of a global port index.
    pub fn port_at(&self, pidx: usize, isoutput: bool) -> Port {
        let side = if isoutput { END_FROM } else { END_TO };
        let eid = self.elt[side][pidx];
        Port::new(eid, (pidx - self.pidx[side][eid.index()]) as u32)
    }

    pub fn input_processing(&self, port: Port) -> u8 {
        self.processing[END_TO][self.input_pidx(port)]
    }

    pub fn output_processing(&self, port: Port) -> u8 {
        self.processing[END_FROM][self.output_pidx(port)]
    }

    /// The inferred processing code of an element, one letter per
    /// port.
    pub fn processing_code(&self, id: ElementId) -> String {
        self.code_of(id, LETTERS, false)
    }

    /// Like [`Self::processing_code`], with uppercase letters for
    /// resolved agnostic ports and `@` marking error ports.
    pub fn decorated_processing_code(&self, id: ElementId) -> String {
        self.code_of(id, DECORATED_LETTERS, true)
    }

    fn code_of(&self, id: ElementId, letters: &[u8; 8], errors: bool) -> String {
        let mut s = String::new();
        let (ib, ie) = (self.pidx[END_TO][id.index()], self.pidx[END_TO][id.index() + 1]);
        let (ob, oe) = (
            self.pidx[END_FROM][id.index()],
            self.pidx[END_FROM][id.index() + 1],
        );
        for p in &self.processing[END_TO][ib..ie] {
            s.push(letters[(p & 7) as usize] as char);
            if errors && p & PERROR != 0 {
                s.push('@');
            }
        }
        s.push('/');
        for p in &self.processing[END_FROM][ob..oe] {
            s.push(letters[(p & 7) as usize] as char);
            if errors && p & PERROR != 0 {
                s.push('@');
            }
        }
        s
    }

    // ------------------------------------------------------------------
    // reachability
    // ------------------------------------------------------------------

    /// Mark ports reached by following connections from `source`
    /// ports (on the `source_isoutput` side) to the opposite side.
    pub fn follow_connections(&self, source: &[bool], source_isoutput: bool, sink: &mut [bool]) {
        for c in self.router.connections() {
            let (sp, tp) = if source_isoutput {
                (self.output_pidx(c.from), self.input_pidx(c.to))
            } else {
                (self.input_pidx(c.to), self.output_pidx(c.from))
            };
            if source[sp] {
                sink[tp] = true;
            }
        }
    }

    /// Mark ports reached by crossing elements via their flow codes.
    pub fn follow_flow(&self, source: &[bool], source_isoutput: bool, sink: &mut [bool]) {
        for (pidx, _) in source.iter().enumerate().filter(|(_, s)| **s) {
            let port = self.port_at(pidx, source_isoutput);
            let e = self.router.element(port.element);
            let opposite = if source_isoutput {
                e.ninputs()
            } else {
                e.noutputs()
            } as usize;
            let reach = port_flow(
                self.codes[port.element.index()].flow.as_ref(),
                port.port as usize,
                source_isoutput,
                opposite,
            );
            let side = if source_isoutput { END_TO } else { END_FROM };
            let base = self.pidx[side][port.element.index()];
            for (i, r) in reach.into_iter().enumerate() {
                if r {
                    sink[base + i] = true;
                }
            }
        }
    }

    /// Expand `ports` to everything reachable from it, alternating
    /// connection-following and flow-crossing until fixpoint.
    /// `forward` follows packet flow; `!forward` traces upstream.
    pub fn follow_reachable(&self, ports: &mut Vec<bool>, isoutput: bool, forward: bool) {
        assert_eq!(ports.len(), self.npidx(isoutput));
        let mut diff = ports.clone();
        loop {
            let mut other = vec![false; self.npidx(!isoutput)];
            let mut new_ports = vec![false; self.npidx(isoutput)];
            if isoutput != forward {
                self.follow_flow(&diff, isoutput, &mut other);
                self.follow_connections(&other, !isoutput, &mut new_ports);
            } else {
                self.follow_connections(&diff, isoutput, &mut other);
                self.follow_flow(&other, !isoutput, &mut new_ports);
            }
            let mut changed = false;
            for i in 0..ports.len() {
                diff[i] = new_ports[i] && !ports[i];
                if diff[i] {
                    ports[i] = true;
                    changed = true;
                }
            }
            if !changed {
                return;
            }
        }
    }

    // ------------------------------------------------------------------
    // compound-class synthesis
    // ------------------------------------------------------------------

    /// Exact port-count code of this router viewed as a compound
    /// body.
    pub fn compound_port_count_code(&self) -> String {
        let (nin, nout) = self.router.tunnel_arity();
        format!("{nin}/{nout}")
    }

    /// Derived processing code: tunnel-adjacent port disciplines,
    /// streamlined to drop trailing repeats.
    pub fn compound_processing_code(&self) -> String {
        let mut icode = String::new();
        let mut ocode = String::new();
        if let Some(input) = self.router.eindex(TUNNEL_INPUT) {
            let e = self.router.element(input);
            for i in 0..e.noutputs() {
                let p = self.output_processing(Port::new(input, i));
                icode.push(LETTERS[(p & 7) as usize] as char);
            }
        }
        if let Some(output) = self.router.eindex(TUNNEL_OUTPUT) {
            let e = self.router.element(output);
            for i in 0..e.ninputs() {
                let p = self.input_processing(Port::new(output, i));
                ocode.push(LETTERS[(p & 7) as usize] as char);
            }
        }
        streamline(&mut icode);
        streamline(&mut ocode);
        if icode.is_empty() {
            icode.push('a');
        }
        if ocode.is_empty() {
            ocode.push('a');
        }
        format!("{icode}/{ocode}")
    }

    /// Derived flow code: which compound inputs reach which compound
    /// outputs, computed with the reachability engine.
    pub fn compound_flow_code(&self) -> String {
        let (Some(input), Some(output)) = (
            self.router.eindex(TUNNEL_INPUT),
            self.router.eindex(TUNNEL_OUTPUT),
        ) else {
            return "x/y".to_string();
        };
        let ninputs = self.router.element(input).noutputs() as usize;
        let noutputs = self.router.element(output).ninputs() as usize;
        if ninputs == 0 || noutputs == 0 {
            return "x/y".to_string();
        }

        // reach[j][i]: compound input i reaches compound output j
        let mut reach = vec![vec![false; ninputs]; noutputs];
        for i in 0..ninputs {
            let mut vec = vec![false; self.npidx(false)];
            self.follow_connections(
                &{
                    let mut src = vec![false; self.npidx(true)];
                    src[self.output_pidx(Port::new(input, i as u32))] = true;
                    src
                },
                true,
                &mut vec,
            );
            self.follow_reachable(&mut vec, false, true);
            for (j, row) in reach.iter_mut().enumerate() {
                if vec[self.input_pidx(Port::new(output, j as u32))] {
                    row[i] = true;
                }
            }
        }

        render_flow_code(&reach, ninputs, noutputs)
    }
}

fn streamline(code: &mut String) {
    while code.len() > 1 {
        let b = code.as_bytes();
        if b[b.len() - 1] == b[b.len() - 2] {
            code.pop();
        } else {
            break;
        }
    }
}

/// Assign class letters to compound inputs and render the derived
/// flow code. Inputs with identical output sets share a letter.
fn render_flow_code(reach: &[Vec<bool>], ninputs: usize, noutputs: usize) -> String {
    const CODE_CHARS: &[u8] = b"xyzabcdefghijklmnopqrstuvwXYZABCDEFGHIJKLMNOPQRSTUVW0123456789_";

    let mut letter_of = vec![0u8; ninputs];
    let mut next = 0usize;
    for i in 0..ninputs {
        let mut shared = None;
        for j in 0..i {
            let same = reach.iter().all(|row| row[i] == row[j]);
            if same {
                shared = Some(letter_of[j]);
                break;
            }
        }
        match shared {
            Some(l) => letter_of[i] = l,
            None => {
                letter_of[i] = CODE_CHARS[next.min(CODE_CHARS.len() - 1)];
                next += 1;
            }
        }
    }
    let unused = CODE_CHARS[next.min(CODE_CHARS.len() - 1)];

    let mut out = String::new();
    for &l in &letter_of {
        out.push(l as char);
    }
    out.push('/');
    for row in reach.iter().take(noutputs) {
        // distinct letters reaching this output
        let mut letters: Vec<u8> = Vec::new();
        for (i, &r) in row.iter().enumerate() {
            if r && !letters.contains(&letter_of[i]) {
                letters.push(letter_of[i]);
            }
        }
        match letters.len() {
            0 => out.push(unused as char),
            1 => out.push(letters[0] as char),
            _ => {
                out.push('[');
                for l in letters {
                    out.push(l as char);
                }
                out.push(']');
            }
        }
    }
    out
}

fn processing_name(p: u8) -> &'static str {
    let p = p & 7;
    if p == AGNOSTIC {
        "agnostic"
    } else if p & PUSH != 0 {
        "push"
    } else if p & PULL != 0 {
        "pull"
    } else {
        "?"
    }
}

/// Swap the input and output halves of a processing code.
fn reverse_processing_code(code: &str) -> String {
    match code.split_once('/') {
        Some((i, o)) => format!("{o}/{i}"),
        None => code.to_string(),
    }
}

/// Parse a processing code into per-port values. Returns `None` for a
/// side on syntax error. Missing trailing codes repeat the last one.
fn parse_processing_code(
    code: &str,
    ninputs: u32,
    noutputs: u32,
) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let (in_part, out_part) = match code.split_once('/') {
        Some((i, o)) => (i, o),
        None => (code, code),
    };
    (
        parse_processing_side(in_part, ninputs),
        parse_processing_side(out_part, noutputs),
    )
}

fn parse_processing_side(side: &str, nports: u32) -> Option<Vec<u8>> {
    let mut vals = Vec::new();
    let b = side.as_bytes();
    let mut i = 0;
    let mut last = None;
    for _ in 0..nports {
        if i >= b.len() {
            vals.push(last?);
            continue;
        }
        let v = match b[i] {
            b'h' => PUSH,
            b'l' => PULL,
            b'a' => AGNOSTIC,
            b'H' => PUSH + AGNOSTIC,
            b'L' => PULL + AGNOSTIC,
            _ => return None,
        };
        i += 1;
        // a following '@' marks the port as carrying an error flag
        let v = if i < b.len() && b[i] == b'@' {
            i += 1;
            v + PERROR
        } else {
            v
        };
        last = Some(v);
        vals.push(v);
    }
    Some(vals)
}

// ============================================================================
// PER-ELEMENT CODE RESOLUTION
// ============================================================================

/// Resolve the codes of one element: registry traits for primitives,
/// synthesized codes for compounds. Compound synthesis recurses
/// through the body; class construction is bottom-up at parse time,
/// so the recursion is finite.
fn element_codes(e: &Element, emap: &ElementMap, errh: &mut dyn ErrorSink) -> ElemCodes {
    let class = e.class.resolve_synonyms();
    let class_name = SmolStr::new(class.printable_name());

    let selected = match select_overload(&class, e.ninputs(), e.noutputs()) {
        Ok(c) => c,
        Err(()) => {
            errh.error(
                &e.landmark,
                format!(
                    "no overload of '{}' accepts {} inputs and {} outputs",
                    class.printable_name(),
                    e.ninputs(),
                    e.noutputs()
                ),
            );
            return ElemCodes {
                class_name,
                processing_code: String::new(),
                flow: None,
                port_count: Ok(PortCount::unrestricted()),
                known: false,
            };
        }
    };

    if let Some(compound) = selected.compound() {
        // synthesize codes from the body; diagnostics for the body
        // surface when it is checked or flattened, not at every
        // reference
        let mut silent = SilentSink::new();
        let sub = Processing::new_compound(&compound.body, emap, "", &mut silent);
        let flow_code = sub.compound_flow_code();
        let flow = FlowCode::parse(&flow_code).ok().flatten();
        return ElemCodes {
            class_name,
            processing_code: sub.compound_processing_code(),
            flow,
            port_count: PortCount::parse(&sub.compound_port_count_code()),
            known: true,
        };
    }

    match emap.traits(selected.name()) {
        Some(t) => traits_codes(t, class_name, &e.landmark, errh),
        None => ElemCodes {
            class_name,
            processing_code: String::new(),
            flow: None,
            port_count: Ok(PortCount::unrestricted()),
            known: false,
        },
    }
}

fn traits_codes(
    t: &Traits,
    class_name: SmolStr,
    landmark: &crate::base::Landmark,
    errh: &mut dyn ErrorSink,
) -> ElemCodes {
    let flow = FlowCode::parse_lenient(&t.flow_code, &class_name, landmark, errh);
    ElemCodes {
        class_name,
        processing_code: t.processing_code.clone(),
        flow,
        port_count: t.port_count(),
        known: true,
    }
}
