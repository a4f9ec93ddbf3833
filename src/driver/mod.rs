//! The configuration driver: orchestrates lex, parse, resolution,
//! inference, validation, instantiation, and handoff to the
//! scheduler.
//!
//! ```text
//! source text
//!   S1  parse (with require(library) imports)      lang
//!   S2  traits registry (built-ins + files)        registry, runtime
//!   S3  class resolution                           semantic
//!   S4  flatten                                    graph
//!   S5  processing inference                       semantic
//!   S6  port-count validation                      semantic
//!   S7  instantiate                                runtime
//!   S8  configure pass
//!   S9  initialize pass
//!   S10 scheduler main loop
//! ```

use std::path::{Path, PathBuf};

use smol_str::SmolStr;
use tracing::{debug, info};

use crate::errors::{BufferSink, ErrorSink, ErrorSinkExt, LandmarkSink, PrefixSink};
use crate::graph::{Port, Router, flatten};
use crate::lang;
use crate::registry::{Driver, ElementMap, find_file};
use crate::runtime::{self, ElementSetup, HandlerSpec, RouterRt, Timestamp};
use crate::semantic::{Processing, check_types, resolve_classes};

/// Options controlling a configuration load.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Filename used in diagnostics.
    pub filename: String,
    /// Directory for resolving `require(library ...)`; usually the
    /// configuration file's own directory.
    pub file_dir: Option<PathBuf>,
    /// Target driver for the compatibility check.
    pub driver: Driver,
    /// Extra traits-registry files to load after the built-ins.
    pub elementmap_files: Vec<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            filename: "config".to_string(),
            file_dir: None,
            driver: Driver::Userlevel,
            elementmap_files: Vec::new(),
        }
    }
}

/// A loaded configuration: the resolved graph, its flattened form,
/// and the instantiated runtime.
pub struct LoadedRouter {
    /// The parsed, class-resolved router (compounds intact).
    pub router: Router,
    /// The flattened router the runtime was built from.
    pub flat: Router,
    pub emap: ElementMap,
    /// Inferred (decorated) processing code per element, in eindex
    /// order.
    processing_codes: Vec<(SmolStr, String)>,
    rt: RouterRt,
}

/// Load a configuration through S1..S9. Any error aborts with the
/// sink holding the diagnostics.
pub fn load(
    source: &str,
    options: &LoadOptions,
    errh: &mut dyn ErrorSink,
) -> Result<LoadedRouter, ()> {
    let initial_errors = errh.nerrors();

    // S1: parse
    let mut router = lang::Parser::new(
        source,
        &options.filename,
        options.file_dir.clone(),
        errh,
    )
    .run();
    debug!(
        elements = router.nelements(),
        connections = router.nconnections(),
        "parsed configuration"
    );

    // S2: traits registry
    runtime::install_defaults();
    let mut emap = runtime::default_elementmap();
    emap.set_driver(options.driver);
    for path in &options.elementmap_files {
        load_elementmap(&mut emap, path, errh);
    }
    for (rtype, value) in router.requirements().to_vec() {
        if rtype == "package" && !emap.provides(&value) {
            let name = format!("elementmap-{value}.xml");
            match find_file(&name, "share", options.file_dir.as_deref()) {
                Some(path) => load_elementmap(&mut emap, &path, errh),
                None => errh.warning(
                    &router.landmark,
                    format!("package '{value}' not found"),
                ),
            }
        }
    }

    // S3: class resolution
    resolve_classes(&mut router, &emap, errh);

    // S4: flatten (always, for instantiation; the unflattened router
    // is kept for reflection)
    let mut flat = router.clone();
    flatten(&mut flat, errh);
    resolve_classes(&mut flat, &emap, errh);
    if errh.nerrors() > initial_errors {
        return Err(());
    }

    // driver compatibility
    for class in flat.collect_types() {
        let resolved = class.resolve_synonyms();
        if let Some(t) = emap.traits(resolved.name()) {
            if !t.allows_driver(options.driver) {
                errh.error(
                    &flat.landmark,
                    format!(
                        "'{}' is not compatible with the {} driver",
                        resolved.name(),
                        options.driver.name()
                    ),
                );
            }
        }
    }

    // S5 + S6: processing inference and validation
    let proc = Processing::new(&flat, &emap, errh);
    if errh.nerrors() > initial_errors {
        return Err(());
    }
    let processing_codes: Vec<(SmolStr, String)> = flat
        .elements()
        .filter(|(_, e)| !e.dead && !e.tunnel)
        .map(|(id, e)| (e.name.clone(), proc.decorated_processing_code(id)))
        .collect();

    // S7: instantiate in eindex order
    let mut setups = Vec::new();
    let mut eid_of = Vec::new();
    for (id, e) in flat.elements() {
        if e.dead || e.tunnel {
            eid_of.push(None);
            continue;
        }
        let class_name = SmolStr::new(e.class.resolve_synonyms().name());
        let Some(element) = runtime::make_element(&class_name) else {
            errh.error(
                &e.landmark,
                format!("cannot instantiate '{}': unknown class '{class_name}'", e.name),
            );
            return Err(());
        };
        let in_processing: Vec<u8> = (0..e.ninputs())
            .map(|p| proc.input_processing(Port::new(id, p)))
            .collect();
        let out_processing: Vec<u8> = (0..e.noutputs())
            .map(|p| proc.output_processing(Port::new(id, p)))
            .collect();
        eid_of.push(Some(setups.len()));
        setups.push(ElementSetup {
            name: e.name.clone(),
            class_name,
            config: e.config.clone(),
            element,
            in_processing,
            out_processing,
        });
    }
    let edges: Vec<(usize, usize, usize, usize)> = flat
        .connections()
        .iter()
        .filter_map(|c| {
            let fe = eid_of[c.from.element.index()]?;
            let te = eid_of[c.to.element.index()]?;
            Some((fe, c.from.port as usize, te, c.to.port as usize))
        })
        .collect();
    drop(proc);
    let mut rt = RouterRt::assemble(setups, &edges);

    // S8: configure pass
    let mut any_failed = false;
    for (id, e) in flat.elements() {
        let Some(eid) = eid_of[id.index()] else {
            continue;
        };
        let expanded = flat.scope.expand(&e.config);
        let args = crate::confparse::split_args(&expanded);
        let mut landmarked = LandmarkSink::new(errh, e.landmark.clone());
        let mut prefixed = PrefixSink::new(
            &mut landmarked,
            format!(
                "While configuring '{} :: {}': ",
                e.name,
                e.class.printable_name()
            ),
        );
        if rt.configure_element(eid, &args, &mut prefixed).is_err() {
            any_failed = true;
        }
    }
    if any_failed || errh.nerrors() > initial_errors {
        return Err(());
    }

    // S9: initialize pass
    if rt.initialize(errh).is_err() || errh.nerrors() > initial_errors {
        return Err(());
    }

    info!(
        elements = rt.nelements(),
        driver = options.driver.name(),
        "configuration loaded"
    );
    Ok(LoadedRouter {
        router,
        flat,
        emap,
        processing_codes,
        rt,
    })
}

/// Analyze a configuration without flattening or instantiating it:
/// parse, resolve classes, run processing inference over every
/// declared compound body, then over the top-level router with
/// compound instances intact. Reports problems inside compound
/// classes whether or not they are instantiated, which `load`'s
/// flatten-then-infer path cannot.
pub fn check(source: &str, options: &LoadOptions, errh: &mut dyn ErrorSink) -> Result<Router, ()> {
    let initial_errors = errh.nerrors();

    let mut router = lang::Parser::new(
        source,
        &options.filename,
        options.file_dir.clone(),
        errh,
    )
    .run();

    runtime::install_defaults();
    let mut emap = runtime::default_elementmap();
    emap.set_driver(options.driver);
    for path in &options.elementmap_files {
        load_elementmap(&mut emap, path, errh);
    }
    for (rtype, value) in router.requirements().to_vec() {
        if rtype == "package" && !emap.provides(&value) {
            let name = format!("elementmap-{value}.xml");
            if let Some(path) = find_file(&name, "share", options.file_dir.as_deref()) {
                load_elementmap(&mut emap, &path, errh);
            }
        }
    }

    resolve_classes(&mut router, &emap, errh);
    check_types(&router, &emap, errh);
    let _ = Processing::new(&router, &emap, errh);

    if errh.nerrors() > initial_errors {
        Err(())
    } else {
        Ok(router)
    }
}

fn load_elementmap(emap: &mut ElementMap, path: &Path, errh: &mut dyn ErrorSink) {
    match std::fs::read_to_string(path) {
        Ok(text) => emap.parse(&text, "", errh),
        Err(e) => errh.error(
            &crate::base::Landmark::unknown(),
            format!("elementmap '{}': {e}", path.display()),
        ),
    }
}

impl LoadedRouter {
    /// S10: run the scheduler until stopped or idle.
    pub fn run(&mut self) {
        self.rt.run();
    }

    /// Run at most `max_quanta` task and timer invocations.
    pub fn run_limited(&mut self, max_quanta: u64) -> u64 {
        self.rt.run_limited(max_quanta)
    }

    /// Idempotent shutdown: drain the queues and run element cleanup
    /// in reverse initialization order.
    pub fn shutdown(&mut self) {
        self.rt.stop();
        self.rt.cleanup();
    }

    pub fn now(&self) -> Timestamp {
        self.rt.now()
    }

    pub fn element_names(&self) -> &[SmolStr] {
        self.rt.element_names()
    }

    /// The inferred processing code of an element, with resolved
    /// agnostic ports uppercase.
    pub fn processing_code(&self, path: &str) -> Option<&str> {
        self.processing_codes
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, code)| code.as_str())
    }

    /// Render the configuration: the resolved router, or its
    /// flattened form.
    pub fn unparse(&self, flattened: bool) -> String {
        if flattened {
            self.flat.unparse()
        } else {
            self.router.unparse()
        }
    }

    // ------------------------------------------------------------------
    // handler RPC
    // ------------------------------------------------------------------

    /// Evaluate a read handler by `(element_path, handler)`. The
    /// empty path and `.` address router-global handlers.
    pub fn read_handler(&self, path: &str, handler: &str) -> Option<String> {
        if path.is_empty() || path == "." {
            return self.global_read_handler(handler);
        }
        let eid = self.rt.eindex(path)?;
        self.rt.read_handler(eid, handler)
    }

    /// Evaluate a write handler; diagnostics go to `errh`.
    pub fn write_handler(
        &mut self,
        path: &str,
        handler: &str,
        value: &str,
        errh: &mut dyn ErrorSink,
    ) -> Result<(), ()> {
        let Some(eid) = self.rt.eindex(path) else {
            errh.error(
                &crate::base::Landmark::unknown(),
                format!("no element named '{path}'"),
            );
            return Err(());
        };
        self.rt
            .write_handler(eid, handler, value, errh)
            .map_err(|_| ())
    }

    /// The handlers of an element, or the global handlers for the
    /// empty path.
    pub fn handlers(&self, path: &str) -> Option<Vec<HandlerSpec>> {
        if path.is_empty() || path == "." {
            return Some(vec![
                HandlerSpec::read("version"),
                HandlerSpec::read("list"),
                HandlerSpec::read("config"),
                HandlerSpec::read("requirements"),
            ]);
        }
        let eid = self.rt.eindex(path)?;
        Some(self.rt.handlers(eid))
    }

    fn global_read_handler(&self, handler: &str) -> Option<String> {
        match handler {
            "version" => Some(format!("{}\n", env!("CARGO_PKG_VERSION"))),
            "list" => {
                let mut s = format!("{}\n", self.rt.nelements());
                for name in self.rt.element_names() {
                    s.push_str(name);
                    s.push('\n');
                }
                Some(s)
            }
            "config" => Some(self.router.unparse()),
            "requirements" => {
                let mut s = String::new();
                for (rtype, value) in self.router.requirements() {
                    s.push_str(&format!("{rtype} {value}\n"));
                }
                Some(s)
            }
            _ => None,
        }
    }

    /// Run a write handler and capture its diagnostics as text.
    pub fn write_handler_captured(
        &mut self,
        path: &str,
        handler: &str,
        value: &str,
    ) -> Result<(), String> {
        let mut buf = BufferSink::new();
        match self.write_handler(path, handler, value, &mut buf) {
            Ok(()) => Ok(()),
            Err(()) => Err(buf.take_text()),
        }
    }
}
