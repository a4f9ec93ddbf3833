//! The single-threaded cooperative scheduler and the assembled
//! runtime router.

use std::cell::{Cell, RefCell};

use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::errors::ErrorSink;

use super::context::{CleanupStage, Context, Element, Outcome};
use super::task::{TaskQueue, TimerQueue, Timestamp};

/// Shared state of a running router. Interior mutability keeps the
/// queues reachable from element code while elements themselves are
/// borrowed.
pub(super) struct RtInner {
    pub elements: Vec<RefCell<Box<dyn Element>>>,
    pub names: Vec<SmolStr>,
    pub class_names: Vec<SmolStr>,
    pub configs: Vec<String>,
    /// Push target of each output port, if connected.
    pub out_edges: Vec<Vec<Option<(usize, usize)>>>,
    /// Pull source of each input port, if connected.
    pub in_edges: Vec<Vec<Option<(usize, usize)>>>,
    pub in_processing: Vec<Vec<u8>>,
    pub out_processing: Vec<Vec<u8>>,
    pub tasks: RefCell<TaskQueue>,
    pub timers: RefCell<TimerQueue>,
    pub now: Cell<Timestamp>,
    pub stop: Cell<bool>,
}

/// Inputs for assembling a [`RouterRt`]; produced by the driver from
/// an inferred router graph.
pub struct ElementSetup {
    pub name: SmolStr,
    pub class_name: SmolStr,
    pub config: String,
    pub element: Box<dyn Element>,
    pub in_processing: Vec<u8>,
    pub out_processing: Vec<u8>,
}

/// A fully instantiated router, ready to configure, initialize, and
/// run.
pub struct RouterRt {
    inner: RtInner,
    /// Elements in initialization order; cleanup runs in reverse.
    initialized: Vec<usize>,
    stage: CleanupStage,
}

impl RouterRt {
    /// Assemble from per-element setups and connection edges
    /// `(from, from_port, to, to_port)`.
    pub fn assemble(setups: Vec<ElementSetup>, edges: &[(usize, usize, usize, usize)]) -> Self {
        let n = setups.len();
        let mut inner = RtInner {
            elements: Vec::with_capacity(n),
            names: Vec::with_capacity(n),
            class_names: Vec::with_capacity(n),
            configs: Vec::with_capacity(n),
            out_edges: Vec::with_capacity(n),
            in_edges: Vec::with_capacity(n),
            in_processing: Vec::with_capacity(n),
            out_processing: Vec::with_capacity(n),
            tasks: RefCell::new(TaskQueue::new(n)),
            timers: RefCell::new(TimerQueue::new()),
            now: Cell::new(Timestamp::ZERO),
            stop: Cell::new(false),
        };
        for s in setups {
            inner.names.push(s.name);
            inner.class_names.push(s.class_name);
            inner.configs.push(s.config);
            inner.out_edges.push(vec![None; s.out_processing.len()]);
            inner.in_edges.push(vec![None; s.in_processing.len()]);
            inner.in_processing.push(s.in_processing);
            inner.out_processing.push(s.out_processing);
            inner.elements.push(RefCell::new(s.element));
        }
        for &(fe, fp, te, tp) in edges {
            inner.out_edges[fe][fp] = Some((te, tp));
            inner.in_edges[te][tp] = Some((fe, fp));
        }
        RouterRt {
            inner,
            initialized: Vec::new(),
            stage: CleanupStage::Configured,
        }
    }

    pub fn nelements(&self) -> usize {
        self.inner.elements.len()
    }

    pub fn element_names(&self) -> &[SmolStr] {
        &self.inner.names
    }

    pub fn eindex(&self, name: &str) -> Option<usize> {
        self.inner.names.iter().position(|n| n == name)
    }

    pub fn class_name(&self, eid: usize) -> &SmolStr {
        &self.inner.class_names[eid]
    }

    pub fn config(&self, eid: usize) -> &str {
        &self.inner.configs[eid]
    }

    pub fn now(&self) -> Timestamp {
        self.inner.now.get()
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Run one element's `configure` with its split arguments.
    pub fn configure_element(
        &mut self,
        eid: usize,
        args: &[String],
        errh: &mut dyn ErrorSink,
    ) -> Outcome {
        self.inner.elements[eid].borrow_mut().configure(args, errh)
    }

    /// Run every element's `initialize`, recording the order for
    /// cleanup. On failure, cleans up the already initialized prefix
    /// and fails.
    pub fn initialize(&mut self, errh: &mut dyn ErrorSink) -> Outcome {
        for eid in 0..self.inner.elements.len() {
            let result = {
                let mut elt = self.inner.elements[eid].borrow_mut();
                let mut ctx = Context::new(&self.inner, eid);
                elt.initialize(&mut ctx, errh)
            };
            match result {
                Ok(()) => self.initialized.push(eid),
                Err(e) => {
                    debug!(element = %self.inner.names[eid], "initialize failed");
                    self.cleanup();
                    return Err(e);
                }
            }
        }
        self.stage = CleanupStage::Initialized;
        Ok(())
    }

    /// Run cleanup handlers in reverse initialization order. Safe to
    /// call repeatedly; later calls do nothing.
    pub fn cleanup(&mut self) {
        let stage = self.stage;
        for eid in self.initialized.drain(..).rev() {
            self.inner.elements[eid].borrow_mut().cleanup(stage);
        }
    }

    /// Request shutdown: drains the task queue so the main loop exits
    /// at its next iteration. Idempotent.
    pub fn stop(&self) {
        self.inner.stop.set(true);
        self.inner.tasks.borrow_mut().unschedule_all();
        self.inner.timers.borrow_mut().clear();
    }

    // ------------------------------------------------------------------
    // main loop
    // ------------------------------------------------------------------

    /// Run until stopped or idle (no task scheduled and no timer
    /// pending, so virtual time cannot advance).
    pub fn run(&mut self) {
        self.run_limited(u64::MAX);
    }

    /// Run at most `max_quanta` task and timer invocations. Returns
    /// the number actually run.
    pub fn run_limited(&mut self, max_quanta: u64) -> u64 {
        self.stage = CleanupStage::Running;
        let inner = &self.inner;
        let mut quanta = 0u64;

        while quanta < max_quanta && !inner.stop.get() {
            // fire every timer due at the current virtual time
            let due = {
                let mut timers = inner.timers.borrow_mut();
                timers.pop_due(inner.now.get())
            };
            if let Some(eid) = due {
                trace!(element = %inner.names[eid], now = %inner.now.get(), "timer fires");
                let mut elt = inner.elements[eid].borrow_mut();
                elt.run_timer(&mut Context::new(inner, eid));
                quanta += 1;
                continue;
            }

            // one task quantum
            let next = inner.tasks.borrow_mut().begin_quantum();
            if let Some(eid) = next {
                let mut elt = inner.elements[eid].borrow_mut();
                elt.run_task(&mut Context::new(inner, eid));
                quanta += 1;
                continue;
            }

            // idle: advance virtual time to the next deadline
            match inner.timers.borrow().next_deadline() {
                Some(deadline) if deadline > inner.now.get() => {
                    inner.now.set(deadline);
                }
                Some(_) => {}
                None => break,
            }
        }
        debug!(quanta, "scheduler loop exited");
        quanta
    }

    // ------------------------------------------------------------------
    // handler access
    // ------------------------------------------------------------------

    /// Evaluate a read handler on an element. Built-in handlers
    /// `name`, `class`, and `config` work for every element.
    pub fn read_handler(&self, eid: usize, handler: &str) -> Option<String> {
        match handler {
            "name" => Some(format!("{}\n", self.inner.names[eid])),
            "class" => Some(format!("{}\n", self.inner.class_names[eid])),
            "config" => Some(format!("{}\n", self.inner.configs[eid])),
            _ => self.inner.elements[eid]
                .borrow()
                .read_handler(handler, self.inner.now.get()),
        }
    }

    /// Evaluate a write handler on an element.
    pub fn write_handler(
        &self,
        eid: usize,
        handler: &str,
        value: &str,
        errh: &mut dyn ErrorSink,
    ) -> Outcome {
        self.inner.elements[eid]
            .borrow_mut()
            .write_handler(handler, value, errh)
    }

    /// All handlers of an element, including the built-ins.
    pub fn handlers(&self, eid: usize) -> Vec<super::HandlerSpec> {
        let mut list = vec![
            super::HandlerSpec::read("name"),
            super::HandlerSpec::read("class"),
            super::HandlerSpec::read("config"),
        ];
        list.extend(self.inner.elements[eid].borrow().handlers());
        list
    }

    /// Deliver one externally created packet to a push input, as an
    /// I/O element would. Used by tests and by source adapters.
    pub fn inject(&self, eid: usize, port: usize, pkt: super::Packet) {
        let mut elt = self.inner.elements[eid].borrow_mut();
        elt.push(port, pkt, &mut Context::new(&self.inner, eid));
    }
}

impl std::fmt::Debug for RouterRt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterRt")
            .field("nelements", &self.nelements())
            .field("now", &self.inner.now.get())
            .finish()
    }
}

