//! The element contract and the call context handed to element code.

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::semantic::{PULL, PUSH};

use super::packet::Packet;
use super::scheduler::RtInner;
use super::task::Timestamp;

/// Marker for element failures; details have already been reported to
/// the error sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("element error")]
pub struct ElementError;

pub type Outcome = Result<(), ElementError>;

/// How far startup had progressed when cleanup was invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupStage {
    /// `configure` ran (possibly unsuccessfully).
    Configured,
    /// `initialize` ran.
    Initialized,
    /// The router ran.
    Running,
}

/// Description of one named handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerSpec {
    pub name: &'static str,
    pub readable: bool,
    pub writable: bool,
}

impl HandlerSpec {
    pub const fn read(name: &'static str) -> Self {
        Self {
            name,
            readable: true,
            writable: false,
        }
    }

    pub const fn write(name: &'static str) -> Self {
        Self {
            name,
            readable: false,
            writable: true,
        }
    }

    pub const fn read_write(name: &'static str) -> Self {
        Self {
            name,
            readable: true,
            writable: true,
        }
    }
}

/// The element contract.
///
/// An element implements a subset of the capability set: push
/// elements override [`Element::push`], pull elements
/// [`Element::pull`], agnostic one-in-one-out elements just
/// [`Element::simple_action`] (the default push and pull route
/// through it). Task- and timer-driven elements override
/// [`Element::run_task`] / [`Element::run_timer`] and register during
/// [`Element::initialize`].
pub trait Element {
    /// The class name under which this element registers.
    fn class_name(&self) -> &'static str;

    /// Port-count code (`lo[-hi][/lo[-hi]]` or `=`-form).
    fn port_count(&self) -> &'static str {
        "1/1"
    }

    /// Processing code (`h` push, `l` pull, `a` agnostic).
    fn processing(&self) -> &'static str {
        "a/a"
    }

    /// Flow code describing input-to-output influence.
    fn flow_code(&self) -> &'static str {
        "x/x"
    }

    /// Parse configuration arguments. The default accepts an empty
    /// configuration only.
    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        if args.iter().any(|a| !a.is_empty()) {
            errh.error(
                &crate::base::Landmark::unknown(),
                format!("'{}' takes no configuration arguments", self.class_name()),
            );
            return Err(ElementError);
        }
        Ok(())
    }

    /// Called once all elements are configured; register tasks and
    /// timers here.
    fn initialize(&mut self, _ctx: &mut Context<'_>, _errh: &mut dyn ErrorSink) -> Outcome {
        Ok(())
    }

    /// Release resources; called in reverse initialization order.
    fn cleanup(&mut self, _stage: CleanupStage) {}

    /// Receive a packet on a push input. Ownership transfers in.
    fn push(&mut self, port: usize, pkt: Packet, ctx: &mut Context<'_>) {
        if let Some(p) = self.simple_action(pkt) {
            ctx.push(port, p);
        }
    }

    /// Produce a packet on a pull output, or `None`.
    fn pull(&mut self, port: usize, ctx: &mut Context<'_>) -> Option<Packet> {
        let pkt = ctx.pull(port)?;
        self.simple_action(pkt)
    }

    /// Process one packet: return it (or a replacement) to forward,
    /// or `None` to drop.
    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        Some(pkt)
    }

    /// Run one task quantum; reschedule through the context to stay
    /// active. The return value reports whether work was done.
    fn run_task(&mut self, _ctx: &mut Context<'_>) -> bool {
        false
    }

    /// A timer scheduled by this element fired.
    fn run_timer(&mut self, _ctx: &mut Context<'_>) {}

    /// Named handlers this element exposes.
    fn handlers(&self) -> Vec<HandlerSpec> {
        Vec::new()
    }

    /// Evaluate a read handler. `now` is the current virtual time.
    fn read_handler(&self, _name: &str, _now: Timestamp) -> Option<String> {
        None
    }

    /// Evaluate a write handler.
    fn write_handler(
        &mut self,
        _name: &str,
        _value: &str,
        _errh: &mut dyn ErrorSink,
    ) -> Outcome {
        Err(ElementError)
    }
}

impl fmt::Debug for dyn Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<element {}>", self.class_name())
    }
}

/// Per-call context: the running element's identity plus access to
/// its neighbors, the clock, and the scheduler queues.
pub struct Context<'a> {
    pub(super) rt: &'a RtInner,
    pub(super) eid: usize,
}

impl<'a> Context<'a> {
    pub(super) fn new(rt: &'a RtInner, eid: usize) -> Self {
        Self { rt, eid }
    }

    pub fn name(&self) -> &SmolStr {
        &self.rt.names[self.eid]
    }

    pub fn ninputs(&self) -> usize {
        self.rt.in_edges[self.eid].len()
    }

    pub fn noutputs(&self) -> usize {
        self.rt.out_edges[self.eid].len()
    }

    pub fn input_is_pull(&self, port: usize) -> bool {
        self.rt.in_processing[self.eid]
            .get(port)
            .is_some_and(|p| p & PULL != 0)
    }

    pub fn output_is_push(&self, port: usize) -> bool {
        self.rt.out_processing[self.eid]
            .get(port)
            .is_some_and(|p| p & PUSH != 0)
    }

    /// Hand `pkt` to the element downstream of output `port`.
    /// Unconnected ports drop the packet.
    pub fn push(&mut self, port: usize, pkt: Packet) {
        let Some(&Some((te, tp))) = self.rt.out_edges[self.eid].get(port) else {
            return;
        };
        let mut elt = self.rt.elements[te].borrow_mut();
        elt.push(tp, pkt, &mut Context::new(self.rt, te));
    }

    /// Request a packet from the element upstream of input `port`.
    pub fn pull(&mut self, port: usize) -> Option<Packet> {
        let &Some((fe, fp)) = self.rt.in_edges[self.eid].get(port)? else {
            return None;
        };
        let mut elt = self.rt.elements[fe].borrow_mut();
        elt.pull(fp, &mut Context::new(self.rt, fe))
    }

    /// Current virtual time.
    pub fn now(&self) -> Timestamp {
        self.rt.now.get()
    }

    /// Register this element's task with the given ticket weight,
    /// initially scheduled.
    pub fn register_task(&self, tickets: u32) {
        self.rt.tasks.borrow_mut().register(self.eid, tickets);
    }

    pub fn reschedule(&self) {
        self.rt.tasks.borrow_mut().reschedule(self.eid);
    }

    pub fn unschedule(&self) {
        self.rt.tasks.borrow_mut().unschedule(self.eid);
    }

    pub fn task_scheduled(&self) -> bool {
        self.rt.tasks.borrow().is_scheduled(self.eid)
    }

    /// Arrange for `run_timer` to fire `ms` milliseconds from now.
    pub fn timer_after_msec(&self, ms: u64) {
        let deadline = self.rt.now.get().after_msec(ms);
        self.rt.timers.borrow_mut().schedule_at(deadline, self.eid);
    }

    pub fn timer_after_usec(&self, us: u64) {
        let deadline = self.rt.now.get().after_usec(us);
        self.rt.timers.borrow_mut().schedule_at(deadline, self.eid);
    }

    /// Reschedule the task of the element connected downstream of
    /// output `port`. Lets a queue wake an idle puller when packets
    /// arrive; a no-op when the consumer has no registered task.
    pub fn wake_output_consumer(&self, port: usize) {
        if let Some(&Some((te, _))) = self.rt.out_edges[self.eid].get(port) {
            self.rt.tasks.borrow_mut().reschedule(te);
        }
    }

    /// Request router shutdown at the next scheduler iteration.
    pub fn stop_router(&self) {
        self.rt.stop.set(true);
    }
}
