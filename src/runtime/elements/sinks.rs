//! Packet sinks and the reserved error class.

use crate::base::Landmark;
use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::runtime::{
    Context, DEFAULT_TICKETS, Element, ElementError, HandlerSpec, Outcome, Packet, Timestamp,
};

/// `Discard()`
///
/// Drops every packet. On a push input it drops in place; on a pull
/// input it actively pulls and drops from a task.
#[derive(Default)]
pub struct Discard {
    count: u64,
}

impl Element for Discard {
    fn class_name(&self) -> &'static str {
        "Discard"
    }

    fn port_count(&self) -> &'static str {
        "1/0"
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _errh: &mut dyn ErrorSink) -> Outcome {
        if ctx.input_is_pull(0) {
            ctx.register_task(DEFAULT_TICKETS);
        }
        Ok(())
    }

    fn push(&mut self, _port: usize, pkt: Packet, _ctx: &mut Context<'_>) {
        self.count += 1;
        pkt.kill();
    }

    fn run_task(&mut self, ctx: &mut Context<'_>) -> bool {
        match ctx.pull(0) {
            Some(pkt) => {
                self.count += 1;
                pkt.kill();
                ctx.reschedule();
                true
            }
            None => false,
        }
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![HandlerSpec::read("count"), HandlerSpec::write("reset_counts")]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        name: &str,
        _value: &str,
        _errh: &mut dyn ErrorSink,
    ) -> Outcome {
        match name {
            "reset_counts" => {
                self.count = 0;
                Ok(())
            }
            _ => Err(ElementError),
        }
    }
}

/// `Idle()`
///
/// Accepts any number of connections, drops pushed packets, and never
/// produces one. Its flow code declares that no input reaches any
/// output.
#[derive(Default)]
pub struct Idle;

impl Element for Idle {
    fn class_name(&self) -> &'static str {
        "Idle"
    }

    fn port_count(&self) -> &'static str {
        "-/-"
    }

    fn flow_code(&self) -> &'static str {
        "x/y"
    }

    fn push(&mut self, _port: usize, pkt: Packet, _ctx: &mut Context<'_>) {
        pkt.kill();
    }

    fn pull(&mut self, _port: usize, _ctx: &mut Context<'_>) -> Option<Packet> {
        None
    }
}

/// The reserved error-reporting class. Unresolved element classes
/// are instantiated as this; configuration always fails.
#[derive(Default)]
pub struct ErrorElement;

impl Element for ErrorElement {
    fn class_name(&self) -> &'static str {
        "Error"
    }

    fn port_count(&self) -> &'static str {
        "-/-"
    }

    fn configure(&mut self, _args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        errh.error(
            &Landmark::unknown(),
            "'Error' element is not usable in a running configuration",
        );
        Err(ElementError)
    }

    fn push(&mut self, _port: usize, pkt: Packet, _ctx: &mut Context<'_>) {
        pkt.kill();
    }

    fn pull(&mut self, _port: usize, _ctx: &mut Context<'_>) -> Option<Packet> {
        None
    }
}
