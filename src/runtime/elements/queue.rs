//! Packet storage between push and pull contexts.

use std::collections::VecDeque;

use crate::base::Landmark;
use crate::confparse::Args;
use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::runtime::{
    Context, DEFAULT_TICKETS, Element, ElementError, HandlerSpec, Outcome, Packet, Timestamp,
};

/// `Queue([CAPACITY])`
///
/// A FIFO with push input and pull output. Packets arriving at a full
/// queue are dropped. Arriving packets wake the downstream puller's
/// task.
pub struct Queue {
    packets: VecDeque<Packet>,
    capacity: usize,
    drops: u64,
    highwater: usize,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            packets: VecDeque::new(),
            capacity: 1000,
            drops: 0,
            highwater: 0,
        }
    }
}

impl Queue {
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl Element for Queue {
    fn class_name(&self) -> &'static str {
        "Queue"
    }

    fn processing(&self) -> &'static str {
        "h/l"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        Args::new(args, Landmark::unknown(), errh)
            .read_keyword("CAPACITY", &mut self.capacity)
            .read_positional_opt("CAPACITY", &mut self.capacity)
            .complete()
            .map_err(|()| ElementError)?;
        if self.capacity == 0 {
            errh.error(&Landmark::unknown(), "CAPACITY must be positive");
            return Err(ElementError);
        }
        Ok(())
    }

    fn push(&mut self, _port: usize, pkt: Packet, ctx: &mut Context<'_>) {
        if self.packets.len() >= self.capacity {
            self.drops += 1;
            pkt.kill();
            return;
        }
        let was_empty = self.packets.is_empty();
        self.packets.push_back(pkt);
        self.highwater = self.highwater.max(self.packets.len());
        if was_empty {
            ctx.wake_output_consumer(0);
        }
    }

    fn pull(&mut self, _port: usize, _ctx: &mut Context<'_>) -> Option<Packet> {
        self.packets.pop_front()
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::read("length"),
            HandlerSpec::read("highwater_length"),
            HandlerSpec::read("capacity"),
            HandlerSpec::read("drops"),
            HandlerSpec::write("reset_counts"),
        ]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "length" => Some(format!("{}\n", self.packets.len())),
            "highwater_length" => Some(format!("{}\n", self.highwater)),
            "capacity" => Some(format!("{}\n", self.capacity)),
            "drops" => Some(format!("{}\n", self.drops)),
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
                self.drops = 0;
                self.highwater = self.packets.len();
                Ok(())
            }
            _ => Err(ElementError),
        }
    }
}

/// `Unqueue([BURST])`
///
/// Actively pulls packets from its input and pushes them downstream,
/// up to BURST per task quantum. Goes idle when the input runs dry;
/// the upstream queue wakes it when packets arrive.
pub struct Unqueue {
    burst: u64,
    count: u64,
}

impl Default for Unqueue {
    fn default() -> Self {
        Self { burst: 8, count: 0 }
    }
}

impl Element for Unqueue {
    fn class_name(&self) -> &'static str {
        "Unqueue"
    }

    fn processing(&self) -> &'static str {
        "l/h"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        Args::new(args, Landmark::unknown(), errh)
            .read_keyword("BURST", &mut self.burst)
            .read_positional_opt("BURST", &mut self.burst)
            .complete()
            .map_err(|()| ElementError)?;
        if self.burst == 0 {
            self.burst = 1;
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _errh: &mut dyn ErrorSink) -> Outcome {
        ctx.register_task(DEFAULT_TICKETS);
        Ok(())
    }

    fn run_task(&mut self, ctx: &mut Context<'_>) -> bool {
        let mut worked = 0;
        while worked < self.burst {
            match ctx.pull(0) {
                Some(pkt) => {
                    self.count += 1;
                    worked += 1;
                    ctx.push(0, pkt);
                }
                None => break,
            }
        }
        if worked == self.burst {
            ctx.reschedule();
        }
        worked > 0
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![HandlerSpec::read("count")]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            _ => None,
        }
    }
}
