//! Packet sources.

use crate::base::Landmark;
use crate::confparse::Args;
use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::runtime::{
    Context, DEFAULT_TICKETS, Element, ElementError, HandlerSpec, Outcome, Packet, Timestamp,
};

fn default_data() -> Vec<u8> {
    vec![0; 64]
}

/// `InfiniteSource([DATA, LIMIT, BURST, ACTIVE])`
///
/// Emits up to BURST copies of DATA per task quantum, LIMIT packets
/// total (-1 for no limit). The emitted packets carry the current
/// virtual time in their timestamp annotation.
pub struct InfiniteSource {
    data: Vec<u8>,
    limit: i64,
    burst: u64,
    active: bool,
    count: u64,
}

impl Default for InfiniteSource {
    fn default() -> Self {
        Self {
            data: default_data(),
            limit: -1,
            burst: 1,
            active: true,
            count: 0,
        }
    }
}

impl InfiniteSource {
    fn done(&self) -> bool {
        self.limit >= 0 && self.count >= self.limit as u64
    }
}

impl Element for InfiniteSource {
    fn class_name(&self) -> &'static str {
        "InfiniteSource"
    }

    fn port_count(&self) -> &'static str {
        "0/1"
    }

    fn processing(&self) -> &'static str {
        "h"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        Args::new(args, Landmark::unknown(), errh)
            .read_keyword("DATA", &mut self.data)
            .read_keyword("LIMIT", &mut self.limit)
            .read_keyword("BURST", &mut self.burst)
            .read_keyword("ACTIVE", &mut self.active)
            .read_positional_opt("DATA", &mut self.data)
            .read_positional_opt("LIMIT", &mut self.limit)
            .read_positional_opt("BURST", &mut self.burst)
            .read_positional_opt("ACTIVE", &mut self.active)
            .complete()
            .map_err(|()| ElementError)?;
        if self.burst == 0 {
            self.burst = 1;
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _errh: &mut dyn ErrorSink) -> Outcome {
        ctx.register_task(DEFAULT_TICKETS);
        if !self.active || self.done() {
            ctx.unschedule();
        }
        Ok(())
    }

    fn run_task(&mut self, ctx: &mut Context<'_>) -> bool {
        if !self.active || self.done() {
            return false;
        }
        let mut n = self.burst;
        if self.limit >= 0 {
            n = n.min(self.limit as u64 - self.count);
        }
        for _ in 0..n {
            let mut pkt = Packet::from_data(&self.data);
            pkt.set_timestamp_anno(ctx.now());
            ctx.push(0, pkt);
        }
        self.count += n;
        if !self.done() {
            ctx.reschedule();
        }
        n > 0
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::read("count"),
            HandlerSpec::read_write("active"),
            HandlerSpec::write("reset"),
        ]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            "active" => Some(format!("{}\n", self.active)),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        name: &str,
        value: &str,
        errh: &mut dyn ErrorSink,
    ) -> Outcome {
        match name {
            "reset" => {
                self.count = 0;
                Ok(())
            }
            "active" => match crate::confparse::parse_bool(value) {
                Ok(b) => {
                    self.active = b;
                    Ok(())
                }
                Err(e) => {
                    errh.error(&Landmark::unknown(), format!("active: {e}"));
                    Err(ElementError)
                }
            },
            _ => Err(ElementError),
        }
    }
}

/// `TimedSource([INTERVAL, DATA])`
///
/// Emits one DATA packet every INTERVAL seconds (default 0.5) on a
/// timer.
pub struct TimedSource {
    interval_ms: u64,
    data: Vec<u8>,
    active: bool,
    count: u64,
}

impl Default for TimedSource {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            data: default_data(),
            active: true,
            count: 0,
        }
    }
}

impl Element for TimedSource {
    fn class_name(&self) -> &'static str {
        "TimedSource"
    }

    fn port_count(&self) -> &'static str {
        "0/1"
    }

    fn processing(&self) -> &'static str {
        "h"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        let mut interval = String::new();
        Args::new(args, Landmark::unknown(), errh)
            .read_keyword("INTERVAL", &mut interval)
            .read_keyword("DATA", &mut self.data)
            .read_keyword("ACTIVE", &mut self.active)
            .read_positional_opt("INTERVAL", &mut interval)
            .read_positional_opt("DATA", &mut self.data)
            .complete()
            .map_err(|()| ElementError)?;
        if !interval.is_empty() {
            match crate::confparse::parse_interval_ms(&interval) {
                Ok(ms) if ms > 0 => self.interval_ms = ms,
                _ => {
                    errh.error(&Landmark::unknown(), "INTERVAL: expected positive interval");
                    return Err(ElementError);
                }
            }
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _errh: &mut dyn ErrorSink) -> Outcome {
        if self.active {
            ctx.timer_after_msec(self.interval_ms);
        }
        Ok(())
    }

    fn run_timer(&mut self, ctx: &mut Context<'_>) {
        if !self.active {
            return;
        }
        let mut pkt = Packet::from_data(&self.data);
        pkt.set_timestamp_anno(ctx.now());
        ctx.push(0, pkt);
        self.count += 1;
        ctx.timer_after_msec(self.interval_ms);
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::read("count"),
            HandlerSpec::read_write("active"),
        ]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            "active" => Some(format!("{}\n", self.active)),
            _ => None,
        }
    }

    fn write_handler(
        &mut self,
        name: &str,
        value: &str,
        errh: &mut dyn ErrorSink,
    ) -> Outcome {
        match name {
            "active" => match crate::confparse::parse_bool(value) {
                Ok(b) => {
                    self.active = b;
                    Ok(())
                }
                Err(e) => {
                    errh.error(&Landmark::unknown(), format!("active: {e}"));
                    Err(ElementError)
                }
            },
            _ => Err(ElementError),
        }
    }
}

/// `RatedSource([RATE, LIMIT, DATA])`
///
/// Emits DATA packets at RATE packets per second (default 10), LIMIT
/// total (-1 for no limit), using a timer at the packet spacing.
pub struct RatedSource {
    rate: u64,
    limit: i64,
    data: Vec<u8>,
    count: u64,
}

impl Default for RatedSource {
    fn default() -> Self {
        Self {
            rate: 10,
            limit: -1,
            data: default_data(),
            count: 0,
        }
    }
}

impl RatedSource {
    fn spacing_usec(&self) -> u64 {
        1_000_000 / self.rate.max(1)
    }

    fn done(&self) -> bool {
        self.limit >= 0 && self.count >= self.limit as u64
    }
}

impl Element for RatedSource {
    fn class_name(&self) -> &'static str {
        "RatedSource"
    }

    fn port_count(&self) -> &'static str {
        "0/1"
    }

    fn processing(&self) -> &'static str {
        "h"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        Args::new(args, Landmark::unknown(), errh)
            .read_keyword("RATE", &mut self.rate)
            .read_keyword("LIMIT", &mut self.limit)
            .read_keyword("DATA", &mut self.data)
            .read_positional_opt("RATE", &mut self.rate)
            .read_positional_opt("LIMIT", &mut self.limit)
            .read_positional_opt("DATA", &mut self.data)
            .complete()
            .map_err(|()| ElementError)?;
        if self.rate == 0 {
            errh.error(&Landmark::unknown(), "RATE must be positive");
            return Err(ElementError);
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut Context<'_>, _errh: &mut dyn ErrorSink) -> Outcome {
        if !self.done() {
            ctx.timer_after_usec(self.spacing_usec());
        }
        Ok(())
    }

    fn run_timer(&mut self, ctx: &mut Context<'_>) {
        if self.done() {
            return;
        }
        let mut pkt = Packet::from_data(&self.data);
        pkt.set_timestamp_anno(ctx.now());
        ctx.push(0, pkt);
        self.count += 1;
        if !self.done() {
            ctx.timer_after_usec(self.spacing_usec());
        }
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![HandlerSpec::read("count"), HandlerSpec::read("rate")]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            "rate" => Some(format!("{}\n", self.rate)),
            _ => None,
        }
    }
}
