//! Measurement elements.

use crate::runtime::{Element, HandlerSpec, Outcome, Packet, Timestamp};

use crate::errors::ErrorSink;

/// `Counter()`
///
/// Passes packets through unchanged, counting them. The packet rate
/// is computed from the timestamp annotations of the first and last
/// packets seen.
#[derive(Default)]
pub struct Counter {
    count: u64,
    first: Option<Timestamp>,
    last: Timestamp,
}

impl Counter {
    pub fn count(&self) -> u64 {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0;
        self.first = None;
        self.last = Timestamp::ZERO;
    }

    fn rate(&self) -> u64 {
        let Some(first) = self.first else {
            return 0;
        };
        let elapsed = self.last.since(first).max(1);
        self.count * 1_000_000 / elapsed
    }
}

impl Element for Counter {
    fn class_name(&self) -> &'static str {
        "Counter"
    }

    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        self.count += 1;
        let t = pkt.timestamp_anno();
        if self.first.is_none() {
            self.first = Some(t);
        }
        self.last = t;
        Some(pkt)
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::read("count"),
            HandlerSpec::read("rate"),
            HandlerSpec::write("reset"),
        ]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            "rate" => Some(format!("{}\n", self.rate())),
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
            "reset" => {
                self.reset();
                Ok(())
            }
            _ => Err(crate::runtime::ElementError),
        }
    }
}

/// `AverageCounter()`
///
/// Like [`Counter`] but also tracks byte counts and exposes byte
/// rates.
#[derive(Default)]
pub struct AverageCounter {
    count: u64,
    byte_count: u64,
    first: Option<Timestamp>,
    last: Timestamp,
}

impl AverageCounter {
    fn elapsed_usec(&self) -> u64 {
        match self.first {
            Some(first) => self.last.since(first).max(1),
            None => 1,
        }
    }
}

impl Element for AverageCounter {
    fn class_name(&self) -> &'static str {
        "AverageCounter"
    }

    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        self.count += 1;
        self.byte_count += pkt.len() as u64;
        let t = pkt.timestamp_anno();
        if self.first.is_none() {
            self.first = Some(t);
        }
        self.last = t;
        Some(pkt)
    }

    fn handlers(&self) -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::read("count"),
            HandlerSpec::read("byte_count"),
            HandlerSpec::read("rate"),
            HandlerSpec::read("byte_rate"),
            HandlerSpec::write("reset"),
        ]
    }

    fn read_handler(&self, name: &str, _now: Timestamp) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.count)),
            "byte_count" => Some(format!("{}\n", self.byte_count)),
            "rate" => Some(format!("{}\n", self.count * 1_000_000 / self.elapsed_usec())),
            "byte_rate" => Some(format!(
                "{}\n",
                self.byte_count * 1_000_000 / self.elapsed_usec()
            )),
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
            "reset" => {
                *self = Self::default();
                Ok(())
            }
            _ => Err(crate::runtime::ElementError),
        }
    }
}
