//! Header stripping.

use crate::base::Landmark;
use crate::confparse::Args;
use crate::errors::ErrorSink;
use crate::runtime::{Element, ElementError, Outcome, Packet};

/// `Strip(LENGTH)`
///
/// Removes LENGTH bytes from the front of each packet.
#[derive(Default)]
pub struct Strip {
    length: usize,
}

impl Element for Strip {
    fn class_name(&self) -> &'static str {
        "Strip"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        Args::new(args, Landmark::unknown(), errh)
            .read_positional("LENGTH", &mut self.length)
            .complete()
            .map_err(|()| ElementError)
    }

    fn simple_action(&mut self, mut pkt: Packet) -> Option<Packet> {
        pkt.pull(self.length);
        Some(pkt)
    }
}
