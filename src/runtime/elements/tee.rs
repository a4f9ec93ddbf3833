//! Packet duplication.

use crate::runtime::{Context, Element, Packet};

/// `Tee()`
///
/// Pushes a copy of each input packet to every output. The clones
/// share the buffer until someone writes.
#[derive(Default)]
pub struct Tee;

impl Element for Tee {
    fn class_name(&self) -> &'static str {
        "Tee"
    }

    fn port_count(&self) -> &'static str {
        "1/1-"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn push(&mut self, _port: usize, pkt: Packet, ctx: &mut Context<'_>) {
        let n = ctx.noutputs();
        for port in 0..n.saturating_sub(1) {
            ctx.push(port, pkt.clone());
        }
        if n > 0 {
            ctx.push(n - 1, pkt);
        }
    }
}
