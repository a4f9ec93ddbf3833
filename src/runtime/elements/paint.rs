//! Paint annotations: tagging and routing by tag.

use crate::base::Landmark;
use crate::confparse::Args;
use crate::errors::ErrorSink;
use crate::runtime::{Context, Element, ElementError, Outcome, Packet};

/// `Paint(COLOR)`
///
/// Sets each packet's paint annotation to COLOR.
#[derive(Default)]
pub struct Paint {
    color: u8,
}

impl Element for Paint {
    fn class_name(&self) -> &'static str {
        "Paint"
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Outcome {
        Args::new(args, Landmark::unknown(), errh)
            .read_keyword("COLOR", &mut self.color)
            .read_positional_opt("COLOR", &mut self.color)
            .complete()
            .map_err(|()| ElementError)
    }

    fn simple_action(&mut self, mut pkt: Packet) -> Option<Packet> {
        pkt.set_paint_anno(self.color);
        Some(pkt)
    }
}

/// `PaintSwitch()`
///
/// Pushes each packet to the output numbered by its paint
/// annotation; packets painted past the last output are dropped.
#[derive(Default)]
pub struct PaintSwitch;

impl Element for PaintSwitch {
    fn class_name(&self) -> &'static str {
        "PaintSwitch"
    }

    fn port_count(&self) -> &'static str {
        "1/-"
    }

    fn processing(&self) -> &'static str {
        "h/h"
    }

    fn push(&mut self, _port: usize, pkt: Packet, ctx: &mut Context<'_>) {
        let out = pkt.paint_anno() as usize;
        if out < ctx.noutputs() {
            ctx.push(out, pkt);
        } else {
            pkt.kill();
        }
    }
}
