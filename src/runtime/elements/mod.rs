//! The built-in element library.
//!
//! Small, composable elements covering sources, counters, queues,
//! routing by annotation, and sinks. Each implements the element
//! contract in [`crate::runtime`]; behavior notes live on the
//! individual types.

mod counters;
mod paint;
mod queue;
mod sinks;
mod sources;
mod strip;
mod tee;

pub use counters::{AverageCounter, Counter};
pub use paint::{Paint, PaintSwitch};
pub use queue::{Queue, Unqueue};
pub use sinks::{Discard, ErrorElement, Idle};
pub use sources::{InfiniteSource, RatedSource, TimedSource};
pub use strip::Strip;
pub use tee::Tee;

use super::{Constructor, Element};

/// Constructors registered by `install_defaults`.
pub const DEFAULT_ELEMENTS: &[Constructor] = &[
    || Box::new(AverageCounter::default()) as Box<dyn Element>,
    || Box::new(Counter::default()),
    || Box::new(Discard::default()),
    || Box::new(ErrorElement::default()),
    || Box::new(Idle::default()),
    || Box::new(InfiniteSource::default()),
    || Box::new(Paint::default()),
    || Box::new(PaintSwitch::default()),
    || Box::new(Queue::default()),
    || Box::new(RatedSource::default()),
    || Box::new(Strip::default()),
    || Box::new(TimedSource::default()),
    || Box::new(Tee::default()),
    || Box::new(Unqueue::default()),
];
