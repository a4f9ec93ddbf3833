//! The element runtime: packets, the element contract, handlers,
//! tasks, timers, and the cooperative scheduler.
//!
//! All element code runs on the scheduler's thread. Packets are
//! single-owner values whose clones share a copy-on-write buffer;
//! ownership transfers on every push and pull.

mod context;
pub mod elements;
mod packet;
mod registry;
mod scheduler;
mod task;

pub use context::{CleanupStage, Context, Element, ElementError, HandlerSpec, Outcome};
pub use packet::{Annotations, DEFAULT_HEADROOM, Packet};
pub use registry::{Constructor, default_elementmap, install_defaults, make_element, register_element};
pub use scheduler::{ElementSetup, RouterRt};
pub use task::{DEFAULT_TICKETS, TaskQueue, TimerQueue, Timestamp};
