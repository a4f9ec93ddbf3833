//! Semantic analysis of router graphs.
//!
//! Three engines operate over a parsed [`crate::graph::Router`]:
//!
//! - flow codes ([`FlowCode`]): which inputs of an element can cause
//!   activity on which outputs;
//! - processing inference ([`Processing`]): assigning push/pull
//!   disciplines to every port and validating connections;
//! - class resolution ([`resolve_classes`], [`check_types`]):
//!   substituting the error class for unknown names and checking
//!   compound bodies recursively.

mod flow;
mod processing;
mod resolve;

pub use flow::{Bits, FlowCode};
pub use processing::{AGNOSTIC, PERROR, PULL, PUSH, Processing};
pub use resolve::{check_types, resolve_classes};
