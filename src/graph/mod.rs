//! The configuration graph data model.
//!
//! A [`Router`] is a graph of [`Element`] declarations joined by
//! [`Connection`]s, together with its declared element classes,
//! requirements, and variable scope. Routers double as the bodies of
//! compound element classes; tunnels (`input` / `output`) model the
//! compound's external ports.
//!
//! The model is produced by the parser, transformed by flattening and
//! requirement resolution, and consumed by processing inference and
//! element instantiation.

mod class;
mod connection;
mod element;
mod flatten;
mod router;
mod scope;
mod unparse;

pub use class::{ClassKind, CompoundClass, ElementClass};
pub use connection::{Connection, ElementId, Port};
pub use element::Element;
pub use flatten::{flatten, select_overload};
pub use router::Router;
pub use scope::{Formal, Scope, ScopeChain};

/// Name of the tunnel modeling a compound's external inputs.
pub const TUNNEL_INPUT: &str = "input";
/// Name of the tunnel modeling a compound's external outputs.
pub const TUNNEL_OUTPUT: &str = "output";
/// Name of the reserved error-reporting element class.
pub const ERROR_CLASS: &str = "Error";
/// The variadic keyword formal that collects leftover arguments.
pub const REST_FORMAL: &str = "__REST__";
