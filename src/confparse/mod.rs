//! Configuration-string parsing utilities.
//!
//! Element `configure` routines and the configuration engine share
//! these primitives: argument-list splitting that honors balanced
//! parentheses, brackets, and quotes; string (un)quoting with raw
//! `\<...>` hex segments; integer, boolean, and fixed-point parsers;
//! network address forms; and `$variable` expansion.
//!
//! Everything here is pure: no sink access, no graph knowledge.
//! Callers translate [`ArgError`] values into positioned diagnostics.

mod args;
mod expand;
mod net;
mod numbers;
mod strings;

pub use args::{Args, FromArg, shift_spacevec, split_args, split_spacevec};
pub use expand::expand_variables;
pub use net::{EtherAddr, parse_ethernet, parse_ip_prefix, parse_ipv4, parse_ipv6};
pub use numbers::{parse_bool, parse_fixed_point, parse_integer, parse_interval_ms, parse_unsigned};
pub use strings::{is_word, quote, unquote};

use thiserror::Error;

/// Failure of a primitive parser. The message is user-facing; callers
/// add the argument name and landmark.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("{0} out of range")]
    OutOfRange(&'static str),
    #[error("garbage after {0}")]
    Trailing(&'static str),
    #[error("{0}")]
    Other(String),
}
