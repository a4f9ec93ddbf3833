//! Error reporting.
//!
//! Every stage of the pipeline reports diagnostics through an
//! [`ErrorSink`]: a landmark, a severity, and a message. Sinks can be
//! stacked; a [`PrefixSink`] attributes nested contexts (for example
//! statements inlined from `require(library ...)`), a [`BufferSink`]
//! collects diagnostics for later inspection, and the top-level
//! [`FileSink`] prints to stderr and keeps the error count that decides
//! the process exit status.

mod sink;

pub use sink::{
    BufferSink, Diagnostic, ErrorSink, ErrorSinkExt, FileSink, LandmarkSink, PrefixSink, Severity,
    SilentSink,
};
