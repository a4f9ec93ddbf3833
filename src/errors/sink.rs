//! The error-sink abstraction and its standard implementations.

use std::fmt;
use std::io::Write;

use crate::base::Landmark;

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A hard error; counted and fatal to configuration loading.
    Error,
    /// A warning; reported but not counted.
    Warning,
    /// Additional context attached to a previous diagnostic.
    Message,
}

impl Severity {
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Message => "message",
        }
    }
}

/// A single reported diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub landmark: Landmark,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.landmark.is_unknown() {
            match self.severity {
                Severity::Error => write!(f, "{}", self.message),
                Severity::Warning => write!(f, "warning: {}", self.message),
                Severity::Message => write!(f, "{}", self.message),
            }
        } else {
            match self.severity {
                Severity::Error => write!(f, "{}: {}", self.landmark, self.message),
                Severity::Warning => write!(f, "{}: warning: {}", self.landmark, self.message),
                Severity::Message => write!(f, "{}: {}", self.landmark, self.message),
            }
        }
    }
}

/// Destination for diagnostics.
///
/// Implementations decide formatting, filtering, and accumulation; the
/// default methods give callers the convenient `error`/`warning` entry
/// points used throughout the crate.
pub trait ErrorSink {
    /// Deliver one diagnostic.
    fn report(&mut self, diag: Diagnostic);

    /// Number of errors seen so far (warnings and messages excluded).
    fn nerrors(&self) -> usize;
}

/// Convenience constructors for [`ErrorSink`], split into their own
/// trait (and blanket-implemented for every `ErrorSink`, including
/// `?Sized` ones) so that `dyn ErrorSink` receivers can still call
/// `error`/`warning`/`message` directly; the generic `impl Into<String>`
/// parameter would otherwise make `ErrorSink` itself dyn-incompatible.
pub trait ErrorSinkExt: ErrorSink {
    fn error(&mut self, landmark: &Landmark, message: impl Into<String>) {
        self.report(Diagnostic {
            landmark: landmark.clone(),
            severity: Severity::Error,
            message: message.into(),
        });
    }

    fn warning(&mut self, landmark: &Landmark, message: impl Into<String>) {
        self.report(Diagnostic {
            landmark: landmark.clone(),
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    fn message(&mut self, landmark: &Landmark, message: impl Into<String>) {
        self.report(Diagnostic {
            landmark: landmark.clone(),
            severity: Severity::Message,
            message: message.into(),
        });
    }
}

impl<T: ErrorSink + ?Sized> ErrorSinkExt for T {}

impl ErrorSink for &mut dyn ErrorSink {
    fn report(&mut self, diag: Diagnostic) {
        (**self).report(diag);
    }

    fn nerrors(&self) -> usize {
        (**self).nerrors()
    }
}

// ============================================================================
// STANDARD SINKS
// ============================================================================

/// Writes diagnostics to an `io::Write` target, one per line.
pub struct FileSink<W: Write> {
    out: W,
    nerrors: usize,
}

impl<W: Write> FileSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, nerrors: 0 }
    }
}

impl FileSink<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> ErrorSink for FileSink<W> {
    fn report(&mut self, diag: Diagnostic) {
        if diag.severity.is_error() {
            self.nerrors += 1;
        }
        let _ = writeln!(self.out, "{diag}");
    }

    fn nerrors(&self) -> usize {
        self.nerrors
    }
}

/// Discards diagnostics, still counting errors.
#[derive(Default)]
pub struct SilentSink {
    nerrors: usize,
}

impl SilentSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorSink for SilentSink {
    fn report(&mut self, diag: Diagnostic) {
        if diag.severity.is_error() {
            self.nerrors += 1;
        }
    }

    fn nerrors(&self) -> usize {
        self.nerrors
    }
}

/// Collects diagnostics in memory. Used by tests and by the handler
/// RPC surface, which must return error text rather than print it.
#[derive(Default)]
pub struct BufferSink {
    diagnostics: Vec<Diagnostic>,
    nerrors: usize,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// All diagnostics rendered one per line.
    pub fn take_text(&mut self) -> String {
        let mut s = String::new();
        for d in self.diagnostics.drain(..) {
            s.push_str(&d.to_string());
            s.push('\n');
        }
        s
    }

    /// Forward everything collected so far into another sink.
    pub fn drain_into(&mut self, sink: &mut dyn ErrorSink) {
        for d in self.diagnostics.drain(..) {
            sink.report(d);
        }
        self.nerrors = 0;
    }
}

impl ErrorSink for BufferSink {
    fn report(&mut self, diag: Diagnostic) {
        if diag.severity.is_error() {
            self.nerrors += 1;
        }
        self.diagnostics.push(diag);
    }

    fn nerrors(&self) -> usize {
        self.nerrors
    }
}

/// Prepends a context prefix to every message before forwarding.
///
/// Stacking several of these attributes diagnostics produced inside
/// nested parse contexts to their outer statements.
pub struct PrefixSink<'a> {
    inner: &'a mut dyn ErrorSink,
    prefix: String,
}

impl<'a> PrefixSink<'a> {
    pub fn new(inner: &'a mut dyn ErrorSink, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

impl ErrorSink for PrefixSink<'_> {
    fn report(&mut self, mut diag: Diagnostic) {
        diag.message = format!("{}{}", self.prefix, diag.message);
        self.inner.report(diag);
    }

    fn nerrors(&self) -> usize {
        self.inner.nerrors()
    }
}

/// Substitutes a default landmark on diagnostics that lack one.
pub struct LandmarkSink<'a> {
    inner: &'a mut dyn ErrorSink,
    landmark: Landmark,
}

impl<'a> LandmarkSink<'a> {
    pub fn new(inner: &'a mut dyn ErrorSink, landmark: Landmark) -> Self {
        Self { inner, landmark }
    }

    pub fn set_landmark(&mut self, landmark: Landmark) {
        self.landmark = landmark;
    }
}

impl ErrorSink for LandmarkSink<'_> {
    fn report(&mut self, mut diag: Diagnostic) {
        if diag.landmark.is_unknown() {
            diag.landmark = self.landmark.clone();
        }
        self.inner.report(diag);
    }

    fn nerrors(&self) -> usize {
        self.inner.nerrors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counting() {
        let mut sink = BufferSink::new();
        let lm = Landmark::new("t.click", 3);
        sink.error(&lm, "bad token");
        sink.warning(&lm, "unused port");
        assert_eq!(sink.nerrors(), 1);
        assert_eq!(sink.diagnostics().len(), 2);
    }

    #[test]
    fn test_display_formats() {
        let lm = Landmark::new("t.click", 3);
        let d = Diagnostic {
            landmark: lm.clone(),
            severity: Severity::Warning,
            message: "x".into(),
        };
        assert_eq!(d.to_string(), "t.click:3: warning: x");
        let d = Diagnostic {
            landmark: Landmark::unknown(),
            severity: Severity::Error,
            message: "top-level".into(),
        };
        assert_eq!(d.to_string(), "top-level");
    }

    #[test]
    fn test_prefix_stacking() {
        let mut buf = BufferSink::new();
        {
            let mut outer = PrefixSink::new(&mut buf, "In library a.click: ");
            let mut inner = PrefixSink::new(&mut outer, "In compound X: ");
            inner.error(&Landmark::new("a.click", 9), "oops");
        }
        assert_eq!(
            buf.diagnostics()[0].message,
            "In library a.click: In compound X: oops"
        );
        assert_eq!(buf.nerrors(), 1);
    }

    #[test]
    fn test_landmark_substitution() {
        let mut buf = BufferSink::new();
        {
            let mut sink = LandmarkSink::new(&mut buf, Landmark::new("d.click", 7));
            sink.error(&Landmark::unknown(), "no position");
            sink.error(&Landmark::new("d.click", 9), "has position");
        }
        assert_eq!(buf.diagnostics()[0].landmark.line(), 7);
        assert_eq!(buf.diagnostics()[1].landmark.line(), 9);
    }
}
