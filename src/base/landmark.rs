//! Landmarks: the (file, line) pairs attached to tokens, graph nodes,
//! and diagnostics.

use std::fmt;
use std::sync::Arc;

/// A source location. Cloning is cheap (the filename is shared).
///
/// Landmarks follow `#line` directives, so the file and line may differ
/// from the physical position in the lexed text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Landmark {
    file: Arc<str>,
    line: u32,
}

impl Landmark {
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// A landmark for objects with no source position.
    pub fn unknown() -> Self {
        Self {
            file: Arc::from(""),
            line: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn with_line(&self, line: u32) -> Self {
        Self {
            file: Arc::clone(&self.file),
            line,
        }
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Landmark::unknown()
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else if self.file.is_empty() {
            write!(f, "line {}", self.line)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

impl fmt::Debug for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Incremental landmark tracking for a file being lexed.
///
/// The builder owns the current (file, line) state; `#line` directives
/// replace it mid-stream.
#[derive(Clone)]
pub struct LandmarkBuilder {
    file: Arc<str>,
    original_file: Arc<str>,
    line: u32,
}

impl LandmarkBuilder {
    pub fn new(file: impl Into<Arc<str>>) -> Self {
        let file = file.into();
        Self {
            original_file: Arc::clone(&file),
            file,
            line: 1,
        }
    }

    pub fn landmark(&self) -> Landmark {
        Landmark {
            file: Arc::clone(&self.file),
            line: self.line,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn newline(&mut self) {
        self.line += 1;
    }

    pub fn advance_lines(&mut self, n: u32) {
        self.line += n;
    }

    /// Apply a `#line N ["FILE"]` directive. An empty filename returns
    /// to the input file's own name.
    pub fn set_position(&mut self, line: u32, file: Option<&str>) {
        self.line = line;
        match file {
            Some("") => self.file = Arc::clone(&self.original_file),
            Some(f) => self.file = Arc::from(f),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Landmark::new("conf.click", 12).to_string(), "conf.click:12");
        assert_eq!(Landmark::unknown().to_string(), "<unknown>");
    }

    #[test]
    fn test_builder_tracks_lines() {
        let mut b = LandmarkBuilder::new("x.click");
        b.newline();
        b.newline();
        assert_eq!(b.landmark(), Landmark::new("x.click", 3));
    }

    #[test]
    fn test_line_directive_and_reset() {
        let mut b = LandmarkBuilder::new("x.click");
        b.set_position(100, Some("other.click"));
        assert_eq!(b.landmark().to_string(), "other.click:100");
        b.set_position(5, Some(""));
        assert_eq!(b.landmark().to_string(), "x.click:5");
    }
}
