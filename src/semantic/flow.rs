//! Flow codes: per-class descriptions of which inputs can influence
//! which outputs.
//!
//! A flow code is `inputs / outputs`, each side a sequence of port
//! classes: a letter, a bracketed set `[abc]` or complement `[^abc]`,
//! or `#` (a class unique to the port's index). Two ports communicate
//! iff their class sets intersect. When a side has fewer codes than
//! the element has ports, the last code repeats.

use crate::errors::{ErrorSink, ErrorSinkExt};

use crate::base::Landmark;

/// A 256-bit class set: 128 letter classes plus 128 per-port classes
/// for `#`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bits([u64; 4]);

impl Bits {
    pub fn set(&mut self, bit: usize) {
        self.0[bit / 64] |= 1 << (bit % 64);
    }

    pub fn negate(&mut self) {
        for w in &mut self.0 {
            *w = !*w;
        }
    }

    pub fn intersects(&self, other: &Bits) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }
}

/// One port-class specification.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ClassSpec {
    /// Letters and/or `#`, possibly complemented.
    Set {
        letters: Vec<u8>,
        hash: bool,
        negated: bool,
    },
}

impl ClassSpec {
    fn bits(&self, port: usize) -> Bits {
        let ClassSpec::Set {
            letters,
            hash,
            negated,
        } = self;
        let mut bits = Bits::default();
        for &l in letters {
            bits.set(l as usize);
        }
        if *hash {
            bits.set(128 + (port & 127));
        }
        if *negated {
            bits.negate();
        }
        bits
    }
}

/// A parsed flow code. `None` stands for full connectivity (the empty
/// code and `x/x`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowCode {
    input: Vec<ClassSpec>,
    output: Vec<ClassSpec>,
}

impl FlowCode {
    /// Parse a flow code. `Ok(None)` means full connectivity; errors
    /// are reported and should be treated as full connectivity with a
    /// warning by the caller.
    pub fn parse(code: &str) -> Result<Option<FlowCode>, String> {
        let code = code.trim();
        if code.is_empty() || code == "x/x" {
            return Ok(None);
        }

        let (in_part, out_part) = match code.split_once('/') {
            None => (code, code),
            Some((_, o)) if o.is_empty() || o.starts_with('/') => {
                return Err("flow code: bad '/'".to_string());
            }
            Some((i, o)) => (i, o),
        };

        Ok(Some(FlowCode {
            input: Self::parse_side(in_part)?,
            output: Self::parse_side(out_part)?,
        }))
    }

    /// Parse a flow code, downgrading syntax errors to full
    /// connectivity with a warning.
    pub fn parse_lenient(
        code: &str,
        class_name: &str,
        landmark: &Landmark,
        errh: &mut dyn ErrorSink,
    ) -> Option<FlowCode> {
        match Self::parse(code) {
            Ok(fc) => fc,
            Err(msg) => {
                errh.warning(
                    landmark,
                    format!("{msg} in flow code '{code}' for '{class_name}'"),
                );
                None
            }
        }
    }

    fn parse_side(side: &str) -> Result<Vec<ClassSpec>, String> {
        let b = side.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < b.len() {
            match b[i] {
                b'[' => {
                    let mut spec = ClassSpec::Set {
                        letters: Vec::new(),
                        hash: false,
                        negated: false,
                    };
                    let ClassSpec::Set {
                        letters,
                        hash,
                        negated,
                    } = &mut spec;
                    i += 1;
                    if i < b.len() && b[i] == b'^' {
                        *negated = true;
                        i += 1;
                    }
                    let mut closed = false;
                    while i < b.len() {
                        match b[i] {
                            b']' => {
                                closed = true;
                                i += 1;
                                break;
                            }
                            c if c.is_ascii_alphabetic() => letters.push(c),
                            b'#' => *hash = true,
                            c => {
                                return Err(format!(
                                    "flow code: invalid character '{}'",
                                    c as char
                                ));
                            }
                        }
                        i += 1;
                    }
                    if !closed {
                        return Err("flow code: missing ']'".to_string());
                    }
                    out.push(spec);
                }
                c if c.is_ascii_alphabetic() => {
                    out.push(ClassSpec::Set {
                        letters: vec![c],
                        hash: false,
                        negated: false,
                    });
                    i += 1;
                }
                b'#' => {
                    out.push(ClassSpec::Set {
                        letters: Vec::new(),
                        hash: true,
                        negated: false,
                    });
                    i += 1;
                }
                c => {
                    return Err(format!("flow code: invalid character '{}'", c as char));
                }
            }
        }
        if out.is_empty() {
            return Err("flow code: empty side".to_string());
        }
        Ok(out)
    }

    fn side(&self, isoutput: bool) -> &[ClassSpec] {
        if isoutput { &self.output } else { &self.input }
    }

    /// Class bits of one port. Ports beyond the code reuse the final
    /// class specification (with their own index for `#`).
    pub fn port_bits(&self, port: usize, isoutput: bool) -> Bits {
        let side = self.side(isoutput);
        let spec = side.get(port).unwrap_or_else(|| side.last().unwrap());
        spec.bits(port)
    }
}

/// Which ports on the opposite side the given port communicates with.
/// `flow == None` means every port. The result has `opposite_count`
/// entries.
pub fn port_flow(
    flow: Option<&FlowCode>,
    port: usize,
    isoutput: bool,
    opposite_count: usize,
) -> Vec<bool> {
    match flow {
        None => vec![true; opposite_count],
        Some(fc) => {
            let source = fc.port_bits(port, isoutput);
            (0..opposite_count)
                .map(|i| source.intersects(&fc.port_bits(i, !isoutput)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flows(code: &str, port: usize, isoutput: bool, n: usize) -> Vec<bool> {
        let fc = FlowCode::parse(code).unwrap();
        port_flow(fc.as_ref(), port, isoutput, n)
    }

    #[test]
    fn test_full_connectivity() {
        assert_eq!(FlowCode::parse("").unwrap(), None);
        assert_eq!(FlowCode::parse("x/x").unwrap(), None);
        assert_eq!(flows("", 0, false, 3), vec![true, true, true]);
    }

    #[test]
    fn test_disjoint() {
        // no input influences any output
        assert_eq!(flows("x/y", 0, false, 2), vec![false, false]);
    }

    #[test]
    fn test_positional_classes() {
        // input 0 reaches output 0 only; input 1 reaches output 1
        assert_eq!(flows("xy/xy", 0, false, 2), vec![true, false]);
        assert_eq!(flows("xy/xy", 1, false, 2), vec![false, true]);
    }

    #[test]
    fn test_last_code_repeats() {
        // single input code serves all inputs
        assert_eq!(flows("x/xxy", 2, true, 1), vec![false]);
        assert_eq!(flows("x/xxy", 1, true, 1), vec![true]);
    }

    #[test]
    fn test_bracket_sets() {
        assert_eq!(flows("[xy]/x", 0, false, 1), vec![true]);
        assert_eq!(flows("[^x]/x", 0, false, 1), vec![false]);
        assert_eq!(flows("[^x]/y", 0, false, 1), vec![true]);
    }

    #[test]
    fn test_hash_per_port() {
        // '#' ties same-index ports together
        assert_eq!(flows("#/#", 0, false, 3), vec![true, false, false]);
        assert_eq!(flows("#/#", 2, false, 3), vec![false, false, true]);
        // the repeated final '#' uses each port's own index
        assert_eq!(flows("#/#", 5, false, 7), {
            let mut v = vec![false; 7];
            v[5] = true;
            v
        });
    }

    #[test]
    fn test_syntax_errors() {
        assert!(FlowCode::parse("x/").is_err());
        assert!(FlowCode::parse("[x/y").is_err());
        assert!(FlowCode::parse("x!/y").is_err());
    }
}
