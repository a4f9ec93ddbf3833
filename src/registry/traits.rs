//! Element traits and driver masks.

use smol_str::SmolStr;

/// A deployment target for configurations and element classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Driver {
    Userlevel,
    LinuxModule,
    BsdModule,
    Ns,
}

impl Driver {
    pub const COUNT: usize = 4;
    /// Mask covering every real driver.
    pub const ALL_MASK: u8 = 0x0f;
    /// Extra mask bit for the `multithread` pseudo-driver.
    pub const MULTITHREAD_BIT: u8 = 1 << 4;

    pub const ALL: [Driver; Driver::COUNT] = [
        Driver::Userlevel,
        Driver::LinuxModule,
        Driver::BsdModule,
        Driver::Ns,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Driver::Userlevel => "userlevel",
            Driver::LinuxModule => "linuxmodule",
            Driver::BsdModule => "bsdmodule",
            Driver::Ns => "ns",
        }
    }

    pub fn from_name(name: &str) -> Option<Driver> {
        Driver::ALL.iter().copied().find(|d| d.name() == name)
    }

    pub fn mask(self) -> u8 {
        1 << (self as u8)
    }

    /// Parse a driver specification: one driver name, or several
    /// separated by `|` or whitespace. Unknown words contribute
    /// nothing.
    pub fn parse_mask(spec: &str) -> u8 {
        let mut mask = 0;
        for word in spec.split(|c: char| c == '|' || c.is_ascii_whitespace()) {
            if let Some(d) = Driver::from_name(word) {
                mask |= d.mask();
            }
        }
        mask
    }
}

/// Per-class registry metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Traits {
    pub name: SmolStr,
    pub cxx: SmolStr,
    pub documentation_name: String,
    pub header_file: String,
    pub source_file: String,
    pub port_count_code: String,
    pub processing_code: String,
    pub flow_code: String,
    pub flags: String,
    pub methods: String,
    pub requirements: String,
    pub provisions: String,
    pub libs: String,
    pub noexport: String,
    pub driver_mask: u8,
}

impl Traits {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            driver_mask: Driver::ALL_MASK,
            ..Self::default()
        }
    }

    /// The mutable field named by a registry attribute or `$data`
    /// column, or `None` for unknown names (which are ignored).
    pub fn component_mut(&mut self, attr: &str) -> Option<&mut dyn ComponentField> {
        Some(match attr {
            "name" | "class" => &mut self.name,
            "cxxclass" | "cxx_class" => &mut self.cxx,
            "docname" | "doc_name" => &mut self.documentation_name,
            "headerfile" | "header_file" => &mut self.header_file,
            "sourcefile" | "source_file" => &mut self.source_file,
            "portcount" => &mut self.port_count_code,
            "processing" => &mut self.processing_code,
            "flowcode" => &mut self.flow_code,
            "flags" => &mut self.flags,
            "methods" => &mut self.methods,
            "requires" | "requirements" => &mut self.requirements,
            "provides" | "provisions" => &mut self.provisions,
            "libs" => &mut self.libs,
            "noexport" => &mut self.noexport,
            _ => return None,
        })
    }

    pub fn requires(&self, what: &str) -> bool {
        requirement_contains(&self.requirements, what)
    }

    pub fn provides(&self, what: &str) -> bool {
        what == self.name || requirement_contains(&self.provisions, what)
    }

    /// Value of a flag in the flags string: `C3` is 3, a bare flag is
    /// 1, an absent flag is `None`.
    pub fn flag_value(&self, flag: &str) -> Option<u32> {
        for word in self.flags.split_ascii_whitespace() {
            if let Some(rest) = word.strip_prefix(flag) {
                let rest = rest.strip_prefix('=').unwrap_or(rest);
                if rest.is_empty() {
                    return Some(1);
                }
                if rest.bytes().all(|b| b.is_ascii_digit()) {
                    return rest.parse().ok().or(Some(1));
                }
            }
        }
        None
    }

    pub fn allows_driver(&self, driver: Driver) -> bool {
        self.driver_mask & driver.mask() != 0
    }

    /// Derive the driver mask from driver-named requirements. A class
    /// with no driver requirement runs everywhere.
    pub fn calculate_driver_mask(&mut self) {
        let mut mask = 0;
        for d in Driver::ALL {
            if requirement_contains(&self.requirements, d.name()) {
                mask |= d.mask();
            }
        }
        if mask == 0 {
            mask = Driver::ALL_MASK;
        }
        if requirement_contains(&self.requirements, "multithread") {
            mask |= Driver::MULTITHREAD_BIT;
        }
        self.driver_mask = mask;
    }

    /// Parse this class's port-count code.
    pub fn port_count(&self) -> Result<PortCount, ()> {
        PortCount::parse(&self.port_count_code)
    }
}

/// Abstraction over the string-like fields of [`Traits`], letting one
/// attribute parser serve both registry formats.
pub trait ComponentField {
    fn set(&mut self, value: &str);
}

impl ComponentField for String {
    fn set(&mut self, value: &str) {
        *self = value.to_string();
    }
}

impl ComponentField for SmolStr {
    fn set(&mut self, value: &str) {
        *self = SmolStr::new(value);
    }
}

/// Word containment in a whitespace- or `|`-separated requirement
/// list.
fn requirement_contains(list: &str, word: &str) -> bool {
    !word.is_empty()
        && list
            .split(|c: char| c.is_ascii_whitespace() || c == '|')
            .any(|w| w == word)
}

// ============================================================================
// PORT-COUNT CODES
// ============================================================================

/// A parsed port-count code: `lo[-hi][/lo[-hi]]`, or a trailing
/// `=[+...]` output spec meaning "outputs equal inputs plus a bias".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortCount {
    pub ninlo: u32,
    pub ninhi: u32,
    pub out: OutputCount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputCount {
    Range { noutlo: u32, nouthi: u32 },
    /// Outputs must equal inputs plus the bias.
    EqualsInputs { bias: u32 },
}

pub use OutputCount::{EqualsInputs, Range};

impl PortCount {
    /// An empty code means "no information": anything is allowed.
    pub fn unrestricted() -> Self {
        PortCount {
            ninlo: 0,
            ninhi: u32::MAX,
            out: Range {
                noutlo: 0,
                nouthi: u32::MAX,
            },
        }
    }

    pub fn parse(code: &str) -> Result<PortCount, ()> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(PortCount::unrestricted());
        }

        let (in_part, out_part) = match code.split_once('/') {
            Some((i, o)) => (i, o),
            // one side serves for both
            None => (code, code),
        };

        let (ninlo, ninhi) = parse_pair(in_part)?;
        let out = if let Some(rest) = out_part.strip_prefix('=') {
            if !rest.bytes().all(|b| b == b'+') {
                return Err(());
            }
            EqualsInputs {
                bias: rest.len() as u32,
            }
        } else {
            let (noutlo, nouthi) = parse_pair(out_part)?;
            Range { noutlo, nouthi }
        };
        Ok(PortCount { ninlo, ninhi, out })
    }

    /// Whether the given port counts satisfy this code.
    pub fn admits(&self, ninputs: u32, noutputs: u32) -> bool {
        if ninputs < self.ninlo || ninputs > self.ninhi {
            return false;
        }
        match self.out {
            Range { noutlo, nouthi } => noutputs >= noutlo && noutputs <= nouthi,
            EqualsInputs { bias } => noutputs == ninputs + bias,
        }
    }
}

/// Parse `lo`, `lo-hi`, `lo-`, `-hi`, or `-`.
fn parse_pair(s: &str) -> Result<(u32, u32), ()> {
    let s = s.trim();
    let (lo_str, rest) = match s.find('-') {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let lo = if lo_str.is_empty() {
        if rest.is_none() {
            return Err(());
        }
        0
    } else {
        lo_str.parse().map_err(|_| ())?
    };
    let hi = match rest {
        None => lo,
        Some("") => u32::MAX,
        Some(h) => h.parse().map_err(|_| ())?,
    };
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_masks() {
        assert_eq!(Driver::parse_mask("userlevel"), 0x1);
        assert_eq!(Driver::parse_mask("userlevel|linuxmodule"), 0x3);
        assert_eq!(Driver::parse_mask("userlevel bsdmodule"), 0x5);
        assert_eq!(Driver::parse_mask("nothing"), 0);
    }

    #[test]
    fn test_driver_mask_from_requirements() {
        let mut t = Traits::new("X");
        t.requirements = "linuxmodule".into();
        t.calculate_driver_mask();
        assert!(t.allows_driver(Driver::LinuxModule));
        assert!(!t.allows_driver(Driver::Userlevel));

        let mut t = Traits::new("Y");
        t.requirements = "int64 multithread".into();
        t.calculate_driver_mask();
        assert_eq!(t.driver_mask, Driver::ALL_MASK | Driver::MULTITHREAD_BIT);
    }

    #[test]
    fn test_provides_own_name() {
        let t = Traits::new("Counter");
        assert!(t.provides("Counter"));
        assert!(!t.provides("Queue"));
    }

    #[test]
    fn test_flag_values() {
        let mut t = Traits::new("X");
        t.flags = "A S3 B=7".into();
        assert_eq!(t.flag_value("A"), Some(1));
        assert_eq!(t.flag_value("S"), Some(3));
        assert_eq!(t.flag_value("B"), Some(7));
        assert_eq!(t.flag_value("Z"), None);
    }

    #[test]
    fn test_port_count_parsing() {
        let pc = PortCount::parse("1/1").unwrap();
        assert!(pc.admits(1, 1));
        assert!(!pc.admits(1, 2));

        let pc = PortCount::parse("1-/1-2").unwrap();
        assert!(pc.admits(5, 2));
        assert!(!pc.admits(0, 1));
        assert!(!pc.admits(1, 3));

        let pc = PortCount::parse("-/-").unwrap();
        assert!(pc.admits(0, 9));

        let pc = PortCount::parse("3").unwrap();
        assert!(pc.admits(3, 3));
        assert!(!pc.admits(3, 2));

        assert_eq!(PortCount::parse("").unwrap(), PortCount::unrestricted());
        assert!(PortCount::parse("x/2").is_err());
    }

    #[test]
    fn test_port_count_equals() {
        let pc = PortCount::parse("1-/=").unwrap();
        assert!(pc.admits(2, 2));
        assert!(!pc.admits(2, 3));

        let pc = PortCount::parse("1/=+").unwrap();
        assert!(pc.admits(1, 2));
        assert!(!pc.admits(1, 1));
    }
}
