//! The element map: a name-indexed traits table loaded from registry
//! files.
//!
//! Two on-disk formats are accepted: an XML `<elementmap>` document
//! and a line-oriented format driven by `$` directives. Both feed the
//! same attribute-to-field mapping; unknown attributes and columns are
//! ignored.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::base::Landmark;
use crate::confparse::{quote, split_spacevec, unquote};
use crate::errors::{ErrorSink, ErrorSinkExt};
use crate::graph::Router;

use super::{Driver, Traits};

/// Per-source metadata attached to a run of entries.
#[derive(Clone, Debug, Default)]
pub struct Globals {
    pub package: String,
    pub srcdir: String,
    pub dochref: String,
    pub driver_mask: u8,
}

struct Entry {
    traits: Traits,
    def_index: usize,
    /// Previous entry with the same class name (0 terminates).
    name_next: usize,
}

/// The traits table. Entry 0 is the null entry; `name_map` points at
/// the most recent entry for each class name, with older same-name
/// entries reachable through `name_next` (driver-specific shadowing).
pub struct ElementMap {
    entries: Vec<Entry>,
    defs: Vec<Globals>,
    name_map: FxHashMap<SmolStr, usize>,
    driver_mask: u8,
}

impl Default for ElementMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementMap {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                traits: Traits::default(),
                def_index: 0,
                name_next: 0,
            }],
            defs: vec![Globals::default()],
            name_map: FxHashMap::default(),
            driver_mask: Driver::ALL_MASK,
        }
    }

    /// Restrict lookups to classes compatible with `driver`.
    pub fn set_driver(&mut self, driver: Driver) {
        self.driver_mask = driver.mask();
    }

    pub fn driver_mask(&self) -> u8 {
        self.driver_mask
    }

    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// Add one traits entry, shadowing earlier entries of the same
    /// name.
    pub fn add(&mut self, mut traits: Traits) -> usize {
        if !traits.requirements.is_empty() {
            traits.calculate_driver_mask();
        } else if traits.driver_mask == 0 {
            traits.driver_mask = Driver::ALL_MASK;
        }
        self.add_with_def(traits, 0)
    }

    fn add_with_def(&mut self, traits: Traits, def_index: usize) -> usize {
        let i = self.entries.len();
        let name = traits.name.clone();
        let name_next = if name.is_empty() {
            0
        } else {
            self.name_map.get(&name).copied().unwrap_or(0)
        };
        self.entries.push(Entry {
            traits,
            def_index,
            name_next,
        });
        if !name.is_empty() {
            self.name_map.insert(name, i);
        }
        i
    }

    /// The traits entry for `class_name` under the current driver, or
    /// `None` if unknown.
    pub fn traits(&self, class_name: &str) -> Option<&Traits> {
        let mut i = self.name_map.get(class_name).copied().unwrap_or(0);
        while i > 0 && self.entries[i].traits.driver_mask & self.driver_mask == 0 {
            i = self.entries[i].name_next;
        }
        if i > 0 { Some(&self.entries[i].traits) } else { None }
    }

    pub fn globals(&self, class_name: &str) -> Option<&Globals> {
        let i = self.name_map.get(class_name).copied()?;
        Some(&self.defs[self.entries[i].def_index])
    }

    pub fn has_type(&self, class_name: &str) -> bool {
        self.traits(class_name).is_some()
    }

    /// Whether some entry (or a map-level `provides`) provides the
    /// named feature.
    pub fn provides(&self, what: &str) -> bool {
        self.entries.iter().any(|e| e.traits.provides(what))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Traits> {
        self.entries.iter().skip(1).map(|e| &e.traits)
    }

    // ========================================================================
    // PARSING
    // ========================================================================

    /// Parse a registry file in either format, distinguished by the
    /// leading `<`.
    pub fn parse(&mut self, text: &str, package: &str, errh: &mut dyn ErrorSink) {
        if text.trim_start().starts_with('<') {
            self.parse_xml(text, package, errh);
        } else {
            self.parse_lines(text, package);
        }
    }

    fn parse_xml(&mut self, text: &str, package: &str, errh: &mut dyn ErrorSink) {
        let mut entities: HashMap<String, String> = HashMap::new();
        let mut reader = Reader::from_str(text);
        let mut def_index = 0usize;
        let mut in_elementmap = false;
        let lm = Landmark::unknown();

        loop {
            match reader.read_event() {
                Ok(Event::DocType(t)) => {
                    let dtd = String::from_utf8_lossy(t.as_ref()).to_string();
                    parse_dtd_entities(&dtd, &mut entities);
                }
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let tag = e.name();
                    match tag.as_ref() {
                        b"elementmap" => {
                            if in_elementmap {
                                errh.error(&lm, "nested <elementmap> tags");
                            }
                            in_elementmap = true;
                            let mut g = Globals {
                                package: package.to_string(),
                                driver_mask: Driver::ALL_MASK,
                                ..Globals::default()
                            };
                            for attr in e.attributes().flatten() {
                                let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                                let value = resolve_attr_value(&attr.value, &entities);
                                match key.as_str() {
                                    "package" => g.package = value,
                                    "sourcedir" => g.srcdir = value,
                                    "src" => {
                                        if let Some(dir) = value.strip_prefix("file://") {
                                            g.srcdir = dir.to_string();
                                        }
                                    }
                                    "dochref" => g.dochref = value,
                                    "webdoc" => {
                                        if g.dochref.is_empty() {
                                            g.dochref = value;
                                        }
                                    }
                                    "provides" => {
                                        let p = &mut self.entries[0].traits.provisions;
                                        p.push(' ');
                                        p.push_str(&value);
                                    }
                                    "drivers" => g.driver_mask = Driver::parse_mask(&value),
                                    _ => {}
                                }
                            }
                            self.defs.push(g);
                            def_index = self.defs.len() - 1;
                        }
                        b"entry" if in_elementmap => {
                            let mut traits = Traits::default();
                            traits.driver_mask = Driver::ALL_MASK;
                            for attr in e.attributes().flatten() {
                                let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                                let value = resolve_attr_value(&attr.value, &entities);
                                if let Some(field) = traits.component_mut(&key) {
                                    field.set(&value);
                                }
                            }
                            if !traits.name.is_empty() || !traits.provisions.is_empty() {
                                if !traits.requirements.is_empty() {
                                    traits.calculate_driver_mask();
                                }
                                self.add_with_def(traits, def_index);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"elementmap" {
                        in_elementmap = false;
                    }
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    errh.error(&lm, format!("elementmap XML parse error: {err}"));
                    break;
                }
                _ => {}
            }
        }
    }

    fn parse_lines(&mut self, text: &str, package: &str) {
        let default_columns = [
            "name",
            "cxxclass",
            "headerfile",
            "portcount",
            "processing",
            "flowcode",
            "flags",
            "methods",
            "requires",
            "provides",
            "libs",
        ];
        let mut columns: Vec<String> =
            default_columns.iter().map(|s| s.to_string()).collect();

        let mut def_index = 0usize;
        if !package.is_empty() {
            self.defs.push(Globals {
                package: package.to_string(),
                driver_mask: Driver::ALL_MASK,
                ..Globals::default()
            });
            def_index = self.defs.len() - 1;
        }

        for line in text.lines() {
            let words = split_spacevec(line);
            if words.is_empty() || words[0].starts_with('#') {
                continue;
            }
            match words[0].as_str() {
                "$sourcedir" => {
                    if words.len() == 2 {
                        let mut g = self.defs[def_index].clone();
                        g.srcdir = String::from_utf8_lossy(&unquote(&words[1])).to_string();
                        self.defs.push(g);
                        def_index = self.defs.len() - 1;
                    }
                }
                "$webdoc" => {
                    if words.len() == 2 {
                        let mut g = self.defs[def_index].clone();
                        g.dochref = String::from_utf8_lossy(&unquote(&words[1])).to_string();
                        self.defs.push(g);
                        def_index = self.defs.len() - 1;
                    }
                }
                "$provides" => {
                    for w in &words[1..] {
                        let p = &mut self.entries[0].traits.provisions;
                        p.push(' ');
                        p.push_str(&String::from_utf8_lossy(&unquote(w)));
                    }
                }
                "$data" => {
                    columns = words[1..]
                        .iter()
                        .map(|w| String::from_utf8_lossy(&unquote(w)).to_string())
                        .collect();
                }
                w if w.starts_with('$') => {}
                _ => {
                    let mut traits = Traits::default();
                    traits.driver_mask = Driver::ALL_MASK;
                    for (col, word) in columns.iter().zip(words.iter()) {
                        let value = String::from_utf8_lossy(&unquote(word)).to_string();
                        if let Some(field) = traits.component_mut(col) {
                            field.set(&value);
                        }
                    }
                    if !traits.name.is_empty() || !traits.provisions.is_empty() {
                        if !traits.requirements.is_empty() {
                            traits.calculate_driver_mask();
                        }
                        self.add_with_def(traits, def_index);
                    }
                }
            }
        }
    }

    // ========================================================================
    // UNPARSING
    // ========================================================================

    pub fn unparse_xml(&self, package: &str) -> String {
        let mut out = String::from("<?xml version=\"1.0\" standalone=\"yes\"?>\n");
        out.push_str("<elementmap");
        if !package.is_empty() {
            out.push_str(&format!(" package=\"{}\"", xml_escape(package)));
        }
        out.push_str(">\n");
        for t in self.iter() {
            if t.name.is_empty() && t.cxx.is_empty() {
                continue;
            }
            out.push_str("  <entry");
            let mut attr = |key: &str, value: &str| {
                if !value.is_empty() {
                    out.push_str(&format!(" {key}=\"{}\"", xml_escape(value)));
                }
            };
            attr("name", &t.name);
            attr("cxxclass", &t.cxx);
            attr("docname", &t.documentation_name);
            attr("headerfile", &t.header_file);
            attr("sourcefile", &t.source_file);
            attr("portcount", &t.port_count_code);
            attr("processing", &t.processing_code);
            attr("flowcode", &t.flow_code);
            attr("flags", &t.flags);
            attr("requires", &t.requirements);
            attr("provides", &t.provisions);
            attr("noexport", &t.noexport);
            out.push_str(" />\n");
        }
        out.push_str("</elementmap>\n");
        out
    }

    pub fn unparse_lines(&self) -> String {
        let mut out = String::from(
            "$data\tname\tcxxclass\theaderfile\tportcount\tprocessing\tflowcode\tflags\trequires\tprovides\n",
        );
        for t in self.iter() {
            if t.name.is_empty() && t.cxx.is_empty() {
                continue;
            }
            let fields = [
                t.name.as_str(),
                t.cxx.as_str(),
                &t.header_file,
                &t.port_count_code,
                &t.processing_code,
                &t.flow_code,
                &t.flags,
                &t.requirements,
                &t.provisions,
            ];
            let quoted: Vec<String> = fields
                .iter()
                .map(|f| {
                    if f.is_empty() {
                        "\"\"".to_string()
                    } else {
                        quote(f.as_bytes())
                    }
                })
                .collect();
            out.push_str(&quoted.join("\t"));
            out.push('\n');
        }
        out
    }

    // ========================================================================
    // ROUTER CHECKS
    // ========================================================================

    /// Report an error for every primitive class used by `router` that
    /// the map does not know.
    pub fn check_completeness(&self, router: &Router, errh: &mut dyn ErrorSink) -> bool {
        let before = errh.nerrors();
        for class in router.collect_types() {
            let resolved = class.resolve_synonyms();
            if resolved.is_primitive() && !self.has_type(resolved.name()) {
                errh.error(
                    &router.landmark,
                    format!("unknown element class '{}'", resolved.printable_name()),
                );
            }
        }
        errh.nerrors() == before
    }

    /// Whether every primitive class of `router` supports `driver`.
    pub fn driver_compatible(&self, router: &Router, driver: Driver) -> bool {
        router.collect_types().iter().all(|class| {
            let resolved = class.resolve_synonyms();
            if !resolved.is_primitive() {
                return true;
            }
            match self.traits(resolved.name()) {
                Some(t) => t.allows_driver(driver),
                None => true,
            }
        })
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Resolve an attribute value: XML entity references including any
/// user-defined entities from the document's DTD.
fn resolve_attr_value(raw: &[u8], entities: &HashMap<String, String>) -> String {
    let raw = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape_with(&raw, |name| {
        entities.get(name).map(String::as_str)
    }) {
        Ok(v) => v.into_owned(),
        Err(_) => raw.into_owned(),
    }
}

/// Extract `<!ENTITY name "value">` declarations from DTD text.
fn parse_dtd_entities(dtd: &str, entities: &mut HashMap<String, String>) {
    let mut rest = dtd;
    while let Some(pos) = rest.find("<!ENTITY") {
        rest = &rest[pos + "<!ENTITY".len()..];
        let mut words = rest.trim_start();
        if words.starts_with('%') {
            continue; // parameter entities are DTD-internal
        }
        let name_end = words
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(words.len());
        let name = &words[..name_end];
        words = words[name_end..].trim_start();
        let quote_char = match words.chars().next() {
            Some(c @ ('"' | '\'')) => c,
            _ => continue,
        };
        let value_body = &words[1..];
        let Some(end) = value_body.find(quote_char) else {
            continue;
        };
        entities.insert(name.to_string(), value_body[..end].to_string());
        rest = &value_body[end..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BufferSink;

    const XML_MAP: &str = r#"<?xml version="1.0"?>
<!DOCTYPE elementmap [
<!ENTITY co "Counter">
]>
<elementmap package="base" drivers="userlevel|linuxmodule">
  <entry name="&co;" cxxclass="Counter" portcount="1/1" processing="a/a" flowcode="x/x" />
  <entry name="Queue" portcount="1/1" processing="h/l" requires="userlevel" />
  <entry name="Discard" portcount="1/0" processing="a/" />
</elementmap>
"#;

    #[test]
    fn test_parse_xml() {
        let mut map = ElementMap::new();
        let mut errh = BufferSink::new();
        map.parse(XML_MAP, "", &mut errh);
        assert_eq!(errh.nerrors(), 0, "{}", errh.take_text());
        assert_eq!(map.len(), 3);

        let counter = map.traits("Counter").expect("entity-expanded name");
        assert_eq!(counter.processing_code, "a/a");
        let queue = map.traits("Queue").unwrap();
        assert_eq!(queue.driver_mask, Driver::Userlevel.mask());
        assert_eq!(map.globals("Counter").unwrap().package, "base");
    }

    #[test]
    fn test_parse_lines_with_data_directive() {
        let text = "\
$provides base\n\
$data name portcount processing\n\
Counter 1/1 a/a\n\
Queue 1/1 h/l\n";
        let mut map = ElementMap::new();
        map.parse_lines(text, "pkg");
        assert_eq!(map.len(), 2);
        assert_eq!(map.traits("Queue").unwrap().processing_code, "h/l");
        assert!(map.provides("base"));
    }

    #[test]
    fn test_driver_shadowing() {
        let mut map = ElementMap::new();
        let mut a = Traits::new("ToDevice");
        a.processing_code = "l/".into();
        a.requirements = "userlevel".into();
        map.add(a);
        let mut b = Traits::new("ToDevice");
        b.processing_code = "h/".into();
        b.requirements = "linuxmodule".into();
        map.add(b);

        map.set_driver(Driver::Userlevel);
        assert_eq!(map.traits("ToDevice").unwrap().processing_code, "l/");
        map.set_driver(Driver::LinuxModule);
        assert_eq!(map.traits("ToDevice").unwrap().processing_code, "h/");
    }

    #[test]
    fn test_unparse_xml_roundtrip() {
        let mut map = ElementMap::new();
        let mut t = Traits::new("Counter");
        t.port_count_code = "1/1".into();
        t.processing_code = "a/a".into();
        map.add(t);

        let xml = map.unparse_xml("p");
        let mut map2 = ElementMap::new();
        let mut errh = BufferSink::new();
        map2.parse(&xml, "", &mut errh);
        assert_eq!(errh.nerrors(), 0);
        assert_eq!(map2.traits("Counter").unwrap().port_count_code, "1/1");
    }
}
