//! Element declarations within a router graph.

use smol_str::SmolStr;

use crate::base::Landmark;

use super::ElementClass;

/// A declared element instance. Port counts are maintained by the
/// owning router as connections are added.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: SmolStr,
    pub class: ElementClass,
    /// Configuration string, pre-variable-expansion.
    pub config: String,
    pub landmark: Landmark,
    /// Tunnels are the `input` / `output` pseudoelements of a
    /// compound body; they have no runtime instance.
    pub tunnel: bool,
    /// Dead elements are skipped by validation and instantiation.
    pub dead: bool,
    pub(super) ninputs: u32,
    pub(super) noutputs: u32,
}

impl Element {
    pub(super) fn new(
        name: SmolStr,
        class: ElementClass,
        config: String,
        landmark: Landmark,
    ) -> Self {
        let tunnel = class.is_tunnel();
        Self {
            name,
            class,
            config,
            landmark,
            tunnel,
            dead: false,
            ninputs: 0,
            noutputs: 0,
        }
    }

    pub fn ninputs(&self) -> u32 {
        self.ninputs
    }

    pub fn noutputs(&self) -> u32 {
        self.noutputs
    }

    /// True for parser-synthesized names that have not yet been
    /// finalized (leading `;`).
    pub fn is_anonymous(&self) -> bool {
        self.name.starts_with(';')
    }
}
