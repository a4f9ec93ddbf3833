//! The element-type traits table.
//!
//! Per-class metadata (port-count, processing, and flow codes, driver
//! requirements, provisions) lives in an [`ElementMap`], loaded from a
//! registry file in either the XML `<elementmap>` format or the
//! line-oriented `$data` format, and augmented from the built-in
//! runtime registry.

mod clickpath;
mod elementmap;
mod traits;

pub use clickpath::{clickpath, find_file};
pub use elementmap::{ElementMap, Globals};
pub use traits::{Driver, OutputCount, PortCount, Traits};
