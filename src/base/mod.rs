//! Foundation types shared by every layer: source landmarks and the
//! incremental line tracking behind them.

mod landmark;

pub use landmark::{Landmark, LandmarkBuilder};
