//! Analysis modules.
//!
//! `stats` holds the combinable accumulators; `aggregator` builds
//! descriptive, grouped and correlation summaries on top of them.

pub mod aggregator;
pub mod stats;

pub use aggregator::*;
