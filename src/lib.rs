//! Descriptive statistics, grouped summaries and correlations for
//! traffic-sensor datasets.
//!
//! The [`analysis`] functions operate on an in-memory [`models::Dataset`]
//! and never perform I/O; [`loader`] and [`report`] sit on either side.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod report;
