//! HTTP surface for the avcnv conversion engine.

pub mod api;
pub mod metrics;
pub mod state;
