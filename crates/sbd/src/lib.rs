#![forbid(unsafe_code)]
//! Simple block device public API facade.
//!
//! Re-exports the device core from `sbd-core` through a stable external
//! interface. Host glue (the CLI, embedders) depends on this crate.

pub use sbd_core::*;
