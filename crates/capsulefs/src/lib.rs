#![forbid(unsafe_code)]
//! CapsuleFS public API facade.
//!
//! Re-exports the storage engine from `cfs-core` through a stable external
//! interface. This is the crate that downstream consumers (CLI, embedders)
//! depend on.

pub use cfs_core::*;
