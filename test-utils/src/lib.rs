//! Shared test utilities for platform SDK crates.
//!
//! This crate provides:
//! - Proptest generators for paths, extensions and file contents
//! - Callback recorders and an async polling helper
//! - Test fixtures: generated PEM material and scratch directories

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recorder;

pub use fixtures::{PemPair, ScratchDir};
pub use recorder::{Recorder, eventually};
