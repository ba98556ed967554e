//! Mock Backend Implementation
//!
//! A deterministic in-process backend for tests and the `demo` command.
//! It counts every call and supports per-stage failure and delay injection
//! for exercising error paths and concurrency.
//!
//! # Stages
//!
//! - `lower`: produce IR from the unit and its arguments
//! - `build`: generate an executable
//! - `aot`: serialize an executable
//! - `load`: reload an executable from its serialized form

mod backend;
mod failure;

pub use backend::{MockBackend, MockCounters, MockExecutable};
pub use failure::{BackendStage, FailureConfig, FailureInjector};
