//! Test doubles for collaborators and storage.
//!
//! These are compiled into the library so downstream crates can drive the
//! engine in their own tests without real services.

mod mocks;

pub use mocks::{FlakyService, MemorySink, ScriptedService, StaticService};
