// SerialScribe - core/mod.rs
//
// Core business logic layer.
// Dependencies: standard library (plus serde derives and tracing).
// Must NOT depend on: app, platform, or any device/filesystem I/O.

pub mod health;
pub mod model;
pub mod reassembler;
