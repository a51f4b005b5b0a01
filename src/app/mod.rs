// SerialScribe - app/mod.rs
//
// Application layer: capture session orchestration, log storage, monitoring.
// Dependencies: core, platform, util.

pub mod capture;
pub mod log_store;
mod monitor;
