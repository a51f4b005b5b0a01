// SerialScribe - lib.rs
//
// Library entry point, exposing the capture core for the CLI binary and for
// integration testing. Any front-end (CLI, GUI, analysis tooling) drives a
// session through `app::capture::CaptureManager` and renders its events.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
