// SerialScribe - platform/mod.rs
//
// Platform abstraction layer: config files, filesystem, serial devices.
// Dependencies: standard library, directories, serialport, util.
// Must NOT depend on: core, app.

pub mod config;
pub mod fs;
pub mod serial;
