// logscope - platform/mod.rs
//
// Platform abstraction layer.
// Dependencies: standard library, directories crate, core::model option types.
// Must NOT depend on: app.

pub mod config;
