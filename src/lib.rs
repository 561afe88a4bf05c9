// logscope - lib.rs
//
// Library entry point, exposing the engine, the session host and the
// platform layer for the CLI and for integration testing.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
