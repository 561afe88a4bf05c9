// logscope - app/mod.rs
//
// Application layer: per-file sessions, the line index cache and the
// background task runner.
// Dependencies: core layer, util.
// Must NOT depend on: platform specifics or the CLI.

pub mod index_cache;
pub mod session;
pub mod task;
