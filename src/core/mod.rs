// logscope - core/mod.rs
//
// File-access engine: scanning, indexing, buffer loading, search,
// histograms and format detection.
// Must NOT depend on: app, platform, or the CLI.

pub mod buffer;
pub mod checkpoint;
pub mod date;
pub mod detect;
pub mod histogram;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod parser;
pub mod scanner;
pub mod search;
