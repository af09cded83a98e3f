//! Facet mines issue trackers for evidence about software-quality
//! attributes: for each (project, attribute) pair it locates candidate
//! issues, asks a language model for the most relevant excerpt plus a
//! sentiment score, and merges the validated verdicts into a durable
//! per-pair record.

pub mod config;
pub mod engine;
pub mod errors;
pub mod locator;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod storage;
pub mod tokens;
pub mod validate;
pub mod window;
