pub mod runner;

pub use runner::{RunArtifacts, RunOutcome, RunPolicy, Runner};
