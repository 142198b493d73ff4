//! CLI-facing orchestration layered over `constellation-sim`: input loading,
//! failure-mask scheduling, output emission, strategy construction, and the
//! `(strategy, repetition)` worker pool. Mirrors how `candidate-selector`
//! keeps its library logic in `lib.rs`/submodules behind a thin `main.rs`.

use thiserror::Error;

pub mod failures;
pub mod input;
pub mod job;
pub mod output;
pub mod strategies;

pub use job::{run_job, Job, JobOutcome, RunOptions};

pub const NUM_SATELLITES: usize = 636;
pub const NUM_GROUNDSTATIONS: usize = 146;
pub const TIME_STEPS_PER_FILE: u64 = 1000;

pub const START_TIME: &str = "2023-09-28 08:26:00";
pub const FAILURE_TIME: &str = "2023-09-30 08:26:00";
pub const RESET_TIME: &str = "2023-10-02 08:26:00";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    Time(#[from] constellation_time::TimeError),
    #[error(transparent)]
    Sim(#[from] constellation_sim::SimError),
    #[error("input file {path} has {got} satellites, expected {expected}")]
    InputShape { path: String, expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, RunnerError>;
