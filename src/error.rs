// POWERCAP ERROR TYPES
// CONFIGURATION ERRORS ARE FATAL AT STARTUP. ENGINE ERRORS COME FROM THE
// ACTUATION GUARD: A STRATEGY ASKED FOR A KNOB VALUE THE MACHINE DOESN'T HAVE.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("heuristic mode {0} is invalid")]
    UnknownHeuristic(i64),

    #[error("detection mode {0} is invalid")]
    UnknownDetection(i64),

    #[error("missing config key {0}")]
    MissingKey(&'static str),

    #[error("config key {key} has malformed value {value:?}")]
    Malformed { key: &'static str, value: String },

    #[error("starting threads {starting} higher than total threads {total}")]
    StartingThreads { starting: usize, total: usize },

    #[error("total threads must be at least 1")]
    NoThreads,

    #[error("power limit must be positive, got {0}")]
    PowerLimit(f64),

    #[error("{key} is not a percentage: {value}")]
    Percentage { key: &'static str, value: f64 },

    #[error("static p-state {pstate} outside the table (max {max})")]
    StaticPstate { pstate: usize, max: usize },

    #[error("model heuristic needs at least 2 p-states, table has max index {0}")]
    ModelUnsupported(usize),

    #[error("model validation requires the model heuristic with at least 4 p-states")]
    ValidationUnsupported,

    #[error("frequency table is empty")]
    EmptyFrequencies,

    #[error("bad frequency token {0:?}")]
    BadFrequency(String),

    #[error("frequencies must be strictly decreasing: {prev} then {next} kHz")]
    NonMonotonic { prev: u32, next: u32 },

    #[error("frequency range {min_khz}..{max_khz} kHz is invalid")]
    BadRange { min_khz: u32, max_khz: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("setting threads/cores to {requested} which is invalid for this system (total {total})")]
    ThreadsOutOfRange { requested: i64, total: usize },

    #[error("p-state {requested} outside [0, {max}]")]
    PstateOutOfRange { requested: i64, max: usize },
}
