// POWERCAP v1.0.0 -- RUNTIME POWER-CAP CONTROLLER
// PICKS A (THREAD COUNT, P-STATE) PAIR THAT MAXIMIZES THROUGHPUT UNDER A
// PACKAGE POWER LIMIT, ONE MEASUREMENT ROUND AT A TIME
//
// LIBRARY: DECISION ENGINE (PURE, NO I/O) PLUS THE HOST COLLABORATORS
// (CPUFREQ, RAPL, WORKER GATING, ROUND COLLECTION, RESULTS)

#[macro_use]
pub mod log;

pub mod config;
pub mod cpufreq;
pub mod detection;
pub mod energy;
pub mod engine;
pub mod error;
pub mod event;
pub mod freq;
pub mod governor;
pub mod heuristics;
pub mod model;
pub mod round;
pub mod search;
pub mod stats;
pub mod workers;

pub use config::{DetectionMode, EngineConfig, HeuristicMode, PowercapConfig};
pub use engine::{Decision, Engine, EngineEvent};
pub use error::{ConfigError, EngineError};
pub use freq::FrequencyTable;
pub use search::{Configuration, Sample, SearchContext};
