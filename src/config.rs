// POWERCAP CONFIGURATION
// TWO LAYERS: THE powercap_config.txt FILE SURFACE (KEY=VALUE PAIRS, LEGACY
// KEY NAMES AND MODE CODES) AND THE VALIDATED EngineConfig THE ENGINE RUNS ON.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::freq::FrequencyTable;

// HEURISTIC MODE CODES (HEURISTIC_MODE=)
pub const MODE_FIXED: i64 = 8;
pub const MODE_DYNAMIC: i64 = 9;
pub const MODE_HIGHEST_THREADS: i64 = 11;
pub const MODE_BINARY_SEARCH: i64 = 12;
pub const MODE_TWO_STEP: i64 = 13;
pub const MODE_TWO_STEP_STATEFUL: i64 = 14;
pub const MODE_MODEL: i64 = 15;

// DETECTION MODE CODES (DETECTION_MODE=)
pub const DETECTION_DISABLED: i64 = 0;
pub const DETECTION_RESTART: i64 = 2;
pub const DETECTION_VALIDATE: i64 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeuristicMode {
    Fixed,
    Dynamic,
    HighestThreads,
    BinarySearch,
    TwoStep,
    TwoStepStateful,
    Model,
}

impl HeuristicMode {
    pub fn from_code(code: i64) -> Result<Self, ConfigError> {
        match code {
            MODE_FIXED => Ok(Self::Fixed),
            MODE_DYNAMIC => Ok(Self::Dynamic),
            MODE_HIGHEST_THREADS => Ok(Self::HighestThreads),
            MODE_BINARY_SEARCH => Ok(Self::BinarySearch),
            MODE_TWO_STEP => Ok(Self::TwoStep),
            MODE_TWO_STEP_STATEFUL => Ok(Self::TwoStepStateful),
            MODE_MODEL => Ok(Self::Model),
            other => Err(ConfigError::UnknownHeuristic(other)),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Fixed => MODE_FIXED,
            Self::Dynamic => MODE_DYNAMIC,
            Self::HighestThreads => MODE_HIGHEST_THREADS,
            Self::BinarySearch => MODE_BINARY_SEARCH,
            Self::TwoStep => MODE_TWO_STEP,
            Self::TwoStepStateful => MODE_TWO_STEP_STATEFUL,
            Self::Model => MODE_MODEL,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::Dynamic => "DYNAMIC",
            Self::HighestThreads => "HIGHEST-THREADS",
            Self::BinarySearch => "BINARY-SEARCH",
            Self::TwoStep => "TWO-STEP",
            Self::TwoStepStateful => "TWO-STEP-STATEFUL",
            Self::Model => "MODEL",
        }
    }

    // STRATEGIES THAT ALWAYS EXPLORE FROM (1 THREAD, SLOWEST P-STATE)
    pub fn starts_from_floor(self) -> bool {
        matches!(self, Self::BinarySearch | Self::TwoStep | Self::Model)
    }
}

impl std::str::FromStr for HeuristicMode {
    type Err = ConfigError;

    // ACCEPTS EITHER THE NUMERIC CODE OR THE LABEL (CASE-INSENSITIVE)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i64>() {
            return Self::from_code(code);
        }
        let wanted = s.to_ascii_uppercase().replace('_', "-");
        [
            Self::Fixed,
            Self::Dynamic,
            Self::HighestThreads,
            Self::BinarySearch,
            Self::TwoStep,
            Self::TwoStepStateful,
            Self::Model,
        ]
        .into_iter()
        .find(|m| m.label() == wanted)
        .ok_or(ConfigError::UnknownHeuristic(-1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionMode {
    Disabled,
    Restart,
    Validate,
}

impl DetectionMode {
    pub fn from_code(code: i64) -> Result<Self, ConfigError> {
        match code {
            DETECTION_DISABLED => Ok(Self::Disabled),
            DETECTION_RESTART => Ok(Self::Restart),
            DETECTION_VALIDATE => Ok(Self::Validate),
            other => Err(ConfigError::UnknownDetection(other)),
        }
    }
}

// EVERYTHING THE DECISION ENGINE NEEDS AT CONSTRUCTION
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub power_limit: f64,
    pub total_threads: usize,
    pub frequencies: FrequencyTable,
    pub heuristic: HeuristicMode,
    pub detection: DetectionMode,
    pub exploit_steps: u32,
    pub starting_threads: usize,
    pub static_pstate: usize,
    pub power_uncore: f64,
}

impl EngineConfig {
    pub fn new(
        power_limit: f64,
        total_threads: usize,
        frequencies: FrequencyTable,
        heuristic: HeuristicMode,
    ) -> Self {
        let max_pstate = frequencies.max_pstate();
        Self {
            power_limit,
            total_threads,
            frequencies,
            heuristic,
            detection: DetectionMode::Disabled,
            exploit_steps: 0,
            starting_threads: 1,
            static_pstate: max_pstate,
            power_uncore: 0.0,
        }
    }

    pub fn max_pstate(&self) -> usize {
        self.frequencies.max_pstate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if !(self.power_limit > 0.0) {
            return Err(ConfigError::PowerLimit(self.power_limit));
        }
        if self.starting_threads == 0 || self.starting_threads > self.total_threads {
            return Err(ConfigError::StartingThreads {
                starting: self.starting_threads,
                total: self.total_threads,
            });
        }
        if self.heuristic == HeuristicMode::Fixed && self.static_pstate > self.max_pstate() {
            return Err(ConfigError::StaticPstate {
                pstate: self.static_pstate,
                max: self.max_pstate(),
            });
        }
        // THE MODEL SWEEP MEASURES P-STATE 1 AS ITS HIGH-FREQUENCY BOUNDARY
        if self.heuristic == HeuristicMode::Model && self.max_pstate() < 1 {
            return Err(ConfigError::ModelUnsupported(self.max_pstate()));
        }
        // VALIDATION WALKS P-STATES max-1 DOWN TO 2: NEEDS AT LEAST ONE INTERMEDIATE ROW
        if self.detection == DetectionMode::Validate
            && (self.heuristic != HeuristicMode::Model || self.max_pstate() < 3)
        {
            return Err(ConfigError::ValidationUnsupported);
        }
        Ok(())
    }
}

// --- FILE SURFACE ---

const KEYS: [&str; 15] = [
    "STARTING_THREADS",
    "STATIC_PSTATE",
    "POWER_LIMIT",
    "COMMITS_ROUND",
    "HEURISTIC_MODE",
    "DETECTION_MODE",
    "EXPLOIT_STEPS",
    "POWER_UNCORE",
    "MIN_CPU_FREQ",
    "MAX_CPU_FREQ",
    "BOOST_DISABLED",
    "CORE_PACKING",
    "EXTRA_RANGE_PERCENTAGE",
    "WINDOW_SIZE",
    "HYSTERESIS",
];

// MIRRORS powercap_config.txt ONE FIELD PER KEY
#[derive(Clone, Debug, PartialEq)]
pub struct PowercapConfig {
    pub starting_threads: usize,
    pub static_pstate: i64,
    pub power_limit: f64,
    pub commits_round: u64,
    pub heuristic: HeuristicMode,
    pub detection: DetectionMode,
    pub exploit_steps: u32,
    pub power_uncore: f64,
    pub min_cpu_freq: u32,
    pub max_cpu_freq: u32,
    pub boost_disabled: bool,
    pub core_packing: bool,
    pub extra_range_percentage: f64,
    pub window_size: u32,
    pub hysteresis: f64,
}

impl PowercapConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut pairs: HashMap<String, String> = HashMap::new();
        for cap in key_value_re().captures_iter(text) {
            let key = cap[1].to_string();
            if !KEYS.contains(&key.as_str()) {
                crate::log_warn!("IGNORING UNKNOWN CONFIG KEY {}", key);
                continue;
            }
            pairs.insert(key, cap[2].to_string());
        }

        let cfg = Self {
            starting_threads: field(&pairs, "STARTING_THREADS")?,
            static_pstate: field(&pairs, "STATIC_PSTATE")?,
            power_limit: field(&pairs, "POWER_LIMIT")?,
            commits_round: field(&pairs, "COMMITS_ROUND")?,
            heuristic: HeuristicMode::from_code(field(&pairs, "HEURISTIC_MODE")?)?,
            detection: DetectionMode::from_code(field(&pairs, "DETECTION_MODE")?)?,
            exploit_steps: field(&pairs, "EXPLOIT_STEPS")?,
            power_uncore: field(&pairs, "POWER_UNCORE")?,
            min_cpu_freq: field(&pairs, "MIN_CPU_FREQ")?,
            max_cpu_freq: field(&pairs, "MAX_CPU_FREQ")?,
            boost_disabled: flag(&pairs, "BOOST_DISABLED")?,
            core_packing: flag(&pairs, "CORE_PACKING")?,
            extra_range_percentage: field(&pairs, "EXTRA_RANGE_PERCENTAGE")?,
            window_size: field(&pairs, "WINDOW_SIZE")?,
            hysteresis: field(&pairs, "HYSTERESIS")?,
        };

        if !(0.0..=100.0).contains(&cfg.extra_range_percentage) {
            return Err(ConfigError::Percentage {
                key: "EXTRA_RANGE_PERCENTAGE",
                value: cfg.extra_range_percentage,
            });
        }
        if !(0.0..=100.0).contains(&cfg.hysteresis) {
            return Err(ConfigError::Percentage { key: "HYSTERESIS", value: cfg.hysteresis });
        }
        if cfg.commits_round == 0 {
            return Err(ConfigError::Malformed { key: "COMMITS_ROUND", value: "0".into() });
        }
        Ok(cfg)
    }

    // RESOLVE AGAINST THE MACHINE: THREAD COUNT AND DISCOVERED FREQUENCY TABLE.
    // FLOOR-START STRATEGIES ALWAYS BEGIN FROM ONE THREAD.
    // AN OUT-OF-RANGE STATIC_PSTATE FALLS BACK TO THE SLOWEST P-STATE.
    pub fn engine_config(
        &self,
        total_threads: usize,
        frequencies: FrequencyTable,
    ) -> Result<EngineConfig, ConfigError> {
        let max_pstate = frequencies.max_pstate();
        let static_pstate = if self.static_pstate >= 0 && self.static_pstate as usize <= max_pstate {
            self.static_pstate as usize
        } else {
            if self.heuristic == HeuristicMode::Fixed {
                crate::log_warn!(
                    "STATIC_PSTATE {} OUTSIDE THE VALID RANGE, USING SLOWEST P-STATE {}",
                    self.static_pstate, max_pstate
                );
            }
            max_pstate
        };
        let starting_threads = if self.heuristic.starts_from_floor() { 1 } else { self.starting_threads };

        let cfg = EngineConfig {
            power_limit: self.power_limit,
            total_threads,
            frequencies,
            heuristic: self.heuristic,
            detection: self.detection,
            exploit_steps: self.exploit_steps,
            starting_threads,
            static_pstate,
            power_uncore: self.power_uncore,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z_]+)\s*=\s*(\S+)").expect("static regex"))
}

fn field<T: std::str::FromStr>(pairs: &HashMap<String, String>, key: &'static str) -> Result<T, ConfigError> {
    let raw = pairs.get(key).ok_or(ConfigError::MissingKey(key))?;
    raw.parse().map_err(|_| ConfigError::Malformed { key, value: raw.clone() })
}

fn flag(pairs: &HashMap<String, String>, key: &'static str) -> Result<bool, ConfigError> {
    match field::<i64>(pairs, key)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ConfigError::Malformed { key, value: other.to_string() }),
    }
}
