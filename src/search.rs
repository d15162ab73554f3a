// POWERCAP SEARCH CONTEXT
// SHARED STATE OF ONE EXPLORATION: CURRENT CONFIGURATION, BEST CONFIGURATION
// UNDER THE CAP, LEVEL-BEST OF THE CURRENT INNER ITERATION, STEP COUNTERS.
// PURE DATA PLUS THE PRIMITIVES EVERY STRATEGY SHARES. NO I/O.
//
// EVERY KNOB CHANGE GOES THROUGH set_threads/set_pstate AND FRIENDS, WHICH
// REFUSE VALUES OUTSIDE [1, total_threads] x [0, max_pstate]. A STRATEGY
// CAN NEVER LEAVE AN OUT-OF-RANGE CONFIGURATION OBSERVABLE.

use crate::config::EngineConfig;
use crate::error::EngineError;

// THROUGHPUT DEGRADATION TOLERATED BEFORE A THREAD SWEEP TURNS AROUND
pub const DEGRADATION_FACTOR: f64 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Configuration {
    pub threads: usize,
    pub pstate: usize,
}

impl Configuration {
    pub fn new(threads: usize, pstate: usize) -> Self {
        Self { threads, pstate }
    }
}

// ONE MEASUREMENT ROUND, DELIVERED IN CHRONOLOGICAL ORDER
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub throughput: f64,
    pub power: f64,
    pub elapsed_ns: u64,
}

impl Sample {
    pub fn new(throughput: f64, power: f64, elapsed_ns: u64) -> Self {
        Self { throughput, power, elapsed_ns }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BestConfig {
    pub throughput: f64,
    pub threads: usize,
    pub pstate: usize,
    pub power: f64,
}

impl BestConfig {
    pub fn config(&self) -> Configuration {
        Configuration::new(self.threads, self.pstate)
    }
}

// ZEROED BETWEEN INNER ITERATIONS. threads == 0 MEANS "NOTHING RECORDED".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LevelBest {
    pub throughput: f64,
    pub threads: usize,
    pub pstate: usize,
}

#[derive(Clone, Debug)]
pub struct SearchContext {
    current: Configuration,
    total_threads: usize,
    max_pstate: usize,
    power_limit: f64,

    pub steps: u32,
    pub decreasing: bool,
    pub starting_threads: usize,

    // None IS THE "NOTHING FOUND YET" SENTINEL. NEVER COMPARED AS A NUMBER.
    pub best: Option<BestConfig>,
    pub level_best: LevelBest,

    pub stopped_searching: bool,
    pub current_exploit_steps: u32,

    // CONFIGURATION FROZEN BY THE LAST CONVERGENCE (BEST OR FALLBACK)
    pub converged: Option<Configuration>,
}

impl SearchContext {
    pub fn new(cfg: &EngineConfig, seed: Configuration) -> Self {
        Self {
            current: seed,
            total_threads: cfg.total_threads,
            max_pstate: cfg.max_pstate(),
            power_limit: cfg.power_limit,
            steps: 0,
            decreasing: false,
            starting_threads: cfg.starting_threads,
            best: None,
            level_best: LevelBest::default(),
            stopped_searching: false,
            current_exploit_steps: 0,
            converged: None,
        }
    }

    pub fn current(&self) -> Configuration {
        self.current
    }

    pub fn threads(&self) -> usize {
        self.current.threads
    }

    pub fn pstate(&self) -> usize {
        self.current.pstate
    }

    pub fn total_threads(&self) -> usize {
        self.total_threads
    }

    pub fn max_pstate(&self) -> usize {
        self.max_pstate
    }

    pub fn power_limit(&self) -> f64 {
        self.power_limit
    }

    // STRICTLY BELOW THE LIMIT. EQUALITY COUNTS AS OVER THE CAP.
    pub fn under_cap(&self, power: f64) -> bool {
        power < self.power_limit
    }

    pub fn best_threads(&self) -> Option<usize> {
        self.best.map(|b| b.threads)
    }

    pub fn best_pstate(&self) -> Option<usize> {
        self.best.map(|b| b.pstate)
    }

    // TRUE UNLESS THROUGHPUT FELL BELOW 90% OF BEST. PASSES WHEN NO BEST EXISTS.
    pub fn within_degradation(&self, throughput: f64) -> bool {
        match self.best {
            Some(b) => throughput >= b.throughput * DEGRADATION_FACTOR,
            None => true,
        }
    }

    // STRICT VARIANT: THROUGHPUT MUST STAY ABOVE 90% OF BEST
    pub fn above_degradation(&self, throughput: f64) -> bool {
        match self.best {
            Some(b) => throughput > b.throughput * DEGRADATION_FACTOR,
            None => true,
        }
    }

    // --- KNOBS ---

    pub fn set_threads(&mut self, threads: usize) -> Result<(), EngineError> {
        if threads < 1 || threads > self.total_threads {
            return Err(EngineError::ThreadsOutOfRange {
                requested: threads as i64,
                total: self.total_threads,
            });
        }
        self.current.threads = threads;
        Ok(())
    }

    pub fn set_pstate(&mut self, pstate: usize) -> Result<(), EngineError> {
        if pstate > self.max_pstate {
            return Err(EngineError::PstateOutOfRange {
                requested: pstate as i64,
                max: self.max_pstate,
            });
        }
        self.current.pstate = pstate;
        Ok(())
    }

    pub fn set_config(&mut self, config: Configuration) -> Result<(), EngineError> {
        self.set_pstate(config.pstate)?;
        self.set_threads(config.threads)
    }

    pub fn add_thread(&mut self) -> Result<(), EngineError> {
        self.set_threads(self.current.threads + 1)
    }

    pub fn remove_thread(&mut self) -> Result<(), EngineError> {
        match self.current.threads.checked_sub(1) {
            Some(t) => self.set_threads(t),
            None => Err(EngineError::ThreadsOutOfRange { requested: -1, total: self.total_threads }),
        }
    }

    // LOWER INDEX = HIGHER FREQUENCY
    pub fn faster(&mut self) -> Result<(), EngineError> {
        match self.current.pstate.checked_sub(1) {
            Some(p) => self.set_pstate(p),
            None => Err(EngineError::PstateOutOfRange { requested: -1, max: self.max_pstate }),
        }
    }

    pub fn slower(&mut self) -> Result<(), EngineError> {
        self.set_pstate(self.current.pstate + 1)
    }

    // --- BEST CONFIGURATION BOOKKEEPING ---

    // REPLACE BEST IF THROUGHPUT IMPROVED, OR IF WE ARE AT THE BEST THREAD COUNT
    // AT AN EQUAL-OR-FASTER P-STATE. THE TIE-BREAK MOVES THE CONFIGURATION BUT
    // THE RECORDED THROUGHPUT NEVER DROPS WITHIN ONE EXPLORATION.
    // CALLERS ONLY INVOKE THIS UNDER THE CAP.
    pub fn update_best_config(&mut self, throughput: f64, power: f64) {
        let cur = self.current;
        let next = match self.best {
            None => Some(throughput),
            Some(b) if throughput > b.throughput => Some(throughput),
            Some(b) if cur.threads == b.threads && cur.pstate <= b.pstate => Some(b.throughput),
            Some(_) => None,
        };
        if let Some(tp) = next {
            self.best = Some(BestConfig {
                throughput: tp,
                threads: cur.threads,
                pstate: cur.pstate,
                power,
            });
        }
    }

    pub fn update_level_best_config(&mut self, throughput: f64) -> bool {
        if throughput > self.level_best.throughput {
            self.level_best = LevelBest {
                throughput,
                threads: self.current.threads,
                pstate: self.current.pstate,
            };
            true
        } else {
            false
        }
    }

    pub fn compare_best_level_config(&mut self) {
        let level = self.level_best;
        if level.threads == 0 {
            return;
        }
        let promote = match self.best {
            None => true,
            Some(b) => level.throughput > b.throughput,
        };
        if promote {
            let power = self.best.map(|b| b.power).unwrap_or(0.0);
            self.best = Some(BestConfig {
                throughput: level.throughput,
                threads: level.threads,
                pstate: level.pstate,
                power,
            });
        }
    }

    pub fn reset_level_best(&mut self) {
        self.level_best = LevelBest::default();
    }

    // --- TERMINAL TRANSITIONS ---

    // FREEZE THE WINNER. FALLS BACK TO (1 THREAD, SLOWEST P-STATE) WHEN NOTHING
    // FIT UNDER THE CAP. IN MODEL VALIDATION THE REQUEST IS (1, validation_pstate)
    // INSTEAD, WHICH STARTS THE VALIDATION SWEEP. RETURNS THE FROZEN WINNER.
    pub fn stop_searching(&mut self, validation_pstate: Option<usize>) -> Configuration {
        self.decreasing = false;
        self.stopped_searching = true;
        self.reset_level_best();
        self.current_exploit_steps = 0;

        let chosen = match self.best {
            Some(b) => b.config(),
            None => Configuration::new(1, self.max_pstate),
        };
        self.converged = Some(chosen);

        crate::log_info!(
            "EXPLORATION COMPLETED IN {} STEPS. OPTIMAL: {} THREADS P-STATE {}",
            self.steps, chosen.threads, chosen.pstate
        );

        self.current = match validation_pstate {
            Some(p) => Configuration::new(1, p.min(self.max_pstate)),
            None => chosen,
        };
        self.steps = 0;
        chosen
    }

    // RE-ENTER EXPLORATION FROM seed WITH EVERY BEST/LEVEL FIELD AT ITS SENTINEL
    pub fn restart(&mut self, seed: Configuration) -> Result<(), EngineError> {
        self.set_config(seed)?;
        self.best = None;
        self.reset_level_best();
        self.decreasing = false;
        self.steps = 0;
        self.current_exploit_steps = 0;
        self.stopped_searching = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeuristicMode;
    use crate::freq::FrequencyTable;

    fn ctx() -> SearchContext {
        let freqs = FrequencyTable::parse("3000000 2500000 2000000 1500000 1000000").unwrap();
        let cfg = EngineConfig::new(65.0, 8, freqs, HeuristicMode::Dynamic);
        SearchContext::new(&cfg, Configuration::new(1, 4))
    }

    #[test]
    fn knobs_refuse_out_of_range() {
        let mut c = ctx();
        assert!(c.remove_thread().is_err());
        assert_eq!(c.threads(), 1);
        assert!(c.set_threads(9).is_err());
        assert!(c.slower().is_err());
        assert_eq!(c.pstate(), 4);
        c.set_pstate(0).unwrap();
        assert_eq!(
            c.faster(),
            Err(EngineError::PstateOutOfRange { requested: -1, max: 4 })
        );
    }

    #[test]
    fn first_update_always_records() {
        let mut c = ctx();
        c.update_best_config(0.0, 10.0);
        assert_eq!(c.best_threads(), Some(1));
        assert_eq!(c.best.unwrap().throughput, 0.0);
    }

    #[test]
    fn update_best_prefers_higher_throughput() {
        let mut c = ctx();
        c.update_best_config(100.0, 30.0);
        c.set_threads(2).unwrap();
        c.update_best_config(90.0, 35.0);
        assert_eq!(c.best_threads(), Some(1));
        c.update_best_config(150.0, 40.0);
        assert_eq!(c.best_threads(), Some(2));
    }

    #[test]
    fn tie_break_moves_to_faster_pstate_without_dropping_throughput() {
        let mut c = ctx();
        c.set_threads(3).unwrap();
        c.update_best_config(200.0, 40.0);
        c.set_pstate(3).unwrap();
        c.update_best_config(180.0, 45.0);
        let b = c.best.unwrap();
        assert_eq!((b.threads, b.pstate), (3, 3));
        assert_eq!(b.throughput, 200.0);
        assert_eq!(b.power, 45.0);
    }

    #[test]
    fn level_best_replaces_only_on_improvement() {
        let mut c = ctx();
        assert!(c.update_level_best_config(10.0));
        assert!(!c.update_level_best_config(10.0));
        c.set_threads(2).unwrap();
        assert!(c.update_level_best_config(11.0));
        assert_eq!(c.level_best.threads, 2);
    }

    #[test]
    fn compare_best_level_promotes() {
        let mut c = ctx();
        c.update_best_config(50.0, 30.0);
        c.set_config(Configuration::new(4, 2)).unwrap();
        c.update_level_best_config(80.0);
        c.compare_best_level_config();
        let b = c.best.unwrap();
        assert_eq!((b.threads, b.pstate, b.throughput), (4, 2, 80.0));
        assert_eq!(b.power, 30.0);
    }

    #[test]
    fn compare_best_level_ignores_empty_level() {
        let mut c = ctx();
        c.compare_best_level_config();
        assert!(c.best.is_none());
    }

    #[test]
    fn stop_searching_falls_back_without_best() {
        let mut c = ctx();
        c.set_config(Configuration::new(5, 2)).unwrap();
        c.decreasing = true;
        c.update_level_best_config(5.0);
        let chosen = c.stop_searching(None);
        assert_eq!(chosen, Configuration::new(1, 4));
        assert_eq!(c.current(), chosen);
        assert!(c.stopped_searching);
        assert!(!c.decreasing);
        assert_eq!(c.level_best.threads, 0);
    }

    #[test]
    fn stop_searching_requests_validation_sweep() {
        let mut c = ctx();
        c.set_threads(6).unwrap();
        c.update_best_config(10.0, 10.0);
        let chosen = c.stop_searching(Some(3));
        assert_eq!(chosen, Configuration::new(6, 4));
        assert_eq!(c.current(), Configuration::new(1, 3));
    }

    #[test]
    fn restart_clears_sentinels() {
        let mut c = ctx();
        c.update_best_config(10.0, 10.0);
        c.stop_searching(None);
        c.restart(Configuration::new(2, 4)).unwrap();
        assert!(c.best.is_none());
        assert!(!c.stopped_searching);
        assert_eq!(c.current(), Configuration::new(2, 4));
    }
}
