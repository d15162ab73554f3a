// POWERCAP GOVERNOR
// GLUE BETWEEN THE DECISION ENGINE AND THE MACHINE. FEEDS ROUNDS IN, PUSHES
// ONLY THE KNOBS THAT CHANGED OUT, RECORDS EVERY ROUND IN THE ROUND LOG.
// ACTUATION IS FIRE-AND-FORGET: NO WAITING FOR THE HARDWARE TO SETTLE.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::engine::{Decision, Engine, EngineEvent};
use crate::error::EngineError;
use crate::event::{Mark, RoundLog};
use crate::search::{Configuration, Sample};

pub trait Actuator {
    fn set_pstate(&mut self, pstate: usize) -> Result<()>;
    fn set_threads(&mut self, threads: usize) -> Result<()>;
    fn set_boost(&mut self, enabled: bool) -> Result<()>;
}

pub struct Governor<A: Actuator> {
    engine: Engine,
    actuator: A,
    applied: Configuration,
    report_path: Option<PathBuf>,
    pub log: RoundLog,
}

impl<A: Actuator> Governor<A> {
    // APPLIES THE ENGINE'S SEED CONFIGURATION BEFORE THE FIRST ROUND
    pub fn new(engine: Engine, mut actuator: A) -> Result<Self> {
        let seed = engine.current();
        check_range(&engine, seed)?;
        actuator.set_pstate(seed.pstate).context("applying initial p-state")?;
        actuator.set_threads(seed.threads).context("applying initial thread count")?;
        crate::log_info!("STARTING AT {} THREADS P-STATE {}", seed.threads, seed.pstate);
        Ok(Self {
            engine,
            actuator,
            applied: seed,
            report_path: None,
            log: RoundLog::new(),
        })
    }

    // WHERE THE MODEL VALIDATION REPORT GOES WHEN IT COMPLETES
    pub fn with_report_path(mut self, path: PathBuf) -> Self {
        self.report_path = Some(path);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn applied(&self) -> Configuration {
        self.applied
    }

    // ONE COMPLETED ROUND. Ok(None) MEANS THE ROUND WAS DISCARDED.
    pub fn on_round(&mut self, sample: Sample) -> Result<Option<Decision>> {
        let measured_at = self.applied;
        let exploring = self.engine.is_exploring();
        let Some(decision) = self.engine.step(sample)? else {
            return Ok(None);
        };

        let mut mark = Mark::None;
        for event in &decision.events {
            match event {
                EngineEvent::Converged { config, steps } => {
                    mark = Mark::Converged;
                    crate::log_info!(
                        "CONVERGED AFTER {} STEPS: {} THREADS P-STATE {}",
                        steps, config.threads, config.pstate
                    );
                }
                EngineEvent::BoostDisabled => {
                    mark = Mark::BoostDisabled;
                    self.actuator.set_boost(false).context("disabling boost")?;
                }
                EngineEvent::Restarted { .. } => mark = Mark::Restarted,
                EngineEvent::ValidationComplete(report) => {
                    mark = Mark::Validated;
                    if let Some(path) = &self.report_path {
                        std::fs::write(path, report.render())
                            .with_context(|| format!("writing {}", path.display()))?;
                        crate::log_info!("MODEL VALIDATION WRITTEN TO {}", path.display());
                    }
                }
            }
        }
        self.log.record(measured_at, &sample, exploring, mark);

        self.apply(decision.config)?;
        Ok(Some(decision))
    }

    fn apply(&mut self, target: Configuration) -> Result<()> {
        check_range(&self.engine, target)?;
        if target.pstate != self.applied.pstate {
            self.actuator.set_pstate(target.pstate)
                .with_context(|| format!("setting p-state {}", target.pstate))?;
        }
        if target.threads != self.applied.threads {
            self.actuator.set_threads(target.threads)
                .with_context(|| format!("setting {} threads", target.threads))?;
        }
        self.applied = target;
        Ok(())
    }
}

fn check_range(engine: &Engine, target: Configuration) -> Result<(), EngineError> {
    let cfg = engine.config();
    if target.threads < 1 || target.threads > cfg.total_threads {
        return Err(EngineError::ThreadsOutOfRange {
            requested: target.threads as i64,
            total: cfg.total_threads,
        });
    }
    if target.pstate > cfg.max_pstate() {
        return Err(EngineError::PstateOutOfRange {
            requested: target.pstate as i64,
            max: cfg.max_pstate(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, HeuristicMode};
    use crate::freq::FrequencyTable;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Actuator for Recorder {
        fn set_pstate(&mut self, pstate: usize) -> Result<()> {
            self.calls.push(format!("pstate {}", pstate));
            Ok(())
        }
        fn set_threads(&mut self, threads: usize) -> Result<()> {
            self.calls.push(format!("threads {}", threads));
            Ok(())
        }
        fn set_boost(&mut self, enabled: bool) -> Result<()> {
            self.calls.push(format!("boost {}", enabled));
            Ok(())
        }
    }

    fn governor() -> Governor<Recorder> {
        let freqs = FrequencyTable::parse("3000000 2500000 2000000 1500000 1000000").unwrap();
        let cfg = EngineConfig::new(65.0, 8, freqs, HeuristicMode::Dynamic);
        Governor::new(Engine::new(cfg).unwrap(), Recorder::default()).unwrap()
    }

    #[test]
    fn seed_is_applied() {
        let g = governor();
        assert_eq!(g.actuator().calls, vec!["pstate 4", "threads 1"]);
    }

    #[test]
    fn only_changed_knobs_are_written() {
        let mut g = governor();
        g.on_round(Sample::new(100.0, 40.0, 1)).unwrap();
        assert_eq!(g.actuator().calls[2..], ["threads 2".to_string()]);
        assert_eq!(g.applied(), Configuration::new(2, 4));
        assert_eq!(g.log.len(), 1);
    }

    #[test]
    fn discarded_round_leaves_no_trace() {
        let mut g = governor();
        assert!(g.on_round(Sample::new(100.0, 0.0, 1)).unwrap().is_none());
        assert_eq!(g.actuator().calls.len(), 2);
        assert!(g.log.is_empty());
    }
}
