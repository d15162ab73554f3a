// POWERCAP DECISION ENGINE
// ONE SAMPLE IN, ONE DECISION OUT. EXPLORES WITH THE CONFIGURED STRATEGY
// UNTIL IT CONVERGES, THEN HANDS EVERY SAMPLE TO THE DETECTION CONTROLLER.
// SINGLE CALLER AT A TIME; THE HOST SERIALIZES step().

use crate::config::{DetectionMode, EngineConfig, HeuristicMode};
use crate::detection::{Detector, DetectorEvent, ValidationReport};
use crate::error::{ConfigError, EngineError};
use crate::heuristics::{Strategy, Transition};
use crate::search::{Configuration, Sample, SearchContext};

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Converged { config: Configuration, steps: u32 },
    BoostDisabled,
    Restarted { seed: Configuration },
    ValidationComplete(Box<ValidationReport>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    // CONFIGURATION TO RUN THE NEXT ROUND AT
    pub config: Configuration,
    pub events: Vec<EngineEvent>,
}

impl Decision {
    pub fn converged(&self) -> Option<Configuration> {
        self.events.iter().find_map(|e| match e {
            EngineEvent::Converged { config, .. } => Some(*config),
            _ => None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Engine {
    cfg: EngineConfig,
    ctx: SearchContext,
    strategy: Strategy,
    detector: Detector,
    rounds: u64,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let seed = initial_config(&cfg);
        let ctx = SearchContext::new(&cfg, seed);
        let strategy = Strategy::for_config(&cfg);
        let detector = Detector::new(&cfg);
        crate::log_info!(
            "ENGINE: {} HEURISTIC, {:?} DETECTION, LIMIT {:.1}W, {} THREADS, {} P-STATES",
            cfg.heuristic.label(),
            cfg.detection,
            cfg.power_limit,
            cfg.total_threads,
            cfg.max_pstate() + 1
        );
        Ok(Self { cfg, ctx, strategy, detector, rounds: 0 })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn detection_mode(&self) -> DetectionMode {
        self.detector.mode()
    }

    pub fn current(&self) -> Configuration {
        self.ctx.current()
    }

    pub fn is_exploring(&self) -> bool {
        !self.ctx.stopped_searching
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    // None: THE ROUND WAS DISCARDED (NON-POSITIVE POWER), NOTHING CHANGED.
    // Err: A STRATEGY ASKED FOR A KNOB VALUE OUTSIDE THE TABLE.
    pub fn step(&mut self, sample: Sample) -> Result<Option<Decision>, EngineError> {
        if !(sample.power > 0.0) {
            crate::log_warn!(
                "DISCARDING ROUND: POWER {:.3}W (ENERGY COUNTER WRAP OR GLITCH)",
                sample.power
            );
            return Ok(None);
        }
        self.rounds += 1;
        let mut events = Vec::new();

        if !self.ctx.stopped_searching {
            match self.strategy.step(&mut self.ctx, &sample)? {
                Transition::Continue => {
                    self.ctx.steps += 1;
                    crate::log_debug!(
                        "STEP {} [{}]: {:.1}/s {:.2}W -> {} THREADS P-STATE {}",
                        self.ctx.steps,
                        self.strategy.phase_label(),
                        sample.throughput,
                        sample.power,
                        self.ctx.threads(),
                        self.ctx.pstate()
                    );
                }
                Transition::Converge => {
                    let steps = self.ctx.steps;
                    let chosen = self.ctx.stop_searching(self.detector.validation_target());
                    self.strategy.reset();
                    events.push(EngineEvent::Converged { config: chosen, steps });
                }
            }
        } else {
            for e in self.detector.observe(&mut self.ctx, &mut self.strategy, &sample)? {
                events.push(match e {
                    DetectorEvent::BoostDisabled => EngineEvent::BoostDisabled,
                    DetectorEvent::Restarted { seed } => EngineEvent::Restarted { seed },
                    DetectorEvent::ValidationComplete(r) => EngineEvent::ValidationComplete(r),
                });
            }
        }

        Ok(Some(Decision { config: self.ctx.current(), events }))
    }
}

// WHERE EXPLORATION STARTS: THE STATIC CONFIGURATION FOR FIXED MODE, ONE
// THREAD FOR THE FLOOR-START STRATEGIES, starting_threads OTHERWISE. ALWAYS
// AT THE SLOWEST P-STATE EXCEPT IN FIXED MODE.
pub fn initial_config(cfg: &EngineConfig) -> Configuration {
    let max_pstate = cfg.max_pstate();
    match cfg.heuristic {
        HeuristicMode::Fixed => Configuration::new(cfg.starting_threads, cfg.static_pstate),
        h if h.starts_from_floor() => Configuration::new(1, max_pstate),
        _ => Configuration::new(cfg.starting_threads, max_pstate),
    }
}
