// POWERCAP TWO-STEP SEARCH
// STATELESS: CLIMB THREADS AT THE SLOWEST P-STATE, THEN SPEND THE HEADROOM ON
// FREQUENCY. EVERY RESTART BEGINS FROM (1 THREAD, SLOWEST P-STATE).
// STATEFUL: DYNAMIC0 THREAD DISCOVERY FROM THE PREVIOUS OPTIMUM, SLOWING DOWN
// UNTIL SOMETHING FITS, THEN THE SAME FREQUENCY CLIMB.

use crate::error::EngineError;
use crate::search::{Sample, SearchContext};

use super::dynamic::{Discovery, ThreadDiscovery};
use super::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoStepPhase {
    Threads,
    Frequency,
}

impl TwoStepPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Threads => "THREADS",
            Self::Frequency => "FREQUENCY",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TwoStep {
    phase: TwoStepPhase,
}

impl TwoStep {
    pub fn new() -> Self {
        Self { phase: TwoStepPhase::Threads }
    }

    pub fn phase(&self) -> TwoStepPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = TwoStepPhase::Threads;
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let under = ctx.under_cap(sample.power);
        if under {
            ctx.update_best_config(sample.throughput, sample.power);
        }

        match self.phase {
            TwoStepPhase::Threads => {
                if under && ctx.threads() < ctx.total_threads() && ctx.above_degradation(sample.throughput) {
                    ctx.add_thread()?;
                    return Ok(Transition::Continue);
                }
                if let Some(t) = ctx.best_threads() {
                    ctx.set_threads(t)?;
                }
                if ctx.pstate() == 0 {
                    return Ok(Transition::Converge);
                }
                ctx.faster()?;
                self.phase = TwoStepPhase::Frequency;
                crate::log_debug!("TWO-STEP: {} THREADS, P-STATE {}", ctx.threads(), ctx.pstate());
                Ok(Transition::Continue)
            }
            TwoStepPhase::Frequency => {
                if under && ctx.pstate() > 0 {
                    ctx.faster()?;
                    return Ok(Transition::Continue);
                }
                Ok(Transition::Converge)
            }
        }
    }
}

impl Default for TwoStep {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct TwoStepStateful {
    phase: TwoStepPhase,
}

impl TwoStepStateful {
    pub fn new() -> Self {
        Self { phase: TwoStepPhase::Threads }
    }

    pub fn phase(&self) -> TwoStepPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = TwoStepPhase::Threads;
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        match self.phase {
            TwoStepPhase::Threads => match ThreadDiscovery::step(ctx, sample)? {
                Discovery::Continue => Ok(Transition::Continue),
                Discovery::Exhausted => self.from_phase0_to_next(ctx),
            },
            TwoStepPhase::Frequency => self.frequency(ctx, sample),
        }
    }

    // NOTHING FIT YET: SLOW DOWN AND RETRY THE THREAD SWEEP
    fn from_phase0_to_next(&mut self, ctx: &mut SearchContext) -> Result<Transition, EngineError> {
        match ctx.best {
            None => {
                if ctx.pstate() == ctx.max_pstate() {
                    return Ok(Transition::Converge);
                }
                ctx.slower()?;
                crate::log_debug!("TWO-STEP-STATEFUL: NOTHING FITS, RETRYING AT P-STATE {}", ctx.pstate());
                Ok(Transition::Continue)
            }
            Some(best) => {
                if ctx.pstate() == 0 {
                    return Ok(Transition::Converge);
                }
                ctx.set_threads(best.threads)?;
                ctx.faster()?;
                self.phase = TwoStepPhase::Frequency;
                crate::log_debug!("TWO-STEP-STATEFUL: {} THREADS, P-STATE {}", ctx.threads(), ctx.pstate());
                Ok(Transition::Continue)
            }
        }
    }

    fn frequency(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let under = ctx.under_cap(sample.power);
        if under {
            ctx.update_best_config(sample.throughput, sample.power);
        }
        if (under && ctx.pstate() == 0) || (!under && ctx.threads() == 1) {
            return Ok(Transition::Converge);
        }
        if under {
            ctx.faster()?;
            return Ok(Transition::Continue);
        }
        if ctx.best.is_none() && ctx.pstate() < ctx.max_pstate() {
            ctx.slower()?;
            return Ok(Transition::Continue);
        }
        Ok(Transition::Converge)
    }
}

impl Default for TwoStepStateful {
    fn default() -> Self {
        Self::new()
    }
}
