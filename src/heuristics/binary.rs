// POWERCAP INDEPENDENT BINARY SEARCH
// TWO SEARCHES IN SEQUENCE: THREADS AT THE SLOWEST P-STATE, THEN P-STATE AT
// THE CHOSEN THREAD COUNT. BOTH INTERVALS SHRINK BY AT LEAST ONE EVERY SAMPLE.

use crate::error::EngineError;
use crate::search::{Configuration, Sample, SearchContext};

use super::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryPhase {
    Threads,
    Pstates,
}

impl BinaryPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Threads => "THREAD-SEARCH",
            Self::Pstates => "PSTATE-SEARCH",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BinarySearch {
    phase: BinaryPhase,
    // 0 = AWAITING THE 1-THREAD PROBE, 1 = AWAITING THE ALL-THREADS PROBE
    probes: u8,
    total_threads: usize,
    max_pstate: usize,

    min_threads: usize,
    max_threads: usize,
    min_threads_tp: Option<f64>,

    min_pstate: usize,
    max_pstate_bound: usize,
    collapsed: bool,
}

impl BinarySearch {
    pub fn new(total_threads: usize, max_pstate: usize) -> Self {
        Self {
            phase: BinaryPhase::Threads,
            probes: 0,
            total_threads,
            max_pstate,
            min_threads: 1,
            max_threads: total_threads,
            min_threads_tp: None,
            min_pstate: 0,
            max_pstate_bound: max_pstate,
            collapsed: false,
        }
    }

    pub fn phase(&self) -> BinaryPhase {
        self.phase
    }

    pub fn thread_bounds(&self) -> (usize, usize) {
        (self.min_threads, self.max_threads)
    }

    pub fn pstate_bounds(&self) -> (usize, usize) {
        (self.min_pstate, self.max_pstate_bound)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.total_threads, self.max_pstate);
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        match self.phase {
            BinaryPhase::Threads => self.thread_step(ctx, sample),
            BinaryPhase::Pstates => self.pstate_step(ctx, sample),
        }
    }

    fn thread_step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let tp = sample.throughput;
        match self.probes {
            0 => {
                self.probes = 1;
                self.min_threads_tp = Some(tp);
                if self.total_threads == 1 {
                    return self.to_pstates(ctx, 1);
                }
                ctx.set_threads(self.total_threads)?;
                Ok(Transition::Continue)
            }
            1 => {
                self.probes = 2;
                if tp < self.min_threads_tp.unwrap_or(0.0) {
                    crate::log_debug!("BINARY: ALL THREADS SLOWER THAN ONE, SKIPPING THREAD SEARCH");
                    return self.to_pstates(ctx, 1);
                }
                self.propose_threads(ctx)
            }
            _ => {
                let at = ctx.threads();
                let higher = ctx.under_cap(sample.power) && self.min_threads_tp.map_or(true, |m| tp >= m);
                if higher {
                    self.min_threads = at + 1;
                    self.min_threads_tp = Some(tp);
                } else {
                    self.max_threads = at;
                }
                if self.min_threads >= self.max_threads {
                    return self.to_pstates(ctx, self.min_threads.min(self.max_threads));
                }
                self.propose_threads(ctx)
            }
        }
    }

    fn propose_threads(&mut self, ctx: &mut SearchContext) -> Result<Transition, EngineError> {
        let proposal = self.min_threads + (self.max_threads - self.min_threads) / 2;
        ctx.set_threads(proposal)?;
        crate::log_debug!(
            "BINARY: THREADS [{}, {}] -> {}",
            self.min_threads, self.max_threads, proposal
        );
        Ok(Transition::Continue)
    }

    fn to_pstates(&mut self, ctx: &mut SearchContext, threads: usize) -> Result<Transition, EngineError> {
        self.phase = BinaryPhase::Pstates;
        self.min_pstate = 0;
        self.max_pstate_bound = self.max_pstate;
        self.collapsed = false;
        ctx.set_config(Configuration::new(threads, self.max_pstate / 2))?;
        crate::log_debug!("BINARY: {} THREADS, P-STATE SEARCH FROM {}", threads, self.max_pstate / 2);
        Ok(Transition::Continue)
    }

    fn pstate_step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let under = ctx.under_cap(sample.power);
        if self.collapsed {
            if under {
                ctx.update_best_config(sample.throughput, sample.power);
            }
            return Ok(Transition::Converge);
        }

        let at = ctx.pstate();
        if under {
            self.max_pstate_bound = at;
        } else {
            self.min_pstate = (at + 1).min(self.max_pstate_bound);
        }

        if self.min_pstate >= self.max_pstate_bound {
            let target = self.max_pstate_bound;
            if target == at {
                if under {
                    ctx.update_best_config(sample.throughput, sample.power);
                }
                return Ok(Transition::Converge);
            }
            self.collapsed = true;
            ctx.set_pstate(target)?;
            return Ok(Transition::Continue);
        }

        // FLOOR, NOT CEIL: CEIL NEVER LEAVES [0, 1] WHILE P-STATE 1 STAYS UNDER THE CAP
        let proposal = self.min_pstate + (self.max_pstate_bound - self.min_pstate) / 2;
        ctx.set_pstate(proposal)?;
        Ok(Transition::Continue)
    }
}
