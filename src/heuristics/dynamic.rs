// POWERCAP DYNAMIC0: PHASED THREAD/FREQUENCY SEARCH
//
// PHASE 0  THREAD DISCOVERY AT THE STARTING P-STATE
// PHASE 1  FREQUENCY SWEEP HOLDING THE BEST THREAD COUNT
// PHASE 2  THREAD CLIMB BELOW THE PHASE-0 P-STATE, ONE P-STATE AT A TIME
//
// THREAD DISCOVERY IS SHARED WITH THE STATEFUL TWO-STEP STRATEGY; ONLY THE
// PHASE-0 EXIT DIFFERS.

use crate::error::EngineError;
use crate::search::{Configuration, Sample, SearchContext};

use super::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discovery {
    Continue,
    Exhausted,
}

// PHASE-0 THREAD SWEEP. STEP 0 PROBES ONE THREAD UP (OR DOWN WHEN OVER THE
// CAP / AT TOTAL). STEP 1 CONTINUES UPWARD WHILE THROUGHPUT HOLDS. AFTER
// THAT THE SWEEP EITHER KEEPS CLIMBING OR TURNS AROUND BELOW starting_threads.
pub struct ThreadDiscovery;

impl ThreadDiscovery {
    pub fn step(ctx: &mut SearchContext, sample: &Sample) -> Result<Discovery, EngineError> {
        let under = ctx.under_cap(sample.power);
        if under {
            ctx.update_best_config(sample.throughput, sample.power);
        }
        let tp = sample.throughput;
        let total = ctx.total_threads();
        let threads = ctx.threads();

        if ctx.steps == 0 {
            if threads != total && under {
                ctx.add_thread()?;
                return Ok(Discovery::Continue);
            }
            if threads > 1 {
                ctx.decreasing = true;
                ctx.remove_thread()?;
                return Ok(Discovery::Continue);
            }
            return Ok(Discovery::Exhausted);
        }

        if ctx.decreasing {
            if !ctx.within_degradation(tp) || threads == 1 {
                return Ok(Discovery::Exhausted);
            }
            ctx.remove_thread()?;
            return Ok(Discovery::Continue);
        }

        if ctx.steps == 1 {
            if ctx.within_degradation(tp) && under && threads != total {
                ctx.add_thread()?;
                return Ok(Discovery::Continue);
            }
            return Self::turn_around(ctx);
        }

        if !under || threads == total || !ctx.within_degradation(tp) {
            return Self::turn_around(ctx);
        }
        ctx.add_thread()?;
        Ok(Discovery::Continue)
    }

    // SWITCH TO DECREASING. NOTHING BELOW A ONE-THREAD START: PHASE 0 IS DONE.
    fn turn_around(ctx: &mut SearchContext) -> Result<Discovery, EngineError> {
        ctx.decreasing = true;
        if ctx.starting_threads > 1 {
            ctx.set_threads(ctx.starting_threads - 1)?;
            return Ok(Discovery::Continue);
        }
        Ok(Discovery::Exhausted)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DynamicPhase {
    ThreadDiscovery,
    FrequencySweep,
    ThreadClimb,
}

impl DynamicPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::ThreadDiscovery => "THREADS",
            Self::FrequencySweep => "FREQUENCY",
            Self::ThreadClimb => "CLIMB",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DynamicSearch {
    phase: DynamicPhase,
    // WHERE PHASE 0 ENDED: (BEST THREADS OR 1, P-STATE AT EXIT)
    phase0: Option<Configuration>,
}

impl DynamicSearch {
    pub fn new() -> Self {
        Self { phase: DynamicPhase::ThreadDiscovery, phase0: None }
    }

    pub fn phase(&self) -> DynamicPhase {
        self.phase
    }

    pub fn phase0(&self) -> Option<Configuration> {
        self.phase0
    }

    pub fn reset(&mut self) {
        self.phase = DynamicPhase::ThreadDiscovery;
        self.phase0 = None;
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        match self.phase {
            DynamicPhase::ThreadDiscovery => match ThreadDiscovery::step(ctx, sample)? {
                Discovery::Continue => Ok(Transition::Continue),
                Discovery::Exhausted => self.from_phase0_to_next(ctx),
            },
            DynamicPhase::FrequencySweep => self.frequency_sweep(ctx, sample),
            DynamicPhase::ThreadClimb => self.thread_climb(ctx, sample),
        }
    }

    // WITHOUT A FEASIBLE CONFIG THE NEXT PHASE STARTS FROM WHERE PHASE 0 STOPPED
    fn from_phase0_to_next(&mut self, ctx: &mut SearchContext) -> Result<Transition, EngineError> {
        let best = ctx.best_threads();
        let threads = best.unwrap_or(1);
        let pstate = ctx.pstate();
        self.phase0 = Some(Configuration::new(threads, pstate));

        if pstate == 0 {
            if best == Some(ctx.total_threads()) || ctx.max_pstate() == 0 {
                return Ok(Transition::Converge);
            }
            self.phase = DynamicPhase::ThreadClimb;
            if best.is_some() {
                ctx.set_config(Configuration::new(threads, pstate + 1))?;
            }
            ctx.reset_level_best();
        } else {
            self.phase = DynamicPhase::FrequencySweep;
            if best.is_some() {
                ctx.set_config(Configuration::new(threads, pstate - 1))?;
            }
        }
        crate::log_debug!(
            "DYNAMIC: PHASE 0 DONE AT {} THREADS P-STATE {} -> {}",
            threads, pstate, self.phase.label()
        );
        Ok(Transition::Continue)
    }

    fn frequency_sweep(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let under = ctx.under_cap(sample.power);
        if under {
            ctx.update_best_config(sample.throughput, sample.power);
        }
        if (under && ctx.pstate() == 0) || (!under && ctx.threads() == 1) {
            return self.from_phase1_to_next(ctx);
        }
        if under {
            ctx.faster()?;
        } else {
            ctx.remove_thread()?;
        }
        Ok(Transition::Continue)
    }

    fn from_phase1_to_next(&mut self, ctx: &mut SearchContext) -> Result<Transition, EngineError> {
        let Some(p0) = self.phase0 else {
            return Ok(Transition::Converge);
        };
        let total = ctx.total_threads();
        if p0.pstate == ctx.max_pstate() || ctx.best_threads() == Some(total) || p0.threads == total {
            return Ok(Transition::Converge);
        }
        self.phase = DynamicPhase::ThreadClimb;
        ctx.set_config(Configuration::new(p0.threads, p0.pstate + 1))?;
        ctx.reset_level_best();
        crate::log_debug!("DYNAMIC: CLIMB FROM {} THREADS P-STATE {}", p0.threads, p0.pstate + 1);
        Ok(Transition::Continue)
    }

    fn thread_climb(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let under = ctx.under_cap(sample.power);
        if under {
            ctx.update_best_config(sample.throughput, sample.power);
        }
        let at_max_pstate = ctx.pstate() == ctx.max_pstate();
        let at_max_threads = ctx.threads() == ctx.total_threads();

        if (at_max_pstate && (!under || at_max_threads))
            || sample.throughput < ctx.level_best.throughput
            || (at_max_threads && under)
        {
            ctx.compare_best_level_config();
            return Ok(Transition::Converge);
        }

        if under {
            ctx.update_level_best_config(sample.throughput);
            ctx.add_thread()?;
        } else {
            ctx.slower()?;
            ctx.reset_level_best();
        }
        Ok(Transition::Continue)
    }
}

impl Default for DynamicSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, HeuristicMode};
    use crate::freq::FrequencyTable;

    fn ctx(total: usize, start: Configuration) -> SearchContext {
        let freqs = FrequencyTable::parse("3000000 2500000 2000000 1500000 1000000").unwrap();
        let cfg = EngineConfig::new(65.0, total, freqs, HeuristicMode::Dynamic);
        SearchContext::new(&cfg, start)
    }

    fn sample(tp: f64, power: f64) -> Sample {
        Sample::new(tp, power, 1_000_000)
    }

    #[test]
    fn discovery_climbs_under_cap() {
        let mut c = ctx(8, Configuration::new(1, 4));
        assert_eq!(ThreadDiscovery::step(&mut c, &sample(100.0, 40.0)).unwrap(), Discovery::Continue);
        assert_eq!(c.threads(), 2);
    }

    #[test]
    fn discovery_over_cap_at_step_zero_decreases() {
        let mut c = ctx(8, Configuration::new(4, 4));
        ThreadDiscovery::step(&mut c, &sample(100.0, 70.0)).unwrap();
        assert!(c.decreasing);
        assert_eq!(c.threads(), 3);
        assert!(c.best.is_none());
    }

    #[test]
    fn discovery_single_thread_over_cap_is_exhausted() {
        let mut c = ctx(8, Configuration::new(1, 4));
        assert_eq!(ThreadDiscovery::step(&mut c, &sample(10.0, 80.0)).unwrap(), Discovery::Exhausted);
    }

    #[test]
    fn discovery_turns_around_below_start() {
        let mut c = ctx(8, Configuration::new(4, 4));
        c.starting_threads = 4;
        ThreadDiscovery::step(&mut c, &sample(100.0, 40.0)).unwrap();
        c.steps = 1;
        // THROUGHPUT COLLAPSED AT 5 THREADS
        ThreadDiscovery::step(&mut c, &sample(50.0, 45.0)).unwrap();
        assert!(c.decreasing);
        assert_eq!(c.threads(), 3);
    }

    #[test]
    fn phase0_exit_without_best_keeps_config() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(1, 0));
        // OVER THE CAP AT ONE THREAD, FASTEST P-STATE
        assert_eq!(d.step(&mut c, &sample(10.0, 90.0)).unwrap(), Transition::Continue);
        assert_eq!(d.phase(), DynamicPhase::ThreadClimb);
        assert_eq!(c.current(), Configuration::new(1, 0));
        assert_eq!(d.phase0(), Some(Configuration::new(1, 0)));

        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(1, 2));
        d.step(&mut c, &sample(10.0, 90.0)).unwrap();
        assert_eq!(d.phase(), DynamicPhase::FrequencySweep);
        assert_eq!(c.current(), Configuration::new(1, 2));
    }

    #[test]
    fn phase0_exit_at_boost_climbs_from_best() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(3, 0));
        c.starting_threads = 3;
        // 3 THREADS FIT, 4 DON'T
        d.step(&mut c, &sample(300.0, 50.0)).unwrap();
        assert_eq!(c.threads(), 4);
        c.steps = 1;
        d.step(&mut c, &sample(380.0, 80.0)).unwrap();
        assert_eq!(c.current(), Configuration::new(2, 0));
        c.steps = 2;
        // TWO THREADS FALL BELOW 90% OF BEST
        assert_eq!(d.step(&mut c, &sample(200.0, 40.0)).unwrap(), Transition::Continue);
        assert_eq!(d.phase(), DynamicPhase::ThreadClimb);
        assert_eq!(c.current(), Configuration::new(3, 1));
        assert_eq!(c.level_best.threads, 0);
    }

    #[test]
    fn frequency_sweep_sheds_threads_over_cap() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(3, 4));
        d.phase = DynamicPhase::FrequencySweep;
        d.phase0 = Some(Configuration::new(3, 4));
        d.step(&mut c, &sample(100.0, 70.0)).unwrap();
        assert_eq!(c.current(), Configuration::new(2, 4));
        d.step(&mut c, &sample(90.0, 50.0)).unwrap();
        assert_eq!(c.current(), Configuration::new(2, 3));
    }

    #[test]
    fn frequency_sweep_converges_from_slowest_phase0() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(3, 0));
        d.phase = DynamicPhase::FrequencySweep;
        d.phase0 = Some(Configuration::new(3, 4));
        assert_eq!(d.step(&mut c, &sample(200.0, 60.0)).unwrap(), Transition::Converge);
    }

    #[test]
    fn sweep_hands_over_to_climb_below_phase0() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(4, 2));
        c.starting_threads = 4;
        c.update_level_best_config(999.0);
        // PHASE 0 AT P-STATE 3 SETTLED ON 4 THREADS; THE SWEEP IS AT P-STATE 1
        d.phase = DynamicPhase::FrequencySweep;
        d.phase0 = Some(Configuration::new(4, 3));
        c.set_config(Configuration::new(4, 1)).unwrap();
        c.update_best_config(400.0, 50.0);

        // OVER THE CAP: SHED A THREAD, STAY IN THE SWEEP
        assert_eq!(d.step(&mut c, &sample(500.0, 70.0)).unwrap(), Transition::Continue);
        assert_eq!(c.current(), Configuration::new(3, 1));
        // UNDER THE CAP: NEXT P-STATE UP
        d.step(&mut c, &sample(380.0, 60.0)).unwrap();
        assert_eq!(c.current(), Configuration::new(3, 0));
        assert_eq!(d.phase(), DynamicPhase::FrequencySweep);

        // UNDER THE CAP AT P-STATE 0 ENDS THE SWEEP: CLIMB FROM THE PHASE-0
        // THREAD COUNT ONE P-STATE BELOW WHERE PHASE 0 RAN
        assert_eq!(d.step(&mut c, &sample(420.0, 62.0)).unwrap(), Transition::Continue);
        assert_eq!(d.phase(), DynamicPhase::ThreadClimb);
        assert_eq!(c.current(), Configuration::new(4, 4));
        assert_eq!(c.level_best.threads, 0);
        assert_eq!(c.best.map(|b| b.config()), Some(Configuration::new(3, 0)));
    }

    #[test]
    fn climb_stops_when_throughput_drops() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(2, 2));
        d.phase = DynamicPhase::ThreadClimb;
        d.step(&mut c, &sample(100.0, 40.0)).unwrap();
        assert_eq!(c.current(), Configuration::new(3, 2));
        assert_eq!(d.step(&mut c, &sample(80.0, 45.0)).unwrap(), Transition::Converge);
    }

    #[test]
    fn climb_moves_down_a_pstate_over_cap() {
        let mut d = DynamicSearch::new();
        let mut c = ctx(8, Configuration::new(2, 2));
        d.phase = DynamicPhase::ThreadClimb;
        c.update_level_best_config(10.0);
        d.step(&mut c, &sample(120.0, 70.0)).unwrap();
        assert_eq!(c.current(), Configuration::new(2, 3));
        assert_eq!(c.level_best.threads, 0);
    }
}
