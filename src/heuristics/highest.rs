// POWERCAP HIGHEST-THREADS (CAP-AND-PACK)
// BEST = MOST THREADS UNDER THE CAP, TIE-BROKEN BY THE FASTEST P-STATE.
// PHASE 0 FINDS THE LARGEST FEASIBLE THREAD COUNT AT THE STARTING P-STATE,
// PHASE 1 SPENDS THE REMAINING HEADROOM ON FREQUENCY.

use crate::error::EngineError;
use crate::search::{BestConfig, Configuration, Sample, SearchContext};

use super::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighestPhase {
    Threads,
    Frequency,
}

impl HighestPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Threads => "THREADS",
            Self::Frequency => "FREQUENCY",
        }
    }
}

#[derive(Clone, Debug)]
pub struct HighestThreads {
    phase: HighestPhase,
}

impl HighestThreads {
    pub fn new() -> Self {
        Self { phase: HighestPhase::Threads }
    }

    pub fn phase(&self) -> HighestPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = HighestPhase::Threads;
    }

    // RANKS BY THREAD COUNT, NOT THROUGHPUT
    fn update_highest_threads(ctx: &mut SearchContext, sample: &Sample) {
        if !ctx.under_cap(sample.power) {
            return;
        }
        let cur = ctx.current();
        let replace = match ctx.best {
            None => true,
            Some(b) if cur.threads == b.threads => cur.pstate < b.pstate,
            Some(b) => cur.threads > b.threads,
        };
        if replace {
            ctx.best = Some(BestConfig {
                throughput: sample.throughput,
                threads: cur.threads,
                pstate: cur.pstate,
                power: sample.power,
            });
        }
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        Self::update_highest_threads(ctx, sample);
        let under = ctx.under_cap(sample.power);
        let threads = ctx.threads();
        let total = ctx.total_threads();

        match self.phase {
            HighestPhase::Threads => {
                if ctx.steps == 0 {
                    if threads == total || !under {
                        if threads == 1 {
                            return Ok(Transition::Converge);
                        }
                        ctx.decreasing = true;
                        ctx.remove_thread()?;
                    } else {
                        ctx.add_thread()?;
                    }
                    return Ok(Transition::Continue);
                }

                if ctx.decreasing {
                    if under {
                        return self.to_frequency(ctx);
                    }
                    if threads == 1 {
                        return Ok(Transition::Converge);
                    }
                    ctx.remove_thread()?;
                    return Ok(Transition::Continue);
                }

                if !under || threads == total {
                    return self.to_frequency(ctx);
                }
                ctx.add_thread()?;
                Ok(Transition::Continue)
            }
            HighestPhase::Frequency => {
                if !under || ctx.pstate() == 0 {
                    return Ok(Transition::Converge);
                }
                ctx.faster()?;
                Ok(Transition::Continue)
            }
        }
    }

    // FROM THE BEST FEASIBLE CONFIG, ONE P-STATE FASTER
    fn to_frequency(&mut self, ctx: &mut SearchContext) -> Result<Transition, EngineError> {
        let Some(best) = ctx.best else {
            return Ok(Transition::Converge);
        };
        if best.pstate == 0 {
            return Ok(Transition::Converge);
        }
        self.phase = HighestPhase::Frequency;
        ctx.set_config(Configuration::new(best.threads, best.pstate - 1))?;
        crate::log_debug!("HIGHEST: {} THREADS FEASIBLE, TRYING P-STATE {}", best.threads, best.pstate - 1);
        Ok(Transition::Continue)
    }
}

impl Default for HighestThreads {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, HeuristicMode};
    use crate::freq::FrequencyTable;

    fn ctx(start: Configuration) -> SearchContext {
        let freqs = FrequencyTable::parse("3000000 2500000 2000000 1500000").unwrap();
        let cfg = EngineConfig::new(50.0, 4, freqs, HeuristicMode::HighestThreads);
        SearchContext::new(&cfg, start)
    }

    fn run(h: &mut HighestThreads, c: &mut SearchContext, tp: f64, power: f64) -> Transition {
        let t = h.step(c, &Sample::new(tp, power, 0)).unwrap();
        if t == Transition::Continue {
            c.steps += 1;
        }
        t
    }

    #[test]
    fn more_threads_beat_more_throughput() {
        let mut h = HighestThreads::new();
        let mut c = ctx(Configuration::new(1, 3));
        run(&mut h, &mut c, 100.0, 20.0);
        run(&mut h, &mut c, 90.0, 30.0);
        assert_eq!(c.best_threads(), Some(2));
        assert_eq!(c.best.unwrap().throughput, 90.0);
    }

    #[test]
    fn over_cap_hands_off_to_frequency() {
        let mut h = HighestThreads::new();
        let mut c = ctx(Configuration::new(1, 3));
        run(&mut h, &mut c, 100.0, 20.0);
        run(&mut h, &mut c, 180.0, 35.0);
        run(&mut h, &mut c, 200.0, 55.0);
        assert_eq!(h.phase(), HighestPhase::Frequency);
        assert_eq!(c.current(), Configuration::new(2, 2));
        // FASTER STILL FITS, THEN DOESN'T
        run(&mut h, &mut c, 220.0, 45.0);
        assert_eq!(c.current(), Configuration::new(2, 1));
        assert_eq!(run(&mut h, &mut c, 240.0, 52.0), Transition::Converge);
        assert_eq!(c.best.unwrap().config(), Configuration::new(2, 2));
    }

    #[test]
    fn decreasing_until_feasible() {
        let mut h = HighestThreads::new();
        let mut c = ctx(Configuration::new(4, 3));
        run(&mut h, &mut c, 300.0, 80.0);
        assert!(c.decreasing);
        run(&mut h, &mut c, 250.0, 60.0);
        assert_eq!(c.threads(), 2);
        run(&mut h, &mut c, 200.0, 45.0);
        assert_eq!(h.phase(), HighestPhase::Frequency);
        assert_eq!(c.current(), Configuration::new(2, 2));
    }

    #[test]
    fn single_thread_over_cap_converges() {
        let mut h = HighestThreads::new();
        let mut c = ctx(Configuration::new(1, 3));
        assert_eq!(run(&mut h, &mut c, 10.0, 90.0), Transition::Converge);
    }
}
