// POWERCAP MODEL-BASED SELECTION
// BOUNDARY SWEEP: EVERY THREAD COUNT AT THE SLOWEST P-STATE, THEN EVERY
// THREAD COUNT AT P-STATE 1. AT (total_threads, 1) FIT THE CURVES, PICK THE
// BEST PREDICTED CONFIGURATION UNDER THE CAP AND CONVERGE.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::freq::FrequencyTable;
use crate::model::{ModelTables, PSTATE_HIGH};
use crate::search::{BestConfig, Configuration, Sample, SearchContext};

use super::Transition;

#[derive(Clone, Debug)]
pub struct ModelSearch {
    tables: ModelTables,
    frequencies: FrequencyTable,
    uncore: f64,
}

impl ModelSearch {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            tables: ModelTables::new(cfg.max_pstate(), cfg.total_threads),
            frequencies: cfg.frequencies.clone(),
            uncore: cfg.power_uncore,
        }
    }

    pub fn tables(&self) -> &ModelTables {
        &self.tables
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        let at = ctx.current();
        self.tables.record(at, sample.power, sample.throughput);

        let total = ctx.total_threads();
        if at.threads == total && at.pstate == PSTATE_HIGH {
            let report = self.tables.fit(&self.frequencies, self.uncore);
            if !report.skipped_power.is_empty() || !report.skipped_throughput.is_empty() {
                crate::log_warn!(
                    "MODEL: {} POWER / {} THROUGHPUT FITS SKIPPED",
                    report.skipped_power.len(),
                    report.skipped_throughput.len()
                );
            }
            let sel = self.tables.select(ctx.power_limit());
            ctx.best = Some(BestConfig {
                throughput: sel.throughput,
                threads: sel.config.threads,
                pstate: sel.config.pstate,
                power: sel.power,
            });
            crate::log_debug!(
                "MODEL: PREDICTED {:.1}/s AT {:.1}W -> {} THREADS P-STATE {}",
                sel.throughput, sel.power, sel.config.threads, sel.config.pstate
            );
            return Ok(Transition::Converge);
        }

        if at.threads < total {
            ctx.add_thread()?;
        } else {
            ctx.set_config(Configuration::new(1, PSTATE_HIGH))?;
        }
        Ok(Transition::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeuristicMode;

    #[test]
    fn sweep_visits_both_boundary_rows() {
        let freqs = FrequencyTable::parse("3100000 3000000 2500000 2000000 1500000 1000000").unwrap();
        let cfg = EngineConfig::new(60.0, 3, freqs, HeuristicMode::Model);
        let mut m = ModelSearch::new(&cfg);
        let mut c = SearchContext::new(&cfg, Configuration::new(1, 5));

        let mut visited = Vec::new();
        loop {
            let at = c.current();
            visited.push(at);
            let s = Sample::new(100.0 * at.threads as f64, 10.0 + 5.0 * at.threads as f64, 0);
            if m.step(&mut c, &s).unwrap() == Transition::Converge {
                break;
            }
        }
        assert_eq!(
            visited,
            vec![
                Configuration::new(1, 5),
                Configuration::new(2, 5),
                Configuration::new(3, 5),
                Configuration::new(1, 1),
                Configuration::new(2, 1),
                Configuration::new(3, 1),
            ]
        );
        assert_eq!(m.tables().power.get(5, 3), 25.0);
        assert!(c.best.is_some());
    }
}
