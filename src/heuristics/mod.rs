// POWERCAP SEARCH STRATEGIES
// ONE VARIANT PER HEURISTIC MODE. EACH OWNS ITS OWN PHASE ENUM AND SUB-STATE;
// ALL OF THEM SHARE THE SearchContext PRIMITIVES.
//
// CONTRACT: step() CONSUMES ONE SAMPLE TAKEN AT ctx.current() AND EITHER
// LEAVES THE NEXT CONFIGURATION IN ctx (Continue) OR ASKS THE ENGINE TO
// FREEZE THE BEST CONFIGURATION (Converge). THE ENGINE OWNS stop_searching().

pub mod binary;
pub mod dynamic;
pub mod highest;
pub mod model_based;
pub mod two_step;

pub use binary::BinarySearch;
pub use dynamic::{DynamicSearch, ThreadDiscovery};
pub use highest::HighestThreads;
pub use model_based::ModelSearch;
pub use two_step::{TwoStep, TwoStepStateful};

use crate::config::{EngineConfig, HeuristicMode};
use crate::error::EngineError;
use crate::model::ModelTables;
use crate::search::{BestConfig, Sample, SearchContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Continue,
    Converge,
}

#[derive(Clone, Debug)]
pub enum Strategy {
    Fixed,
    Dynamic(DynamicSearch),
    HighestThreads(HighestThreads),
    BinarySearch(BinarySearch),
    TwoStep(TwoStep),
    TwoStepStateful(TwoStepStateful),
    Model(ModelSearch),
}

impl Strategy {
    pub fn for_config(cfg: &EngineConfig) -> Self {
        match cfg.heuristic {
            HeuristicMode::Fixed => Self::Fixed,
            HeuristicMode::Dynamic => Self::Dynamic(DynamicSearch::new()),
            HeuristicMode::HighestThreads => Self::HighestThreads(HighestThreads::new()),
            HeuristicMode::BinarySearch => Self::BinarySearch(BinarySearch::new(cfg.total_threads, cfg.max_pstate())),
            HeuristicMode::TwoStep => Self::TwoStep(TwoStep::new()),
            HeuristicMode::TwoStepStateful => Self::TwoStepStateful(TwoStepStateful::new()),
            HeuristicMode::Model => Self::Model(ModelSearch::new(cfg)),
        }
    }

    pub fn step(&mut self, ctx: &mut SearchContext, sample: &Sample) -> Result<Transition, EngineError> {
        match self {
            // STATIC CONFIGURATION: THE SEED IS THE ANSWER
            Self::Fixed => {
                let cur = ctx.current();
                ctx.best = Some(BestConfig {
                    throughput: sample.throughput,
                    threads: cur.threads,
                    pstate: cur.pstate,
                    power: sample.power,
                });
                Ok(Transition::Converge)
            }
            Self::Dynamic(s) => s.step(ctx, sample),
            Self::HighestThreads(s) => s.step(ctx, sample),
            Self::BinarySearch(s) => s.step(ctx, sample),
            Self::TwoStep(s) => s.step(ctx, sample),
            Self::TwoStepStateful(s) => s.step(ctx, sample),
            Self::Model(s) => s.step(ctx, sample),
        }
    }

    // BACK TO THE FIRST PHASE WITH EVERY CARRIED FIELD AT ITS SENTINEL.
    // CALLED ON CONVERGENCE AND ON RESTART. MODEL TABLES SURVIVE.
    pub fn reset(&mut self) {
        match self {
            Self::Fixed => {}
            Self::Dynamic(s) => s.reset(),
            Self::HighestThreads(s) => s.reset(),
            Self::BinarySearch(s) => s.reset(),
            Self::TwoStep(s) => s.reset(),
            Self::TwoStepStateful(s) => s.reset(),
            Self::Model(_) => {}
        }
    }

    pub fn phase_label(&self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::Dynamic(s) => s.phase().label(),
            Self::HighestThreads(s) => s.phase().label(),
            Self::BinarySearch(s) => s.phase().label(),
            Self::TwoStep(s) => s.phase().label(),
            Self::TwoStepStateful(s) => s.phase().label(),
            Self::Model(_) => "SWEEP",
        }
    }

    pub fn model(&self) -> Option<&ModelTables> {
        match self {
            Self::Model(s) => Some(s.tables()),
            _ => None,
        }
    }
}
