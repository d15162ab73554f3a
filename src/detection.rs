// POWERCAP RESTART / DETECTION CONTROLLER
// RUNS ONLY WHILE EXPLOITING (stopped_searching). TWO MODES:
//
//   RESTART   COUNT SAMPLES SINCE CONVERGENCE; AT exploit_steps RE-ENTER
//             EXPLORATION FROM A STRATEGY-DEPENDENT SEED. ALSO DROPS OFF
//             BOOST WHEN P-STATE 0 OVERSHOOTS THE CAP.
//   VALIDATE  MODEL STRATEGY ONLY. MEASURE EVERY INTERMEDIATE CELL THE MODEL
//             PREDICTED, P-STATE BY P-STATE FROM max-1 DOWN TO 2, THEN EMIT
//             A REAL-VS-PREDICTED REPORT AND GO QUIET.

use std::fmt::Write as _;

use crate::config::{DetectionMode, EngineConfig, HeuristicMode};
use crate::error::EngineError;
use crate::heuristics::Strategy;
use crate::model::Matrix;
use crate::search::{Configuration, Sample, SearchContext};

// BOOST OVERSHOOT TOLERANCE: 1% ABOVE THE LIMIT
pub const BOOST_TOLERANCE: f64 = 1.01;

// LOWEST P-STATE THE VALIDATION SWEEP MEASURES
pub const VALIDATION_FLOOR: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub enum DetectorEvent {
    BoostDisabled,
    Restarted { seed: Configuration },
    ValidationComplete(Box<ValidationReport>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationReport {
    pub max_pstate: usize,
    pub total_threads: usize,
    pub real_throughput: Matrix,
    pub predicted_throughput: Matrix,
    pub throughput_error: Matrix,
    pub real_power: Matrix,
    pub predicted_power: Matrix,
    pub power_error: Matrix,
}

impl ValidationReport {
    fn build(shadow: &Shadow, max_pstate: usize, total_threads: usize) -> Self {
        let rows = max_pstate + 1;
        let cols = total_threads + 1;
        let mut throughput_error = Matrix::new(rows, cols);
        let mut power_error = Matrix::new(rows, cols);
        for p in VALIDATION_FLOOR..max_pstate {
            for t in 1..=total_threads {
                throughput_error.set(p, t, error_pct(shadow.tp_pred.get(p, t), shadow.tp_real.get(p, t)));
                power_error.set(p, t, error_pct(shadow.power_pred.get(p, t), shadow.power_real.get(p, t)));
            }
        }
        Self {
            max_pstate,
            total_threads,
            real_throughput: shadow.tp_real.clone(),
            predicted_throughput: shadow.tp_pred.clone(),
            throughput_error,
            real_power: shadow.power_real.clone(),
            predicted_power: shadow.power_pred.clone(),
            power_error,
        }
    }

    // model_validation.txt LAYOUT: SIX SECTIONS, ONE ROW PER INTERMEDIATE
    // P-STATE, TAB-SEPARATED COLUMNS FOR THREADS 1..total
    pub fn render(&self) -> String {
        let sections: [(&str, &Matrix); 6] = [
            ("Real throughput", &self.real_throughput),
            ("Predicted throughput", &self.predicted_throughput),
            ("Throughput error percentage", &self.throughput_error),
            ("Real power", &self.real_power),
            ("Predicted power", &self.predicted_power),
            ("power error percentage", &self.power_error),
        ];
        let mut out = String::new();
        for (title, m) in sections {
            let _ = writeln!(out, "{}", title);
            for p in VALIDATION_FLOOR..self.max_pstate {
                let row: Vec<String> = (1..=self.total_threads).map(|t| format!("{:.6}", m.get(p, t))).collect();
                let _ = writeln!(out, "{}", row.join("\t"));
            }
            out.push('\n');
        }
        out
    }
}

// 100 * (PREDICTED - REAL) / REAL. A ZERO MEASUREMENT HAS NO MEANINGFUL ERROR.
pub fn error_pct(predicted: f64, real: f64) -> f64 {
    if real == 0.0 {
        return 0.0;
    }
    100.0 * (predicted - real) / real
}

#[derive(Clone, Debug)]
struct Shadow {
    power_real: Matrix,
    tp_real: Matrix,
    power_pred: Matrix,
    tp_pred: Matrix,
}

impl Shadow {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            power_real: Matrix::new(rows, cols),
            tp_real: Matrix::new(rows, cols),
            power_pred: Matrix::new(rows, cols),
            tp_pred: Matrix::new(rows, cols),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Detector {
    mode: DetectionMode,
    heuristic: HeuristicMode,
    exploit_steps: u32,
    starting_threads: usize,
    power_limit: f64,
    max_pstate: usize,
    total_threads: usize,
    validation_pstate: usize,
    shadow: Option<Shadow>,
}

impl Detector {
    pub fn new(cfg: &EngineConfig) -> Self {
        let max_pstate = cfg.max_pstate();
        let shadow = (cfg.detection == DetectionMode::Validate)
            .then(|| Shadow::new(max_pstate + 1, cfg.total_threads + 1));
        Self {
            mode: cfg.detection,
            heuristic: cfg.heuristic,
            exploit_steps: cfg.exploit_steps,
            starting_threads: cfg.starting_threads,
            power_limit: cfg.power_limit,
            max_pstate,
            total_threads: cfg.total_threads,
            validation_pstate: max_pstate.saturating_sub(1),
            shadow,
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    // WHERE stop_searching() SENDS THE NEXT REQUEST WHILE VALIDATING
    pub fn validation_target(&self) -> Option<usize> {
        (self.mode == DetectionMode::Validate).then_some(self.validation_pstate)
    }

    pub fn observe(
        &mut self,
        ctx: &mut SearchContext,
        strategy: &mut Strategy,
        sample: &Sample,
    ) -> Result<Vec<DetectorEvent>, EngineError> {
        match self.mode {
            DetectionMode::Disabled => Ok(Vec::new()),
            DetectionMode::Restart => self.restart_step(ctx, strategy, sample),
            DetectionMode::Validate => self.validate_step(ctx, strategy, sample),
        }
    }

    fn restart_step(
        &mut self,
        ctx: &mut SearchContext,
        strategy: &mut Strategy,
        sample: &Sample,
    ) -> Result<Vec<DetectorEvent>, EngineError> {
        let mut events = Vec::new();

        if ctx.pstate() == 0 && self.max_pstate >= 1 && sample.power > self.power_limit * BOOST_TOLERANCE {
            ctx.set_pstate(1)?;
            crate::log_info!("BOOST OVERSHOOT AT {:.1}W, DISABLING BOOST", sample.power);
            events.push(DetectorEvent::BoostDisabled);
        }

        ctx.current_exploit_steps += 1;
        if ctx.current_exploit_steps < self.exploit_steps {
            return Ok(events);
        }

        let seed = match self.heuristic {
            HeuristicMode::HighestThreads => Configuration::new(self.starting_threads, self.max_pstate),
            h if h.starts_from_floor() => Configuration::new(1, self.max_pstate),
            _ => {
                let c = ctx.converged.unwrap_or_else(|| ctx.current());
                ctx.starting_threads = c.threads;
                c
            }
        };
        ctx.restart(seed)?;
        strategy.reset();
        crate::log_info!(
            "RESTARTING EXPLORATION FROM {} THREADS P-STATE {}",
            seed.threads, seed.pstate
        );
        events.push(DetectorEvent::Restarted { seed });
        Ok(events)
    }

    fn validate_step(
        &mut self,
        ctx: &mut SearchContext,
        strategy: &mut Strategy,
        sample: &Sample,
    ) -> Result<Vec<DetectorEvent>, EngineError> {
        let at = ctx.current();
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.power_real.set(at.pstate, at.threads, sample.power);
            shadow.tp_real.set(at.pstate, at.threads, sample.throughput);
            if let Some(model) = strategy.model() {
                shadow.power_pred.set(at.pstate, at.threads, model.power.get(at.pstate, at.threads));
                shadow.tp_pred.set(at.pstate, at.threads, model.throughput.get(at.pstate, at.threads));
            }
        }

        if at.pstate == VALIDATION_FLOOR && at.threads == self.total_threads {
            self.mode = DetectionMode::Disabled;
            let Some(shadow) = self.shadow.take() else {
                return Ok(Vec::new());
            };
            let report = ValidationReport::build(&shadow, self.max_pstate, self.total_threads);
            crate::log_info!("MODEL VALIDATION COMPLETE");
            return Ok(vec![DetectorEvent::ValidationComplete(Box::new(report))]);
        }

        if at.threads == self.total_threads {
            self.validation_pstate = self.validation_pstate.saturating_sub(1).max(VALIDATION_FLOOR);
            ctx.restart(Configuration::new(1, self.max_pstate))?;
            strategy.reset();
            crate::log_debug!("VALIDATION: RE-SAMPLING, NEXT ROW P-STATE {}", self.validation_pstate);
            return Ok(Vec::new());
        }

        ctx.add_thread()?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_pct_signs() {
        assert_eq!(error_pct(110.0, 100.0), 10.0);
        assert_eq!(error_pct(90.0, 100.0), -10.0);
        assert_eq!(error_pct(5.0, 0.0), 0.0);
    }

    #[test]
    fn render_has_six_sections() {
        let shadow = Shadow::new(5, 3);
        let mut report = ValidationReport::build(&shadow, 4, 2);
        report.real_power.set(2, 1, 61.5);
        let text = report.render();
        assert!(text.starts_with("Real throughput\n"));
        assert!(text.contains("power error percentage\n"));
        assert!(text.contains("Real power\n61.500000\t0.000000\n"));
        // TWO INTERMEDIATE ROWS (P-STATES 2 AND 3) PER SECTION, ONE CELL SET
        assert_eq!(text.lines().filter(|l| *l == "0.000000\t0.000000").count(), 11);
    }
}
