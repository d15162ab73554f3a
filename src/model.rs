// POWERCAP POWER/THROUGHPUT MODEL
// DENSE [PSTATE][THREADS] TABLES FILLED BY THE BOUNDARY SWEEP (EVERY THREAD
// COUNT AT P-STATE 1 AND AT max_pstate) AND COMPLETED BY CURVE FITS:
//
//   POWER:      p(f) = ALPHA * f^3 + BETA * f + UNCORE
//   THROUGHPUT: t(f) = t_low / ((f_low / f) * C + M),  M = 1 - C
//
// FREQUENCIES IN MHZ. ROW 0 (BOOST) AND COLUMN 0 (ZERO THREADS) ARE NEVER
// FILLED AND NEVER SELECTED. BOUNDARY ROWS KEEP THEIR MEASURED VALUES.

use crate::freq::FrequencyTable;
use crate::search::Configuration;

// P-STATE USED AS THE HIGH-FREQUENCY BOUNDARY. P-STATE 0 IS BOOST AND
// DOESN'T SIT ON THE SAME CURVE.
pub const PSTATE_HIGH: usize = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, pstate: usize, threads: usize) -> f64 {
        if pstate >= self.rows || threads >= self.cols {
            return 0.0;
        }
        self.data[pstate * self.cols + threads]
    }

    pub fn set(&mut self, pstate: usize, threads: usize, value: f64) {
        if pstate < self.rows && threads < self.cols {
            self.data[pstate * self.cols + threads] = value;
        }
    }

    pub fn row(&self, pstate: usize) -> &[f64] {
        &self.data[pstate * self.cols..(pstate + 1) * self.cols]
    }
}

// CUBIC-PLUS-LINEAR POWER CURVE THROUGH TWO MEASURED POINTS
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerCurve {
    pub alpha: f64,
    pub beta: f64,
    pub uncore: f64,
}

impl PowerCurve {
    // pwr_h/pwr_l ARE MEASURED PACKAGE POWER; THE UNCORE OFFSET IS REMOVED
    // BEFORE SOLVING AND ADDED BACK BY predict(). None IF THE SYSTEM IS SINGULAR.
    pub fn fit(pwr_h: f64, freq_h: f64, pwr_l: f64, freq_l: f64, uncore: f64) -> Option<Self> {
        let ph = pwr_h - uncore;
        let pl = pwr_l - uncore;
        let fh3 = freq_h.powi(3);
        let fl3 = freq_l.powi(3);

        let alpha_den = freq_h * fl3 - fh3 * freq_l;
        let beta_den = fh3 * freq_l - freq_h * fl3;
        if alpha_den == 0.0 || beta_den == 0.0 {
            return None;
        }
        let alpha = (pl * freq_h - ph * freq_l) / alpha_den;
        let beta = (pl * fh3 - ph * fl3) / beta_den;
        if !alpha.is_finite() || !beta.is_finite() {
            return None;
        }
        Some(Self { alpha, beta, uncore })
    }

    pub fn predict(&self, freq: f64) -> f64 {
        self.alpha * freq.powi(3) + self.beta * freq + self.uncore
    }
}

// AMDAHL-STYLE EXTRAPOLATION IN THE FREQUENCY DOMAIN. C IS THE SHARE OF
// RUNTIME THAT SCALES WITH FREQUENCY, M THE SHARE THAT DOESN'T.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThroughputCurve {
    pub c: f64,
    pub m: f64,
    tp_low: f64,
    freq_low: f64,
}

impl ThroughputCurve {
    pub fn fit(tp_h: f64, freq_h: f64, tp_l: f64, freq_l: f64) -> Option<Self> {
        if !(tp_l > 0.0) || freq_h == freq_l || !(freq_l > 0.0) {
            return None;
        }
        let speedup = tp_h / tp_l;
        // IDENTICAL BOUNDARY SAMPLES (speedup == 1) OR NOTHING COMPLETED AT
        // HIGH FREQUENCY (speedup == 0): NO CURVE TO FIT
        if !(speedup > 0.0) || !speedup.is_finite() || speedup == 1.0 {
            return None;
        }
        let c = freq_h * (1.0 - speedup) / (speedup * (freq_l - freq_h));
        if !c.is_finite() {
            return None;
        }
        Some(Self { c, m: 1.0 - c, tp_low: tp_l, freq_low: freq_l })
    }

    pub fn predict(&self, freq: f64) -> f64 {
        self.tp_low / ((self.freq_low / freq) * self.c + self.m)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FitReport {
    // THREAD COUNTS WHOSE CURVES COULD NOT BE FIT; THEIR ROWS KEEP OLD VALUES
    pub skipped_power: Vec<usize>,
    pub skipped_throughput: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub config: Configuration,
    pub throughput: f64,
    pub power: f64,
}

#[derive(Clone, Debug)]
pub struct ModelTables {
    max_pstate: usize,
    total_threads: usize,
    pub power: Matrix,
    pub throughput: Matrix,
}

impl ModelTables {
    pub fn new(max_pstate: usize, total_threads: usize) -> Self {
        Self {
            max_pstate,
            total_threads,
            power: Matrix::new(max_pstate + 1, total_threads + 1),
            throughput: Matrix::new(max_pstate + 1, total_threads + 1),
        }
    }

    pub fn record(&mut self, at: Configuration, power: f64, throughput: f64) {
        self.power.set(at.pstate, at.threads, power);
        self.throughput.set(at.pstate, at.threads, throughput);
    }

    // FILL EVERY INTERMEDIATE P-STATE (2..max_pstate) FROM THE BOUNDARY ROWS
    pub fn fit(&mut self, freqs: &FrequencyTable, uncore: f64) -> FitReport {
        let mut report = FitReport::default();
        let low = self.max_pstate;
        let (Some(freq_h), Some(freq_l)) = (freqs.mhz(PSTATE_HIGH), freqs.mhz(low)) else {
            return report;
        };

        for t in 1..=self.total_threads {
            let power = PowerCurve::fit(
                self.power.get(PSTATE_HIGH, t),
                freq_h,
                self.power.get(low, t),
                freq_l,
                uncore,
            );
            match power {
                Some(curve) => {
                    for p in PSTATE_HIGH + 1..low {
                        if let Some(f) = freqs.mhz(p) {
                            self.power.set(p, t, curve.predict(f));
                        }
                    }
                }
                None => {
                    crate::log_warn!("POWER MODEL: DEGENERATE FIT FOR {} THREADS, SKIPPED", t);
                    report.skipped_power.push(t);
                }
            }

            let tp = ThroughputCurve::fit(
                self.throughput.get(PSTATE_HIGH, t),
                freq_h,
                self.throughput.get(low, t),
                freq_l,
            );
            match tp {
                Some(curve) => {
                    for p in PSTATE_HIGH + 1..low {
                        if let Some(f) = freqs.mhz(p) {
                            self.throughput.set(p, t, curve.predict(f));
                        }
                    }
                }
                None => {
                    crate::log_warn!("THROUGHPUT MODEL: DEGENERATE FIT FOR {} THREADS, SKIPPED", t);
                    report.skipped_throughput.push(t);
                }
            }
        }
        report
    }

    // HIGHEST PREDICTED THROUGHPUT WITH PREDICTED POWER STRICTLY UNDER THE
    // LIMIT. THE SCAN STARTS FROM (1 THREAD, SLOWEST P-STATE), WHICH IS ALSO
    // THE FALLBACK WHEN NOTHING FITS.
    pub fn select(&self, power_limit: f64) -> Selection {
        let low = self.max_pstate;
        let mut best = Selection {
            config: Configuration::new(1, low),
            throughput: self.throughput.get(low, 1),
            power: self.power.get(low, 1),
        };
        for p in PSTATE_HIGH..=low {
            for t in 1..=self.total_threads {
                let tp = self.throughput.get(p, t);
                let pw = self.power.get(p, t);
                if tp > best.throughput && pw < power_limit {
                    best = Selection { config: Configuration::new(t, p), throughput: tp, power: pw };
                }
            }
        }
        best
    }
}
