// POWERCAP NET STATISTICS
// RUN TOTALS OVER ACCEPTED ROUNDS, THE RESULTS LINE APPENDED AT EXIT, AND THE
// AVERAGING PASS OVER A RESULTS FILE (ONE LINE PER RUN).

use std::sync::OnceLock;

use regex::Regex;

use crate::config::HeuristicMode;
use crate::search::Configuration;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetStats {
    pub time_ns: u64,
    pub energy_uj: u64,
    pub commits: u64,
    // SUM OF error_pct * SECONDS OVER 1-SECOND SLOTS
    pub error_weighted: f64,
    pub error_time_ns: u64,
}

impl NetStats {
    pub fn record_round(&mut self, elapsed_ns: u64, energy_uj: u64, commits: u64) {
        self.time_ns += elapsed_ns;
        self.energy_uj += energy_uj;
        self.commits += commits;
    }

    // OVERSHOOT OF ONE SLOT AS A PERCENTAGE OF THE LIMIT. UNDERSHOOT COUNTS AS 0.
    pub fn record_error_slot(&mut self, slot_power: f64, power_limit: f64, slot_ns: u64) {
        let err = ((slot_power - power_limit).max(0.0) / power_limit) * 100.0;
        self.error_weighted += err * (slot_ns as f64 / 1e9);
        self.error_time_ns += slot_ns;
    }

    pub fn runtime_s(&self) -> f64 {
        self.time_ns as f64 / 1e9
    }

    pub fn throughput(&self) -> f64 {
        if self.time_ns == 0 {
            return 0.0;
        }
        self.commits as f64 / self.runtime_s()
    }

    pub fn power(&self) -> f64 {
        if self.time_ns == 0 {
            return 0.0;
        }
        self.energy_uj as f64 / (self.time_ns as f64 / 1000.0)
    }

    pub fn error_pct(&self) -> f64 {
        if self.error_time_ns == 0 {
            return 0.0;
        }
        self.error_weighted / (self.error_time_ns as f64 / 1e9)
    }

    pub fn summary(&self) -> NetLine {
        NetLine {
            runtime: self.runtime_s(),
            throughput: self.throughput(),
            power: self.power(),
            commits: self.commits as f64,
            error: self.error_pct(),
        }
    }

    pub fn line(&self) -> String {
        self.summary().render()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetLine {
    pub runtime: f64,
    pub throughput: f64,
    pub power: f64,
    pub commits: f64,
    pub error: f64,
}

impl NetLine {
    pub fn render(&self) -> String {
        format!(
            "Net_runtime: {:.6}\tNet_throughput: {:.6}\tNet_power: {:.6}\tNet_commits: {:.0}\tNet_error: {:.6}",
            self.runtime, self.throughput, self.power, self.commits, self.error
        )
    }

    pub fn parse(line: &str) -> Option<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(
                r"Net_runtime:\s*(\S+)\s+Net_throughput:\s*(\S+)\s+Net_power:\s*(\S+)\s+Net_commits:\s*(\S+)\s+Net_error:\s*(\S+)",
            )
            .expect("static regex")
        });
        let cap = re.captures(line)?;
        let num = |i: usize| cap[i].parse::<f64>().ok();
        Some(Self {
            runtime: num(1)?,
            throughput: num(2)?,
            power: num(3)?,
            commits: num(4)?,
            error: num(5)?,
        })
    }
}

// MEAN OF EVERY FIELD OVER ALL PARSEABLE LINES. None WHEN NOTHING PARSED.
pub fn average(text: &str) -> Option<NetLine> {
    let lines: Vec<NetLine> = text.lines().filter_map(NetLine::parse).collect();
    if lines.is_empty() {
        return None;
    }
    let n = lines.len() as f64;
    let sum = lines.iter().fold(NetLine::default(), |acc, l| NetLine {
        runtime: acc.runtime + l.runtime,
        throughput: acc.throughput + l.throughput,
        power: acc.power + l.power,
        commits: acc.commits + l.commits,
        error: acc.error + l.error,
    });
    Some(NetLine {
        runtime: sum.runtime / n,
        throughput: sum.throughput / n,
        power: sum.power / n,
        commits: sum.commits / n,
        error: sum.error / n,
    })
}

// <prog>-<pstate>-<threads>.txt FOR THE FIXED MODE, <prog>-<mode>-<whole watts>.txt OTHERWISE
pub fn results_file_name(prog: &str, heuristic: HeuristicMode, power_limit: f64, fixed: Configuration) -> String {
    match heuristic {
        HeuristicMode::Fixed => format!("{}-{}-{}.txt", prog, fixed.pstate, fixed.threads),
        h => format!("{}-{}-{}.txt", prog, h.code(), power_limit as i64),
    }
}
