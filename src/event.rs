// POWERCAP ROUND LOG
// ONE ENTRY PER ACCEPTED ROUND: THE CONFIGURATION IT WAS MEASURED AT, WHAT IT
// DELIVERED AND COST, AND WHETHER THE ENGINE CHANGED COURSE ON IT.
// BOUNDED: PAST capacity THE OLDEST ROUNDS ARE DROPPED AND COUNTED.

use std::collections::VecDeque;

use crate::search::{Configuration, Sample};

pub const DEFAULT_CAPACITY: usize = 8192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mark {
    None,
    Converged,
    Restarted,
    BoostDisabled,
    Validated,
}

impl Mark {
    fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Converged => "CONVERGED",
            Self::Restarted => "RESTART",
            Self::BoostDisabled => "BOOST-OFF",
            Self::Validated => "VALIDATED",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundEntry {
    pub round: u64,
    pub at: Configuration,
    pub throughput: f64,
    pub power: f64,
    pub elapsed_ns: u64,
    pub exploring: bool,
    pub mark: Mark,
}

pub struct RoundLog {
    entries: VecDeque<RoundEntry>,
    capacity: usize,
    rounds: u64,
}

impl RoundLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity, rounds: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ROUNDS EVER RECORDED, INCLUDING DROPPED ONES
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn dropped(&self) -> u64 {
        self.rounds - self.entries.len() as u64
    }

    pub fn record(&mut self, at: Configuration, sample: &Sample, exploring: bool, mark: Mark) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.rounds += 1;
        self.entries.push_back(RoundEntry {
            round: self.rounds,
            at,
            throughput: sample.throughput,
            power: sample.power,
            elapsed_ns: sample.elapsed_ns,
            exploring,
            mark,
        });
    }

    // OLDEST FIRST
    pub fn entries(&self) -> impl Iterator<Item = &RoundEntry> {
        self.entries.iter()
    }

    pub fn count_marks(&self, mark: Mark) -> usize {
        self.entries.iter().filter(|e| e.mark == mark).count()
    }

    pub fn dump(&self) {
        if self.entries.is_empty() {
            return;
        }
        println!("\n{:<8} {:<10} {:<8} {:<8} {:<14} {:<10} {:<8} {:<10}",
            "ROUND", "TIME_S", "THREADS", "PSTATE", "THROUGHPUT/S", "POWER_W", "STATE", "EVENT");
        println!("{}", "-".repeat(82));

        // ROUND LENGTHS ADD UP TO WALL TIME SINCE THE FIRST KEPT ROUND
        let mut t_ns = 0u64;
        for e in &self.entries {
            t_ns += e.elapsed_ns;
            println!("{:<8} {:<10.1} {:<8} {:<8} {:<14.1} {:<10.2} {:<8} {:<10}",
                e.round, t_ns as f64 / 1e9, e.at.threads, e.at.pstate, e.throughput, e.power,
                if e.exploring { "EXPLORE" } else { "EXPLOIT" }, e.mark.label());
        }
        if self.dropped() > 0 {
            println!("\n({} EARLIER ROUNDS DROPPED)", self.dropped());
        }
    }

    pub fn summary(&self) {
        if self.entries.len() < 2 {
            return;
        }
        let n = self.entries.len() as f64;
        let exploring = self.entries.iter().filter(|e| e.exploring).count();
        let avg_power = self.entries.iter().map(|e| e.power).sum::<f64>() / n;
        let avg_tp = self.entries.iter().map(|e| e.throughput).sum::<f64>() / n;
        let peak_power = self.entries.iter().map(|e| e.power).fold(0.0, f64::max);
        let elapsed_s = self.entries.iter().map(|e| e.elapsed_ns).sum::<u64>() as f64 / 1e9;

        println!("\n{}", "=".repeat(50));
        println!("POWERCAP SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  ROUNDS:            {} ({} KEPT)", self.rounds, self.entries.len());
        println!("  EXPLORING/EXPLOIT: {} / {}", exploring, self.entries.len() - exploring);
        println!("  CONVERGENCES:      {}", self.count_marks(Mark::Converged));
        println!("  RESTARTS:          {}", self.count_marks(Mark::Restarted));
        println!("  AVG POWER:         {:.2}W (PEAK {:.2}W)", avg_power, peak_power);
        println!("  AVG THROUGHPUT:    {:.1}/s", avg_tp);
        println!("  MEASURED:          {:.1}s", elapsed_s);
    }
}

impl Default for RoundLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(log: &mut RoundLog, threads: usize, mark: Mark) {
        log.record(Configuration::new(threads, 4), &Sample::new(100.0 * threads as f64, 20.0, 1_000_000_000), true, mark);
    }

    #[test]
    fn records_measured_config() {
        let mut log = RoundLog::new();
        assert!(log.is_empty());
        log.record(Configuration::new(4, 2), &Sample::new(1500.0, 42.5, 5), false, Mark::Converged);

        let e = log.entries().next().unwrap();
        assert_eq!(e.round, 1);
        assert_eq!(e.at, Configuration::new(4, 2));
        assert_eq!(e.throughput, 1500.0);
        assert_eq!(e.power, 42.5);
        assert_eq!(e.elapsed_ns, 5);
        assert!(!e.exploring);
    }

    #[test]
    fn oldest_rounds_are_dropped() {
        let mut log = RoundLog::with_capacity(3);
        for t in 1..=5 {
            round(&mut log, t, Mark::None);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.rounds(), 5);
        assert_eq!(log.dropped(), 2);
        let kept: Vec<u64> = log.entries().map(|e| e.round).collect();
        assert_eq!(kept, vec![3, 4, 5]);
    }

    #[test]
    fn marks_are_counted() {
        let mut log = RoundLog::new();
        round(&mut log, 1, Mark::None);
        round(&mut log, 2, Mark::Converged);
        round(&mut log, 2, Mark::Restarted);
        round(&mut log, 2, Mark::Converged);
        assert_eq!(log.count_marks(Mark::Converged), 2);
        assert_eq!(log.count_marks(Mark::Restarted), 1);
    }

    #[test]
    fn dump_and_summary_on_short_logs() {
        let mut log = RoundLog::with_capacity(1);
        log.dump();
        log.summary();
        round(&mut log, 1, Mark::None);
        round(&mut log, 2, Mark::Converged);
        log.dump();
        log.summary();
    }
}
