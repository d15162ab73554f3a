// POWERCAP ROUND COLLECTION
// WORKERS COUNT COMMITTED WORK UNITS. THE WORKER WHOSE COMMIT COMPLETES A
// ROUND OF commits_round UNITS IS THE ELECTED COLLECTOR: IT CLOSES THE ROUND
// AND FEEDS THE SAMPLE TO THE GOVERNOR. THE FIRST ROUND IS WARM-UP AND IS
// NEVER REPORTED.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use crate::energy::power_watts;
use crate::search::Sample;
use crate::stats::NetStats;

// GRANULARITY OF THE POWER-CAP ERROR ACCUMULATOR
pub const ERROR_SLOT_NS: u64 = 1_000_000_000;

// NANOSECONDS SINCE THE FIRST CALL. ROUND WINDOWS ONLY EVER SUBTRACT TWO READINGS.
pub fn monotonic_ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

pub struct RoundCollector {
    commits_round: u64,
    commits: AtomicU64,
}

impl RoundCollector {
    pub fn new(commits_round: u64) -> Self {
        Self { commits_round: commits_round.max(1), commits: AtomicU64::new(0) }
    }

    pub fn commits_round(&self) -> u64 {
        self.commits_round
    }

    pub fn total_commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    // COUNT ONE UNIT. TRUE FOR EXACTLY ONE CALLER PER ROUND.
    pub fn commit(&self) -> bool {
        let n = self.commits.fetch_add(1, Ordering::AcqRel) + 1;
        n % self.commits_round == 0
    }
}

// TIME/ENERGY BOOKKEEPING BETWEEN ROUNDS. OWNED BY WHOEVER SERIALIZES
// THE ENGINE (THE GOVERNOR LOCK IN THE BINARY).
#[derive(Clone, Debug)]
pub struct RoundWindow {
    power_limit: f64,
    start_ns: u64,
    start_uj: u64,
    slot_start_ns: u64,
    slot_start_uj: u64,
    warmed_up: bool,
    pub net: NetStats,
}

impl RoundWindow {
    pub fn new(power_limit: f64, now_ns: u64, energy_uj: u64) -> Self {
        Self {
            power_limit,
            start_ns: now_ns,
            start_uj: energy_uj,
            slot_start_ns: now_ns,
            slot_start_uj: energy_uj,
            warmed_up: false,
            net: NetStats::default(),
        }
    }

    // CLOSE THE CURRENT ROUND OF commits UNITS. None FOR THE WARM-UP ROUND.
    // NON-POSITIVE POWER IS STILL REPORTED (THE ENGINE DROPS IT) BUT NEVER
    // COUNTS TOWARD THE NET TOTALS.
    pub fn close(&mut self, now_ns: u64, energy_uj: u64, commits: u64) -> Option<Sample> {
        let elapsed_ns = now_ns.saturating_sub(self.start_ns);
        let power = power_watts(self.start_uj, energy_uj, elapsed_ns);
        let delta_uj = energy_uj.wrapping_sub(self.start_uj);
        self.start_ns = now_ns;
        self.start_uj = energy_uj;

        if !self.warmed_up {
            self.warmed_up = true;
            self.slot_start_ns = now_ns;
            self.slot_start_uj = energy_uj;
            return None;
        }

        let throughput = if elapsed_ns == 0 {
            0.0
        } else {
            commits as f64 / (elapsed_ns as f64 / 1e9)
        };

        if power > 0.0 {
            self.net.record_round(elapsed_ns, delta_uj, commits);
            let slot_ns = now_ns.saturating_sub(self.slot_start_ns);
            if slot_ns >= ERROR_SLOT_NS {
                let slot_power = power_watts(self.slot_start_uj, energy_uj, slot_ns);
                if slot_power > 0.0 {
                    self.net.record_error_slot(slot_power, self.power_limit, slot_ns);
                }
                self.slot_start_ns = now_ns;
                self.slot_start_uj = energy_uj;
            }
        } else {
            // RESYNC THE SLOT AFTER A COUNTER WRAP
            self.slot_start_ns = now_ns;
            self.slot_start_uj = energy_uj;
        }

        Some(Sample::new(throughput, power, elapsed_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SEC: u64 = 1_000_000_000;

    #[test]
    fn clock_never_goes_back() {
        let a = monotonic_ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = monotonic_ns();
        assert!(b >= a + 1_000_000);
    }

    #[test]
    fn exactly_one_collector_per_round() {
        let c = Arc::new(RoundCollector::new(100));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || (0..250).filter(|_| c.commit()).count())
            })
            .collect();
        let elected: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(elected, 10);
        assert_eq!(c.total_commits(), 1000);
    }

    #[test]
    fn first_round_is_warm_up() {
        let mut w = RoundWindow::new(50.0, 0, 0);
        assert!(w.close(SEC, 40_000_000, 1000).is_none());
        let s = w.close(2 * SEC, 80_000_000, 1000).unwrap();
        assert_eq!(s.throughput, 1000.0);
        assert_eq!(s.power, 40.0);
        assert_eq!(s.elapsed_ns, SEC);
        assert_eq!(w.net.commits, 1000);
    }

    #[test]
    fn wrapped_counter_reports_but_does_not_count() {
        let mut w = RoundWindow::new(50.0, 0, 0);
        w.close(SEC, 90_000_000, 10);
        let s = w.close(2 * SEC, 5_000, 10).unwrap();
        assert!(s.power <= 0.0);
        assert_eq!(w.net.commits, 0);
        assert_eq!(w.net.time_ns, 0);
    }

    #[test]
    fn error_accumulates_per_slot() {
        let mut w = RoundWindow::new(50.0, 0, 0);
        w.close(SEC, 0, 10);
        // 60W FOR ONE SECOND: 20% OVER
        w.close(2 * SEC, 60_000_000, 10);
        assert!((w.net.error_pct() - 20.0).abs() < 1e-9);
    }
}
