// POWERCAP CPUFREQ ACTUATION
// USERSPACE GOVERNOR ON EVERY ONLINE CORE, P-STATE CHANGES WRITTEN TO
// scaling_setspeed, BOOST TOGGLED THROUGH cpufreq/boost.
// ROOT IS CONFIGURABLE SO A FAKE TREE CAN STAND IN FOR /sys.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::error::EngineError;
use crate::freq::FrequencyTable;
use crate::governor::Actuator;
use crate::workers::ThreadGate;

pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

// ONLINE CPU IDS FROM <root>/online ("0-3,5"). WITHOUT THAT FILE EVERY cpuN
// DIRECTORY COUNTS AS ONLINE.
pub fn online_cpus(root: &Path) -> Result<Vec<usize>> {
    let online = root.join("online");
    let ids = match std::fs::read_to_string(&online) {
        Ok(text) => parse_cpu_list(&text).with_context(|| format!("parsing {}", online.display()))?,
        Err(_) => scan_cpu_dirs(root)?,
    };
    if ids.is_empty() {
        bail!("no online cpus under {}", root.display());
    }
    Ok(ids)
}

// KERNEL CPU LIST FORMAT: COMMA-SEPARATED IDS AND INCLUSIVE a-b RANGES
pub fn parse_cpu_list(text: &str) -> Result<Vec<usize>> {
    let mut ids = Vec::new();
    for part in text.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().with_context(|| format!("bad cpu range {:?}", part))?;
                let hi: usize = hi.trim().parse().with_context(|| format!("bad cpu range {:?}", part))?;
                if hi < lo {
                    bail!("bad cpu range {:?}", part);
                }
                ids.extend(lo..=hi);
            }
            None => ids.push(part.trim().parse().with_context(|| format!("bad cpu id {:?}", part))?),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn scan_cpu_dirs(root: &Path) -> Result<Vec<usize>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^cpu([0-9]+)$").expect("static regex"));

    let entries = std::fs::read_dir(root)
        .with_context(|| format!("listing {}", root.display()))?;
    let mut ids = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        if let Some(id) = re.captures(&name.to_string_lossy()).and_then(|c| c[1].parse().ok()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

pub struct SysfsCpufreq {
    root: PathBuf,
    cpus: Vec<usize>,
    frequencies: FrequencyTable,
    current: Option<usize>,
}

impl SysfsCpufreq {
    // SWITCH EVERY CORE TO USERSPACE AND LOAD THE P-STATE TABLE. WITHOUT
    // scaling_available_frequencies (INTEL_PSTATE PASSIVE) THE TABLE IS BUILT
    // FROM THE CONFIGURED RANGE.
    pub fn open(root: &Path, cpus: &[usize], range: Option<(u32, u32, bool)>) -> Result<Self> {
        let Some(&first) = cpus.first() else {
            bail!("no online cpus to control");
        };
        for cpu in cpus {
            let path = root.join(format!("cpu{}/cpufreq/scaling_governor", cpu));
            std::fs::write(&path, "userspace")
                .with_context(|| format!("setting userspace governor via {}", path.display()))?;
        }

        let avail = root.join(format!("cpu{}/cpufreq/scaling_available_frequencies", first));
        let frequencies = match std::fs::read_to_string(&avail) {
            Ok(text) => FrequencyTable::parse(&text)
                .with_context(|| format!("parsing {}", avail.display()))?,
            Err(_) => match range {
                Some((min_khz, max_khz, boost_disabled)) if min_khz > 0 && max_khz > 0 => {
                    crate::log_info!(
                        "NO AVAILABLE FREQUENCY LIST, USING {}-{} KHZ RANGE",
                        min_khz, max_khz
                    );
                    FrequencyTable::from_range(min_khz, max_khz, boost_disabled)?
                }
                _ => bail!("{} missing and no MIN/MAX_CPU_FREQ range configured", avail.display()),
            },
        };

        Ok(Self { root: root.to_path_buf(), cpus: cpus.to_vec(), frequencies, current: None })
    }

    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    pub fn frequencies(&self) -> &FrequencyTable {
        &self.frequencies
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn set_pstate(&mut self, pstate: usize) -> Result<()> {
        if self.current == Some(pstate) {
            return Ok(());
        }
        let khz = self.frequencies.khz(pstate).ok_or(EngineError::PstateOutOfRange {
            requested: pstate as i64,
            max: self.frequencies.max_pstate(),
        })?;
        for cpu in &self.cpus {
            let path = self.root.join(format!("cpu{}/cpufreq/scaling_setspeed", cpu));
            std::fs::write(&path, khz.to_string())
                .with_context(|| format!("writing {}", path.display()))?;
        }
        self.current = Some(pstate);
        crate::log_debug!("P-STATE {} ({} KHZ)", pstate, khz);
        Ok(())
    }

    pub fn set_boost(&self, enabled: bool) -> Result<()> {
        let path = self.root.join("cpufreq/boost");
        std::fs::write(&path, if enabled { "1" } else { "0" })
            .with_context(|| format!("writing {}", path.display()))
    }
}

// P-STATES THROUGH CPUFREQ, THREAD COUNT THROUGH THE WORKER GATE
pub struct SysfsActuator {
    pub cpufreq: SysfsCpufreq,
    pub gate: Arc<ThreadGate>,
}

impl Actuator for SysfsActuator {
    fn set_pstate(&mut self, pstate: usize) -> Result<()> {
        self.cpufreq.set_pstate(pstate)
    }

    fn set_threads(&mut self, threads: usize) -> Result<()> {
        self.gate.set_active(threads);
        Ok(())
    }

    fn set_boost(&mut self, enabled: bool) -> Result<()> {
        self.cpufreq.set_boost(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_tree(name: &str, cpus: usize, freqs: Option<&str>) -> PathBuf {
        let root = std::env::temp_dir().join(format!("powercap-cpufreq-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        for cpu in 0..cpus {
            let dir = root.join(format!("cpu{}/cpufreq", cpu));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("scaling_governor"), "schedutil").unwrap();
            std::fs::write(dir.join("scaling_setspeed"), "").unwrap();
        }
        if let Some(f) = freqs {
            std::fs::write(root.join("cpu0/cpufreq/scaling_available_frequencies"), f).unwrap();
        }
        std::fs::create_dir_all(root.join("cpufreq")).unwrap();
        std::fs::create_dir_all(root.join("cpuidle")).unwrap();
        root
    }

    #[test]
    fn scans_cpu_dirs_without_online_file() {
        let root = fake_tree("count", 3, None);
        assert_eq!(online_cpus(&root).unwrap(), vec![0, 1, 2]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn cpu_list_ranges() {
        assert_eq!(parse_cpu_list("0-3,5\n").unwrap(), vec![0, 1, 2, 3, 5]);
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
        assert_eq!(parse_cpu_list("2,0-1").unwrap(), vec![0, 1, 2]);
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("0-x").is_err());
    }

    #[test]
    fn offline_cpu_is_skipped() {
        // cpu2 IS OFFLINE: NO cpufreq SUBTREE
        let root = fake_tree("offline", 2, Some("2400000 1800000 1200000"));
        std::fs::create_dir_all(root.join("cpu2")).unwrap();
        std::fs::write(root.join("online"), "0-1\n").unwrap();

        let cpus = online_cpus(&root).unwrap();
        assert_eq!(cpus, vec![0, 1]);
        let mut c = SysfsCpufreq::open(&root, &cpus, None).unwrap();
        c.set_pstate(2).unwrap();
        assert_eq!(c.cpus(), &[0, 1]);
        assert!(!root.join("cpu2/cpufreq").exists());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn open_sets_userspace_and_reads_table() {
        let root = fake_tree("open", 2, Some("2400000 1800000 1200000\n"));
        let c = SysfsCpufreq::open(&root, &[0, 1], None).unwrap();
        assert_eq!(c.frequencies().max_pstate(), 2);
        let gov = std::fs::read_to_string(root.join("cpu1/cpufreq/scaling_governor")).unwrap();
        assert_eq!(gov, "userspace");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn open_falls_back_to_range() {
        let root = fake_tree("range", 1, None);
        let c = SysfsCpufreq::open(&root, &[0], Some((1_000_000, 1_300_000, false))).unwrap();
        assert_eq!(c.frequencies().khz(0), Some(1_300_000));
        assert!(SysfsCpufreq::open(&root, &[0], None).is_err());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn set_pstate_writes_every_core() {
        let root = fake_tree("setspeed", 2, Some("2400000 1800000 1200000"));
        let mut c = SysfsCpufreq::open(&root, &[0, 1], None).unwrap();
        c.set_pstate(1).unwrap();
        for cpu in 0..2 {
            let v = std::fs::read_to_string(root.join(format!("cpu{}/cpufreq/scaling_setspeed", cpu))).unwrap();
            assert_eq!(v, "1800000");
        }
        assert_eq!(c.current(), Some(1));
        assert!(c.set_pstate(3).is_err());
        c.set_boost(false).unwrap();
        assert_eq!(std::fs::read_to_string(root.join("cpufreq/boost")).unwrap(), "0");
        std::fs::remove_dir_all(&root).unwrap();
    }
}
