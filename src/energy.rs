// POWERCAP RAPL ENERGY READER
// SUMS intel-rapl:<PKG>/energy_uj OVER EVERY PACKAGE. THE COUNTER WRAPS;
// A ROUND THAT STRADDLES THE WRAP COMES OUT WITH NON-POSITIVE POWER AND THE
// ENGINE DISCARDS IT.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const SYSFS_POWERCAP_ROOT: &str = "/sys/class/powercap";

pub struct RaplReader {
    root: PathBuf,
    packages: usize,
}

impl RaplReader {
    // PACKAGE COUNT = physical_package_id OF THE LAST ONLINE CPU + 1
    pub fn open(powercap_root: &Path, cpu_root: &Path, cpus: &[usize]) -> Result<Self> {
        let last = cpus.last().copied().unwrap_or(0);
        let id_path = cpu_root.join(format!("cpu{}/topology/physical_package_id", last));
        let id: usize = std::fs::read_to_string(&id_path)
            .with_context(|| format!("reading {}", id_path.display()))?
            .trim()
            .parse()
            .with_context(|| format!("parsing {}", id_path.display()))?;

        let reader = Self { root: powercap_root.to_path_buf(), packages: id + 1 };
        // FAIL AT STARTUP, NOT ON THE FIRST ROUND
        reader.energy_uj()?;
        crate::log_info!("RAPL: {} PACKAGE(S)", reader.packages);
        Ok(reader)
    }

    pub fn packages(&self) -> usize {
        self.packages
    }

    pub fn energy_uj(&self) -> Result<u64> {
        let mut total = 0u64;
        for pkg in 0..self.packages {
            let path = self.root.join(format!("intel-rapl:{}/energy_uj", pkg));
            let v: u64 = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?
                .trim()
                .parse()
                .with_context(|| format!("parsing {}", path.display()))?;
            total = total.wrapping_add(v);
        }
        Ok(total)
    }
}

// WATTS FROM AN ENERGY DELTA (UJ) OVER A TIME DELTA (NS). SIGNED SO A WRAPPED
// COUNTER SHOWS UP AS NEGATIVE POWER INSTEAD OF A HUGE ONE.
pub fn power_watts(start_uj: u64, end_uj: u64, elapsed_ns: u64) -> f64 {
    if elapsed_ns == 0 {
        return 0.0;
    }
    let delta_uj = end_uj as i64 - start_uj as i64;
    delta_uj as f64 / (elapsed_ns as f64 / 1000.0)
}
