use std::path::Path;

use anyhow::{bail, Context, Result};

use powercap::{FrequencyTable, PowercapConfig};

// READ-ONLY: NEVER TOUCHES THE GOVERNOR
pub fn run_pstates(sysfs_root: &Path, config: Option<&Path>) -> Result<()> {
    let avail = sysfs_root.join("devices/system/cpu/cpu0/cpufreq/scaling_available_frequencies");

    let table = match std::fs::read_to_string(&avail) {
        Ok(text) => FrequencyTable::parse(&text)
            .with_context(|| format!("parsing {}", avail.display()))?,
        Err(_) => {
            let Some(path) = config else {
                bail!("{} missing; pass --config for the MIN/MAX_CPU_FREQ range", avail.display());
            };
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let cfg = PowercapConfig::parse(&text)?;
            FrequencyTable::from_range(cfg.min_cpu_freq, cfg.max_cpu_freq, cfg.boost_disabled)?
        }
    };

    println!("{:<8} {:<10} {:<10}", "PSTATE", "KHZ", "MHZ");
    println!("{}", "-".repeat(28));
    for (p, khz) in table.iter() {
        println!("{:<8} {:<10} {:<10.0}", p, khz, khz as f64 / 1000.0);
    }
    println!("MAX P-STATE: {}", table.max_pstate());
    Ok(())
}
