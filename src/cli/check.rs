use std::io::Read;
use std::path::Path;

use anyhow::Result;

const KERNEL_OPTIONS: [&str; 2] = ["CONFIG_CPU_FREQ_GOV_USERSPACE", "CONFIG_INTEL_RAPL"];

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }

    let mut ok = true;
    for opt in KERNEL_OPTIONS {
        // BUILT-IN OR MODULE BOTH WORK
        let found = config.lines().any(|l| l == format!("{}=y", opt) || l == format!("{}=m", opt));
        if found {
            println!("  {:<30}OK", opt);
        } else {
            println!("  {:<30}NOT FOUND", opt);
            ok = false;
        }
    }
    ok
}

fn check_file(label: &str, path: &Path, want: Option<&str>) -> bool {
    match std::fs::read_to_string(path) {
        Ok(text) => match want {
            Some(w) if !text.split_whitespace().any(|t| t == w) => {
                println!("  {:<30}MISSING {} ({})", label, w, text.trim());
                false
            }
            _ => {
                println!("  {:<30}OK", label);
                true
            }
        },
        Err(_) => {
            println!("  {:<30}NOT AVAILABLE ({})", label, path.display());
            false
        }
    }
}

pub fn run_check(sysfs_root: &Path) -> Result<()> {
    println!("POWERCAP DEPENDENCY CHECK");
    println!();

    let cpu = sysfs_root.join("devices/system/cpu");
    let mut ok = true;

    println!("CPUFREQ:");
    ok &= check_file(
        "userspace governor",
        &cpu.join("cpu0/cpufreq/scaling_available_governors"),
        Some("userspace"),
    );
    ok &= check_file("scaling_setspeed", &cpu.join("cpu0/cpufreq/scaling_setspeed"), None);
    if !check_file("available frequencies", &cpu.join("cpu0/cpufreq/scaling_available_frequencies"), None) {
        println!("  (MIN_CPU_FREQ/MAX_CPU_FREQ RANGE REQUIRED)");
    }
    // BOOST IS OPTIONAL: THE CONTROLLER RUNS WITHOUT IT
    check_file("boost", &cpu.join("cpufreq/boost"), None);
    println!();

    println!("RAPL:");
    ok &= check_file(
        "package energy counter",
        &sysfs_root.join("class/powercap/intel-rapl:0/energy_uj"),
        None,
    );
    println!();

    println!("KERNEL CONFIG:");
    if !check_kernel_config() {
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        println!("  RUN AS ROOT, WITH intel_pstate=passive OR acpi-cpufreq");
        std::process::exit(1);
    }

    Ok(())
}
