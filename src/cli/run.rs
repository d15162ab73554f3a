// POWERCAP CONTROLLER RUN
// CONFIG -> CPUFREQ/RAPL -> ENGINE -> GOVERNOR, THEN N CPU-BOUND WORKERS
// COMMITTING WORK UNITS. THE WORKER THAT COMPLETES A ROUND FEEDS IT TO THE
// GOVERNOR UNDER THE CONTROL LOCK. THE MAIN THREAD PRINTS STATUS ONCE A SECOND.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use powercap::cpufreq::{online_cpus, SysfsActuator, SysfsCpufreq};
use powercap::energy::RaplReader;
use powercap::governor::Governor;
use powercap::round::{monotonic_ns, RoundCollector, RoundWindow};
use powercap::stats::results_file_name;
use powercap::workers::{StartupBarrier, ThreadGate};
use powercap::{Configuration, Engine, PowercapConfig, Sample};

use crate::RunArgs;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const TICK: Duration = Duration::from_millis(100);
const VALIDATION_REPORT: &str = "model_validation.txt";

struct Control {
    governor: Governor<SysfsActuator>,
    window: RoundWindow,
    last: Option<Sample>,
}

struct Runtime<'a> {
    control: Mutex<Control>,
    collector: RoundCollector,
    rapl: RaplReader,
    gate: &'a ThreadGate,
    barrier: StartupBarrier,
    shutdown: &'a AtomicBool,
    work_iters: u64,
}

pub fn run_controller(args: &RunArgs, shutdown: &AtomicBool) -> Result<()> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let mut file_cfg = PowercapConfig::parse(&text)?;
    if let Some(limit) = args.power_limit {
        file_cfg.power_limit = limit;
    }
    if let Some(h) = args.heuristic {
        file_cfg.heuristic = h;
    }

    // DETECT TOPOLOGY
    let cpu_root = args.sysfs_root.join("devices/system/cpu");
    let cpus = online_cpus(&cpu_root)?;
    let total_threads = args.threads.unwrap_or(cpus.len());

    let range = (file_cfg.min_cpu_freq, file_cfg.max_cpu_freq, file_cfg.boost_disabled);
    let cpufreq = SysfsCpufreq::open(&cpu_root, &cpus, Some(range))?;
    if let Err(e) = cpufreq.set_boost(!file_cfg.boost_disabled) {
        powercap::log_warn!("BOOST NOT CONFIGURABLE: {:#}", e);
    }

    let engine_cfg = file_cfg.engine_config(total_threads, cpufreq.frequencies().clone())?;
    let heuristic = engine_cfg.heuristic;
    let fixed = Configuration::new(engine_cfg.starting_threads, engine_cfg.static_pstate);
    let engine = Engine::new(engine_cfg)?;
    let rapl = RaplReader::open(&args.sysfs_root.join("class/powercap"), &cpu_root, &cpus)?;

    println!("POWERCAP v1.0.0");
    println!("CPUS:            {} ONLINE (workers: {})", cpus.len(), total_threads);
    println!("P-STATES:        {} ({} - {} KHZ)",
             cpufreq.frequencies().len(),
             cpufreq.frequencies().khz(0).unwrap_or(0),
             cpufreq.frequencies().khz(cpufreq.frequencies().max_pstate()).unwrap_or(0));
    println!("POWER LIMIT:     {:.1} W", file_cfg.power_limit);
    println!("HEURISTIC:       {} ({})", heuristic.label(), heuristic.code());
    println!("DETECTION:       {:?}", file_cfg.detection);
    println!("COMMITS/ROUND:   {}", file_cfg.commits_round);
    println!("CORE PACKING:    {}", file_cfg.core_packing);
    println!();

    // THE ACTUATOR WRITES THE ACTIVE COUNT, THE WORKERS READ IT
    let gate = Arc::new(ThreadGate::new(total_threads, engine.current().threads, file_cfg.core_packing));
    let governor = Governor::new(engine, SysfsActuator { cpufreq, gate: Arc::clone(&gate) })?
        .with_report_path(PathBuf::from(VALIDATION_REPORT));
    let window = RoundWindow::new(file_cfg.power_limit, monotonic_ns(), rapl.energy_uj()?);

    let rt = Runtime {
        control: Mutex::new(Control { governor, window, last: None }),
        collector: RoundCollector::new(file_cfg.commits_round),
        rapl,
        gate: &*gate,
        barrier: StartupBarrier::new(total_threads + 1),
        shutdown,
        work_iters: args.work_iters,
    };

    println!("POWERCAP IS ACTIVE (CTRL+C TO EXIT)");
    let outcome = std::thread::scope(|s| {
        let handles: Vec<_> = (0..total_threads)
            .map(|idx| {
                let rt = &rt;
                s.spawn(move || {
                    let res = worker(idx, rt);
                    if res.is_err() {
                        rt.shutdown.store(true, Ordering::Relaxed);
                    }
                    res
                })
            })
            .collect();

        let mut first_err = monitor(&rt, args.duration).err();
        rt.shutdown.store(true, Ordering::Relaxed);
        for h in handles {
            let res = h.join().unwrap_or_else(|_| Err(anyhow!("worker panicked")));
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    });
    println!("POWERCAP IS SHUTTING DOWN");

    let control = rt.control.into_inner().unwrap_or_else(|e| e.into_inner());
    let net = &control.window.net;
    println!("{}", net.line());

    let path = results_file_name(&args.name, heuristic, file_cfg.power_limit, fixed);
    let mut out = OpenOptions::new().create(true).append(true).open(&path)
        .with_context(|| format!("opening {}", path))?;
    writeln!(out, "{}", net.line()).with_context(|| format!("writing {}", path))?;

    if args.dump_log {
        control.governor.log.dump();
    }
    control.governor.log.summary();

    outcome
}

fn worker(idx: usize, rt: &Runtime<'_>) -> Result<()> {
    rt.barrier.wait(STARTUP_TIMEOUT)?;
    let mut seen = 0;
    let mut x = idx as u64 + 0x9e37_79b9_7f4a_7c15;

    while rt.gate.wait_turn(idx, &mut seen, rt.shutdown) {
        x = work_unit(x, rt.work_iters);
        if !rt.collector.commit() {
            continue;
        }
        let mut control = rt.control.lock().unwrap_or_else(|e| e.into_inner());
        let energy = rt.rapl.energy_uj()?;
        let sample = control.window.close(monotonic_ns(), energy, rt.collector.commits_round());
        if let Some(sample) = sample {
            control.last = Some(sample);
            control.governor.on_round(sample)?;
        }
    }
    std::hint::black_box(x);
    Ok(())
}

// ONE WORK UNIT: XORSHIFT ROUNDS, CPU-BOUND, NO MEMORY TRAFFIC
fn work_unit(mut x: u64, iters: u64) -> u64 {
    for _ in 0..iters {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
    }
    std::hint::black_box(x)
}

fn monitor(rt: &Runtime<'_>, duration: Option<u64>) -> Result<()> {
    rt.barrier.wait(STARTUP_TIMEOUT)?;
    let start = Instant::now();
    let mut ticks = 0u64;

    while !rt.shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(TICK);
        ticks += 1;
        if let Some(secs) = duration {
            if start.elapsed() >= Duration::from_secs(secs) {
                break;
            }
        }
        if ticks % 10 != 0 {
            continue;
        }

        let control = rt.control.lock().unwrap_or_else(|e| e.into_inner());
        let applied = control.governor.applied();
        let engine = control.governor.engine();
        let mhz = engine.config().frequencies.mhz(applied.pstate).unwrap_or(0.0);
        let state = if engine.is_exploring() { "EXPLORE" } else { "EXPLOIT" };
        match control.last {
            Some(s) => println!(
                "[{:>5}s] threads: {:<3} pstate: {:<2} ({:>6.0} MHz) power: {:>6.2}W tp: {:>10.1}/s [{}]",
                start.elapsed().as_secs(), applied.threads, applied.pstate, mhz,
                s.power, s.throughput, state
            ),
            None => println!(
                "[{:>5}s] threads: {:<3} pstate: {:<2} ({:>6.0} MHz) WARMING UP",
                start.elapsed().as_secs(), applied.threads, applied.pstate, mhz
            ),
        }
    }
    Ok(())
}
