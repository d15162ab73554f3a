// POWERCAP v1.0.0 -- RUNTIME POWER-CAP CONTROLLER
// THREAD-COUNT AND DVFS SELECTION UNDER A PACKAGE POWER LIMIT
//
// DECISIONS HAPPEN IN THE ENGINE, ONCE PER MEASUREMENT ROUND
// THIS BINARY HANDLES: CONFIGURATION, CPUFREQ/RAPL ACCESS, THE WORKLOAD, REPORTING

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use powercap::HeuristicMode;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "powercap")]
#[command(about = "POWERCAP -- MAXIMUM THROUGHPUT UNDER A POWER LIMIT")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Command {
    // RUN THE CONTROLLER AGAINST THE BUILT-IN WORKLOAD (DEFAULT)
    Run(RunArgs),

    // VERIFY CPUFREQ, RAPL AND KERNEL CONFIG SUPPORT
    Check {
        // SYSFS MOUNT POINT
        #[arg(long, default_value = "/sys")]
        sysfs_root: PathBuf,
    },

    // PRINT THE P-STATE TABLE
    Pstates {
        // SYSFS MOUNT POINT
        #[arg(long, default_value = "/sys")]
        sysfs_root: PathBuf,

        // CONFIG FILE (MIN/MAX_CPU_FREQ FALLBACK RANGE)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    // AVERAGE A RESULTS FILE INTO ONE LINE
    Average {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    // KEY=VALUE CONFIG FILE
    #[arg(long, default_value = "powercap_config.txt")]
    pub config: PathBuf,

    // WORKER THREADS (DEFAULT: ONE PER CPU)
    #[arg(long)]
    pub threads: Option<usize>,

    // OVERRIDE POWER_LIMIT (WATTS)
    #[arg(long)]
    pub power_limit: Option<f64>,

    // OVERRIDE HEURISTIC_MODE (CODE OR NAME, E.G. 9 OR dynamic)
    #[arg(long)]
    pub heuristic: Option<HeuristicMode>,

    // STOP AFTER N SECONDS (DEFAULT: RUN UNTIL CTRL+C)
    #[arg(long)]
    pub duration: Option<u64>,

    // XORSHIFT ROUNDS PER WORK UNIT
    #[arg(long, default_value_t = 20_000)]
    pub work_iters: u64,

    // PROGRAM NAME USED IN THE RESULTS FILE NAME
    #[arg(long, default_value = "powercap")]
    pub name: String,

    // SYSFS MOUNT POINT
    #[arg(long, default_value = "/sys")]
    pub sysfs_root: PathBuf,

    // PRINT VERBOSE OUTPUT
    #[arg(long)]
    pub verbose: bool,

    // DUMP FULL EVENT LOG ON EXIT
    #[arg(long)]
    pub dump_log: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Check { sysfs_root }) => {
            powercap::log::init(false);
            cli::check::run_check(&sysfs_root)
        }
        Some(Command::Pstates { sysfs_root, config }) => {
            powercap::log::init(false);
            cli::pstates::run_pstates(&sysfs_root, config.as_deref())
        }
        Some(Command::Average { input, output }) => cli::average::run_average(&input, &output),
        Some(Command::Run(args)) => start(args),
        None => start(cli.run),
    }
}

fn start(args: RunArgs) -> Result<()> {
    powercap::log::init(args.verbose);

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    cli::run::run_controller(&args, &SHUTDOWN)?;
    println!("POWERCAP OUT.");
    Ok(())
}
