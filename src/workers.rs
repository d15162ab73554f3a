// POWERCAP WORKER GATING
// THREAD-COUNT ACTUATION FOR THE HOST WORKLOAD. WORKERS WITH INDEX >= ACTIVE
// PARK ON A CONDVAR BETWEEN WORK UNITS. WITH CORE PACKING EVERY WORKER KEEPS
// RUNNING BUT PINS ITSELF TO CPUS 0..ACTIVE.
//
// ALL WAITS ARE BOUNDED SO SHUTDOWN IS NOTICED WITHIN ONE POLL.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

pub const PARK_POLL: Duration = Duration::from_millis(100);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ThreadGate {
    total: usize,
    core_packing: bool,
    active: AtomicUsize,
    generation: AtomicU64,
    park: Mutex<()>,
    cv: Condvar,
}

impl ThreadGate {
    pub fn new(total: usize, active: usize, core_packing: bool) -> Self {
        Self {
            total,
            core_packing,
            active: AtomicUsize::new(active.clamp(1, total.max(1))),
            generation: AtomicU64::new(1),
            park: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn core_packing(&self) -> bool {
        self.core_packing
    }

    pub fn set_active(&self, n: usize) {
        let _g = lock(&self.park);
        self.active.store(n.clamp(1, self.total.max(1)), Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cv.notify_all();
    }

    // CALLED BY WORKER idx BETWEEN WORK UNITS. seen IS THE WORKER'S LAST
    // OBSERVED GENERATION (START AT 0). RETURNS FALSE ON SHUTDOWN.
    pub fn wait_turn(&self, idx: usize, seen: &mut u64, shutdown: &AtomicBool) -> bool {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return false;
            }
            let generation = self.generation.load(Ordering::Acquire);
            let active = self.active();
            if generation != *seen {
                *seen = generation;
                if self.core_packing {
                    if let Err(e) = pin_to_cpus(active) {
                        crate::log_warn!("WORKER {}: PINNING TO {} CPUS FAILED: {}", idx, active, e);
                    }
                }
            }
            if self.core_packing || idx < active {
                return true;
            }

            let guard = lock(&self.park);
            // RE-CHECK UNDER THE LOCK: set_active NOTIFIES WHILE HOLDING IT
            if self.generation.load(Ordering::Acquire) == generation {
                let _ = self.cv.wait_timeout(guard, PARK_POLL);
            }
        }
    }
}

// RESTRICT THE CALLING THREAD TO CPUS 0..n
pub fn pin_to_cpus(n: usize) -> std::io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in 0..n.max(1) {
            libc::CPU_SET(cpu, &mut set);
        }
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("startup barrier timed out: {arrived} of {expected} workers arrived")]
pub struct BarrierTimeout {
    pub arrived: usize,
    pub expected: usize,
}

// COUNTING BARRIER: EVERY WORKER PLUS THE CONTROLLER CHECK IN BEFORE THE
// FIRST ROUND STARTS. A WORKER THAT NEVER ARRIVES FAILS THE WAIT.
pub struct StartupBarrier {
    expected: usize,
    arrived: Mutex<usize>,
    cv: Condvar,
}

impl StartupBarrier {
    pub fn new(expected: usize) -> Self {
        Self { expected, arrived: Mutex::new(0), cv: Condvar::new() }
    }

    pub fn wait(&self, timeout: Duration) -> Result<(), BarrierTimeout> {
        let deadline = Instant::now() + timeout;
        let mut arrived = lock(&self.arrived);
        *arrived += 1;
        if *arrived >= self.expected {
            self.cv.notify_all();
            return Ok(());
        }
        while *arrived < self.expected {
            let now = Instant::now();
            if now >= deadline {
                return Err(BarrierTimeout { arrived: *arrived, expected: self.expected });
            }
            let (g, _) = self
                .cv
                .wait_timeout(arrived, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            arrived = g;
        }
        Ok(())
    }
}
