//! Capability traits the engine consumes.
//!
//! The core never talks to the OS directly: window enumeration, input
//! injection, time, randomness and CPU sampling are all injected through
//! these traits. Real platform bindings live in the embedding application;
//! `fake` provides deterministic in-memory implementations for tests and
//! headless use.

use crate::errors::{EngineError, Result};
use crate::types::{MouseButton, Position, Rect, WindowId, WindowInfo};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub mod fake;

/// Window enumeration and geometry queries for one desktop.
pub trait WindowBackend: Send + Sync {
    /// Snapshot of all top-level windows. An `Err` here means the
    /// enumeration call itself failed; an empty list is a normal outcome.
    fn enumerate(&self) -> Result<Vec<WindowInfo>>;

    /// Whether the window still exists. Queried live, never cached.
    fn is_alive(&self, id: WindowId) -> bool;

    /// Current bounding rectangle, or `None` if the window is gone.
    fn rect(&self, id: WindowId) -> Option<Rect>;

    /// Whether the window is minimized. Distinct from focus: an unfocused
    /// but visible window is not minimized.
    fn is_minimized(&self, id: WindowId) -> bool;
}

/// Click injection capability.
pub trait InputBackend: Send + Sync {
    /// Send one click at the given screen position. Errors are
    /// `EngineError::Send` and are treated as non-fatal by the scheduler.
    fn send_click(&self, at: Position, button: MouseButton) -> Result<()>;
}

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Uniform random source, injectable so tests can seed it.
pub trait RandomSource: Send + Sync {
    /// Draw uniformly from `[lo, hi]`.
    fn uniform(&self, lo: f64, hi: f64) -> f64;
}

/// Global CPU load sampling for the throttle interlock.
pub trait CpuProbe: Send + Sync {
    /// Current global CPU usage in percent, 0.0..=100.0.
    fn load_pct(&self) -> f32;
}

/// The full capability bundle the engine is constructed from.
#[derive(Clone)]
pub struct Capabilities {
    pub windows: Arc<dyn WindowBackend>,
    pub input: Arc<dyn InputBackend>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub cpu: Arc<dyn CpuProbe>,
}

impl Capabilities {
    /// Bundle the given window/input backends with system implementations
    /// of the clock, random source and CPU probe.
    pub fn system(windows: Arc<dyn WindowBackend>, input: Arc<dyn InputBackend>) -> Self {
        Self {
            windows,
            input,
            clock: Arc::new(SystemClock::new()),
            random: Arc::new(ThreadRandom),
            cpu: Arc::new(SysinfoCpu::new()),
        }
    }
}

/// Monotonic clock backed by `std::time::Instant`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Random source backed by the thread-local rng.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        if lo >= hi {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }
}

/// CPU probe backed by `sysinfo`.
pub struct SysinfoCpu {
    system: Mutex<sysinfo::System>,
}

impl SysinfoCpu {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }
}

impl Default for SysinfoCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuProbe for SysinfoCpu {
    fn load_pct(&self) -> f32 {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_cpu_usage();
        system.global_cpu_usage()
    }
}

/// Input backend that rejects every click. Useful when an embedding only
/// needs tracking/status and has no injection capability on the platform.
pub struct UnsupportedInput;

impl InputBackend for UnsupportedInput {
    fn send_click(&self, _at: Position, _button: MouseButton) -> Result<()> {
        Err(EngineError::UnsupportedPlatform(
            "no input backend available".to_string(),
        ))
    }
}
