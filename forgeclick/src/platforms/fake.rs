//! Deterministic in-memory capability implementations.
//!
//! `FakeDesktop` scripts a desktop of windows and records every injected
//! click, `ManualClock` advances only when told to, and `SeededRandom`
//! makes the Random pattern reproducible. The test suites drive the whole
//! engine through these without touching the OS.

use crate::errors::{EngineError, Result};
use crate::platforms::{Clock, CpuProbe, InputBackend, RandomSource, WindowBackend};
use crate::types::{MouseButton, Position, Rect, WindowId, WindowInfo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct DesktopState {
    windows: Vec<WindowInfo>,
    minimized: HashSet<WindowId>,
    clicks: Vec<(Position, MouseButton)>,
    fail_next_sends: u32,
    enumeration_down: bool,
}

/// A scripted desktop implementing both the window and input backends.
#[derive(Default)]
pub struct FakeDesktop {
    state: Mutex<DesktopState>,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DesktopState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a window to the desktop and return its enumeration record.
    pub fn add_window(&self, id: u64, title: &str, process_name: &str, rect: Rect) -> WindowInfo {
        let info = WindowInfo {
            id: WindowId(id),
            title: title.to_string(),
            process_name: process_name.to_string(),
            rect,
        };
        self.lock().windows.push(info.clone());
        info
    }

    /// Close a window, making it dead for liveness checks.
    pub fn remove_window(&self, id: u64) {
        let mut state = self.lock();
        state.windows.retain(|w| w.id != WindowId(id));
        state.minimized.remove(&WindowId(id));
    }

    /// Move/resize a window.
    pub fn move_window(&self, id: u64, rect: Rect) {
        let mut state = self.lock();
        if let Some(w) = state.windows.iter_mut().find(|w| w.id == WindowId(id)) {
            w.rect = rect;
        }
    }

    pub fn set_minimized(&self, id: u64, minimized: bool) {
        let mut state = self.lock();
        if minimized {
            state.minimized.insert(WindowId(id));
        } else {
            state.minimized.remove(&WindowId(id));
        }
    }

    /// Every click injected so far, in order.
    pub fn clicks(&self) -> Vec<(Position, MouseButton)> {
        self.lock().clicks.clone()
    }

    pub fn click_count(&self) -> usize {
        self.lock().clicks.len()
    }

    /// Make the next `n` click injections fail.
    pub fn fail_next_sends(&self, n: u32) {
        self.lock().fail_next_sends = n;
    }

    /// Toggle enumeration failure, simulating a broken OS call.
    pub fn set_enumeration_down(&self, down: bool) {
        self.lock().enumeration_down = down;
    }
}

impl WindowBackend for FakeDesktop {
    fn enumerate(&self) -> Result<Vec<WindowInfo>> {
        let state = self.lock();
        if state.enumeration_down {
            return Err(EngineError::Enumeration(
                "simulated enumeration failure".to_string(),
            ));
        }
        Ok(state.windows.clone())
    }

    fn is_alive(&self, id: WindowId) -> bool {
        self.lock().windows.iter().any(|w| w.id == id)
    }

    fn rect(&self, id: WindowId) -> Option<Rect> {
        self.lock().windows.iter().find(|w| w.id == id).map(|w| w.rect)
    }

    fn is_minimized(&self, id: WindowId) -> bool {
        self.lock().minimized.contains(&id)
    }
}

impl InputBackend for FakeDesktop {
    fn send_click(&self, at: Position, button: MouseButton) -> Result<()> {
        let mut state = self.lock();
        if state.fail_next_sends > 0 {
            state.fail_next_sends -= 1;
            return Err(EngineError::Send("simulated send failure".to_string()));
        }
        state.clicks.push((at, button));
        Ok(())
    }
}

/// Clock that advances only when the test advances it.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Seeded random source for reproducible Random-pattern delays.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        if lo >= hi {
            return lo;
        }
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(lo..=hi)
    }
}

/// CPU probe returning a fixed, settable load.
#[derive(Default)]
pub struct FixedCpu {
    // load percent scaled by 100 so it fits an atomic
    centi_pct: AtomicU64,
}

impl FixedCpu {
    pub fn new(pct: f32) -> Self {
        let probe = Self::default();
        probe.set(pct);
        probe
    }

    pub fn set(&self, pct: f32) {
        self.centi_pct
            .store((pct.max(0.0) * 100.0) as u64, Ordering::SeqCst);
    }
}

impl CpuProbe for FixedCpu {
    fn load_pct(&self) -> f32 {
        self.centi_pct.load(Ordering::SeqCst) as f32 / 100.0
    }
}
