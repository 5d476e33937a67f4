//! Safety interlocks.
//!
//! Evaluated at the top of every scheduler tick, before any click is
//! considered. Trips are expected control transitions, not errors, and are
//! reported separately from genuine failures in the status snapshot.

use crate::config::EngineConfig;
use crate::platforms::CpuProbe;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// First throttle trip backs off this long; each consecutive trip doubles it.
pub const THROTTLE_BASE_BACKOFF_MS: u64 = 250;
pub const THROTTLE_MAX_BACKOFF_MS: u64 = 5_000;

/// Flags set from outside the scheduling loop.
///
/// The global-hotkey and window-monitor collaborators run in OS callback
/// contexts; they communicate with the tick handler exclusively through
/// these atomics, never by calling into scheduler state directly.
#[derive(Default)]
pub struct SafetyFlags {
    emergency_stop: AtomicBool,
    minimized: AtomicBool,
}

impl SafetyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the emergency stop. Observed within one tick interval.
    pub fn trip_emergency(&self) {
        self.emergency_stop.store(true, Ordering::SeqCst);
    }

    pub fn clear_emergency(&self) {
        self.emergency_stop.store(false, Ordering::SeqCst);
    }

    pub fn emergency(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    /// Report the target window's minimized state. Minimized is distinct
    /// from unfocused; focus loss alone must never be reported here.
    pub fn set_minimized(&self, minimized: bool) {
        self.minimized.store(minimized, Ordering::SeqCst);
    }

    pub fn minimized(&self) -> bool {
        self.minimized.load(Ordering::SeqCst)
    }
}

/// What tripped an interlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyReason {
    EmergencyStop,
    MaxRuntime,
    Minimized,
    CpuThrottle,
}

/// Outcome of one safety evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyDecision {
    /// No interlock active; the tick may click.
    Continue,
    /// Suppress clicking but keep the session; auto-resumes when the
    /// condition clears. `backoff_ms` of 0 means poll at the normal cadence.
    PauseClicking {
        reason: SafetyReason,
        backoff_ms: u64,
    },
    /// Stop the session. Always wins over `PauseClicking`.
    HardStop { reason: SafetyReason },
}

/// Per-tick interlock evaluator.
pub struct SafetyMonitor {
    flags: Arc<SafetyFlags>,
    cpu: Arc<dyn CpuProbe>,
    // consecutive over-threshold evaluations, drives the backoff ramp
    throttle_strikes: AtomicU32,
}

impl SafetyMonitor {
    pub fn new(flags: Arc<SafetyFlags>, cpu: Arc<dyn CpuProbe>) -> Self {
        Self {
            flags,
            cpu,
            throttle_strikes: AtomicU32::new(0),
        }
    }

    pub fn flags(&self) -> &Arc<SafetyFlags> {
        &self.flags
    }

    /// Evaluate all interlocks for the current tick.
    ///
    /// Ordering encodes precedence: emergency stop and runtime cap are hard
    /// stops and are checked first; minimize and CPU throttle only pause.
    pub fn evaluate(&self, config: &EngineConfig, elapsed_active_ms: u64) -> SafetyDecision {
        if self.flags.emergency() {
            return SafetyDecision::HardStop {
                reason: SafetyReason::EmergencyStop,
            };
        }

        if let Some(max_ms) = config.max_runtime_ms() {
            if elapsed_active_ms >= max_ms {
                return SafetyDecision::HardStop {
                    reason: SafetyReason::MaxRuntime,
                };
            }
        }

        if config.pause_on_minimize && self.flags.minimized() {
            return SafetyDecision::PauseClicking {
                reason: SafetyReason::Minimized,
                backoff_ms: 0,
            };
        }

        if let Some(threshold) = config.cpu_throttle_pct {
            let load = self.cpu.load_pct();
            if load > threshold {
                let strikes = self.throttle_strikes.fetch_add(1, Ordering::SeqCst) + 1;
                let backoff_ms = (THROTTLE_BASE_BACKOFF_MS << (strikes - 1).min(16))
                    .min(THROTTLE_MAX_BACKOFF_MS);
                debug!(load, threshold, strikes, backoff_ms, "cpu throttle engaged");
                return SafetyDecision::PauseClicking {
                    reason: SafetyReason::CpuThrottle,
                    backoff_ms,
                };
            }
            self.throttle_strikes.store(0, Ordering::SeqCst);
        }

        SafetyDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::fake::FixedCpu;

    fn monitor_with(cpu_pct: f32) -> (SafetyMonitor, Arc<SafetyFlags>) {
        let flags = Arc::new(SafetyFlags::new());
        let monitor = SafetyMonitor::new(flags.clone(), Arc::new(FixedCpu::new(cpu_pct)));
        (monitor, flags)
    }

    #[test]
    fn clear_run_continues() {
        let (monitor, _flags) = monitor_with(10.0);
        let config = EngineConfig::default();
        assert_eq!(monitor.evaluate(&config, 0), SafetyDecision::Continue);
    }

    #[test]
    fn emergency_stop_wins_over_everything() {
        let (monitor, flags) = monitor_with(100.0);
        flags.trip_emergency();
        flags.set_minimized(true);
        let config = EngineConfig {
            cpu_throttle_pct: Some(50.0),
            max_runtime_minutes: 1,
            ..EngineConfig::default()
        };
        assert_eq!(
            monitor.evaluate(&config, u64::MAX),
            SafetyDecision::HardStop {
                reason: SafetyReason::EmergencyStop
            }
        );
    }

    #[test]
    fn max_runtime_hard_stops_at_the_boundary() {
        let (monitor, _flags) = monitor_with(0.0);
        let config = EngineConfig {
            max_runtime_minutes: 1,
            ..EngineConfig::default()
        };
        assert_eq!(monitor.evaluate(&config, 59_999), SafetyDecision::Continue);
        assert_eq!(
            monitor.evaluate(&config, 60_000),
            SafetyDecision::HardStop {
                reason: SafetyReason::MaxRuntime
            }
        );
    }

    #[test]
    fn minimize_pauses_only_when_configured() {
        let (monitor, flags) = monitor_with(0.0);
        flags.set_minimized(true);

        let config = EngineConfig::default();
        assert_eq!(
            monitor.evaluate(&config, 0),
            SafetyDecision::PauseClicking {
                reason: SafetyReason::Minimized,
                backoff_ms: 0,
            }
        );

        let config = EngineConfig {
            pause_on_minimize: false,
            ..EngineConfig::default()
        };
        assert_eq!(monitor.evaluate(&config, 0), SafetyDecision::Continue);
    }

    #[test]
    fn throttle_backoff_doubles_then_resets() {
        let flags = Arc::new(SafetyFlags::new());
        let cpu = Arc::new(FixedCpu::new(95.0));
        let monitor = SafetyMonitor::new(flags, cpu.clone());
        let config = EngineConfig {
            cpu_throttle_pct: Some(80.0),
            ..EngineConfig::default()
        };

        let mut expected = THROTTLE_BASE_BACKOFF_MS;
        for _ in 0..4 {
            assert_eq!(
                monitor.evaluate(&config, 0),
                SafetyDecision::PauseClicking {
                    reason: SafetyReason::CpuThrottle,
                    backoff_ms: expected,
                }
            );
            expected = (expected * 2).min(THROTTLE_MAX_BACKOFF_MS);
        }

        // load drops; the ramp resets
        cpu.set(5.0);
        assert_eq!(monitor.evaluate(&config, 0), SafetyDecision::Continue);
        cpu.set(95.0);
        assert_eq!(
            monitor.evaluate(&config, 0),
            SafetyDecision::PauseClicking {
                reason: SafetyReason::CpuThrottle,
                backoff_ms: THROTTLE_BASE_BACKOFF_MS,
            }
        );
    }

    #[test]
    fn backoff_is_capped() {
        let (monitor, _flags) = monitor_with(99.0);
        let config = EngineConfig {
            cpu_throttle_pct: Some(50.0),
            ..EngineConfig::default()
        };
        let mut last = 0;
        for _ in 0..20 {
            if let SafetyDecision::PauseClicking { backoff_ms, .. } =
                monitor.evaluate(&config, 0)
            {
                last = backoff_ms;
            }
        }
        assert_eq!(last, THROTTLE_MAX_BACKOFF_MS);
    }
}
