//! Engine configuration.
//!
//! All values are clamp-and-fix: invalid input is corrected into the valid
//! range rather than rejected, so a bad settings file or UI value can never
//! leave the engine unconfigured.

use crate::types::{MouseButton, Position};
use serde::{Deserialize, Serialize};

/// Hard floor for any scheduled delay. No pattern may emit less.
pub const MIN_INTERVAL_MS: u64 = 50;
pub const MAX_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_INTERVAL_MS: u64 = 200;

/// Temporal pattern selecting how inter-click delays are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Fixed interval between clicks.
    #[default]
    Constant,
    /// Base interval with uniform variance.
    Random,
    /// Groups of rapid clicks separated by a longer pause.
    Burst,
}

/// Configuration for one click pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickPatternConfig {
    pub kind: PatternKind,
    /// Base interval in milliseconds, clamped to [50, 10000].
    pub base_interval_ms: u64,
    /// Variance for the Random pattern, in percent of the base interval.
    /// Product default is 20%, kept configurable.
    pub variance_pct: f64,
    /// Clicks per burst group (Burst only).
    pub burst_size: u32,
    /// Pause after each burst group in milliseconds (Burst only).
    pub burst_pause_ms: u64,
}

impl Default for ClickPatternConfig {
    fn default() -> Self {
        Self {
            kind: PatternKind::Constant,
            base_interval_ms: DEFAULT_INTERVAL_MS,
            variance_pct: 20.0,
            burst_size: 5,
            burst_pause_ms: 1000,
        }
    }
}

impl ClickPatternConfig {
    pub fn constant(base_interval_ms: u64) -> Self {
        Self {
            kind: PatternKind::Constant,
            base_interval_ms,
            ..Self::default()
        }
        .normalized()
    }

    pub fn random(base_interval_ms: u64, variance_pct: f64) -> Self {
        Self {
            kind: PatternKind::Random,
            base_interval_ms,
            variance_pct,
            ..Self::default()
        }
        .normalized()
    }

    pub fn burst(base_interval_ms: u64, burst_size: u32, burst_pause_ms: u64) -> Self {
        Self {
            kind: PatternKind::Burst,
            base_interval_ms,
            burst_size,
            burst_pause_ms,
            ..Self::default()
        }
        .normalized()
    }

    /// Slow preset: one click every 500ms.
    pub fn preset_slow() -> Self {
        Self::constant(500)
    }

    /// Medium preset: one click every 250ms.
    pub fn preset_medium() -> Self {
        Self::constant(250)
    }

    /// Fast preset: one click every 100ms.
    pub fn preset_fast() -> Self {
        Self::constant(100)
    }

    /// Clamp every field into its valid range.
    pub fn normalized(mut self) -> Self {
        self.base_interval_ms = self.base_interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        self.variance_pct = self.variance_pct.clamp(0.0, 100.0);
        self.burst_size = self.burst_size.max(1);
        self.burst_pause_ms = self.burst_pause_ms.max(MIN_INTERVAL_MS);
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub pattern: ClickPatternConfig,
    pub button: MouseButton,
    /// Click target relative to the window origin. `None` clicks the
    /// window center.
    pub click_offset: Option<Position>,
    /// Pause clicking while the target window is minimized. Minimized is a
    /// distinct signal from focus; the engine never pauses on focus loss.
    pub pause_on_minimize: bool,
    /// Maximum active runtime in minutes, 0 = unlimited.
    pub max_runtime_minutes: u64,
    /// CPU load percentage above which clicking backs off. `None` disables
    /// the throttle interlock.
    pub cpu_throttle_pct: Option<f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pattern: ClickPatternConfig::default(),
            button: MouseButton::Left,
            click_offset: None,
            pause_on_minimize: true,
            max_runtime_minutes: 0,
            cpu_throttle_pct: None,
        }
    }
}

impl EngineConfig {
    pub fn normalized(mut self) -> Self {
        self.pattern = self.pattern.normalized();
        if let Some(pct) = self.cpu_throttle_pct {
            self.cpu_throttle_pct = Some(pct.clamp(1.0, 100.0));
        }
        self
    }

    /// Max runtime in milliseconds, `None` when unlimited.
    pub fn max_runtime_ms(&self) -> Option<u64> {
        match self.max_runtime_minutes {
            0 => None,
            minutes => Some(minutes * 60 * 1000),
        }
    }
}
