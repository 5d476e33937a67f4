//! Inter-click delay generation.
//!
//! Pure except for the burst cursor: given the same configuration and a
//! seeded random source, the emitted delay sequence is fully reproducible.

use crate::config::{ClickPatternConfig, PatternKind, MIN_INTERVAL_MS};
use crate::platforms::RandomSource;

/// Produces the next inter-click delay for the configured pattern.
pub struct PatternGenerator {
    config: ClickPatternConfig,
    burst_cursor: u32,
}

impl PatternGenerator {
    pub fn new(config: ClickPatternConfig) -> Self {
        Self {
            config: config.normalized(),
            burst_cursor: 0,
        }
    }

    pub fn config(&self) -> &ClickPatternConfig {
        &self.config
    }

    /// Progress within the current burst group. Preserved across
    /// pause/resume, reset on restart.
    pub fn burst_cursor(&self) -> u32 {
        self.burst_cursor
    }

    /// Swap in a new configuration. The burst cursor is kept when only the
    /// timing values changed, so a mid-burst interval tweak does not
    /// restart the group; switching pattern kind resets it.
    pub fn set_config(&mut self, config: ClickPatternConfig) {
        let config = config.normalized();
        if config.kind != self.config.kind {
            self.burst_cursor = 0;
        }
        self.burst_cursor = self.burst_cursor.min(config.burst_size.saturating_sub(1));
        self.config = config;
    }

    /// Reset pattern progress, as on an explicit restart.
    pub fn reset(&mut self) {
        self.burst_cursor = 0;
    }

    /// Compute the next delay in milliseconds. Never returns less than
    /// `MIN_INTERVAL_MS`, regardless of pattern.
    pub fn next_delay_ms(&mut self, random: &dyn RandomSource) -> u64 {
        let base = self.config.base_interval_ms;
        let delay = match self.config.kind {
            PatternKind::Constant => base,
            PatternKind::Random => {
                let variance = self.config.variance_pct / 100.0;
                let u = random.uniform(-variance, variance);
                (base as f64 * (1.0 + u)).round().max(0.0) as u64
            }
            PatternKind::Burst => {
                if self.burst_cursor < self.config.burst_size - 1 {
                    self.burst_cursor += 1;
                    base
                } else {
                    self.burst_cursor = 0;
                    self.config.burst_pause_ms
                }
            }
        };
        delay.max(MIN_INTERVAL_MS)
    }
}
