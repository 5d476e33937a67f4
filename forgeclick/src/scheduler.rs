//! The click scheduling loop.
//!
//! One logical timing loop owns all tick execution; every mutation of the
//! schedule state and the pattern cursor happens inside tick processing.
//! Control methods (`start`, `pause`, `resume`, `stop`) and configuration
//! updates only flip state that the next tick observes, so nothing ever
//! interrupts an in-flight click emission.

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::events::EngineEvent;
use crate::pattern::PatternGenerator;
use crate::platforms::{Clock, InputBackend, RandomSource};
use crate::safety::{SafetyDecision, SafetyMonitor, SafetyReason};
use crate::window::{TrackerStatus, WindowTracker};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Why the scheduler is paused. Safety pauses auto-resume when their
/// condition clears; manual pauses wait for `resume()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseOrigin {
    Manual,
    Safety(SafetyReason),
}

/// Why a tick did not click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Manually paused; polling until resumed.
    Paused,
    /// A safety interlock is holding clicking.
    Safety(SafetyReason),
    /// No valid target window right now; the session stays Running and
    /// clicking resumes when the window reappears.
    WindowUnavailable,
}

/// Result of one scheduling decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick reached click emission. `clicked` is false when the
    /// injection failed (counted, non-fatal).
    Ticked { next_delay_ms: u64, clicked: bool },
    /// The tick was a no-op; poll again after the delay.
    Skipped {
        reason: SkipReason,
        next_delay_ms: u64,
    },
    /// The session is Idle or Stopped; the loop exits.
    Halted,
}

impl TickOutcome {
    /// Delay until the next tick, if the loop should keep going.
    pub fn next_delay_ms(&self) -> Option<u64> {
        match self {
            TickOutcome::Ticked { next_delay_ms, .. }
            | TickOutcome::Skipped { next_delay_ms, .. } => Some(*next_delay_ms),
            TickOutcome::Halted => None,
        }
    }
}

/// Read-only status snapshot, polled by the UI.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub schedule: ScheduleStatus,
    pub tracker: TrackerStatus,
    pub target_title: Option<String>,
    pub click_count: u64,
    pub failed_clicks: u64,
    pub elapsed_active_ms: u64,
    pub effective_interval_ms: u64,
    /// Most recent safety trip, kept distinguishable from genuine failures.
    pub last_safety_trip: Option<SafetyReason>,
}

#[derive(Default)]
struct ScheduleState {
    status: ScheduleStatus,
    pause_origin: Option<PauseOrigin>,
    last_safety: Option<SafetyReason>,
    click_count: u64,
    failed_clicks: u64,
    started_at: Option<u64>,
    running_since: Option<u64>,
    elapsed_active_ms: u64,
    effective_interval_ms: u64,
    pending_config: Option<EngineConfig>,
}

/// Owns the timing loop and the schedule state machine.
pub struct ClickScheduler {
    tracker: Arc<WindowTracker>,
    input: Arc<dyn InputBackend>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    safety: Arc<SafetyMonitor>,
    config: Mutex<EngineConfig>,
    pattern: Mutex<PatternGenerator>,
    state: Mutex<ScheduleState>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl ClickScheduler {
    pub fn new(
        tracker: Arc<WindowTracker>,
        input: Arc<dyn InputBackend>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        safety: Arc<SafetyMonitor>,
        config: EngineConfig,
    ) -> Self {
        let config = config.normalized();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tracker,
            pattern: Mutex::new(PatternGenerator::new(config.pattern.clone())),
            config: Mutex::new(config),
            input,
            clock,
            random,
            safety,
            state: Mutex::new(ScheduleState::default()),
            event_tx,
        }
    }

    /// Begin a session. Valid from Idle or Stopped; statistics and pattern
    /// progress are reset.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        match state.status {
            ScheduleStatus::Running | ScheduleStatus::Paused => Err(EngineError::InvalidState {
                operation: "start",
                status: state.status,
            }),
            ScheduleStatus::Idle | ScheduleStatus::Stopped => {
                let now = self.clock.now_millis();
                self.apply_pending(&mut state);
                state.status = ScheduleStatus::Running;
                state.pause_origin = None;
                state.last_safety = None;
                state.click_count = 0;
                state.failed_clicks = 0;
                state.elapsed_active_ms = 0;
                state.started_at = Some(now);
                state.running_since = Some(now);
                self.lock_pattern().reset();
                info!("scheduler started");
                Ok(())
            }
        }
    }

    /// Freeze the session. Elapsed time stops accumulating; the pattern
    /// cursor and statistics are preserved.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.status != ScheduleStatus::Running {
            return Err(EngineError::InvalidState {
                operation: "pause",
                status: state.status,
            });
        }
        self.freeze_elapsed(&mut state);
        state.status = ScheduleStatus::Paused;
        state.pause_origin = Some(PauseOrigin::Manual);
        info!("scheduler paused");
        Ok(())
    }

    /// Resume from a manual pause. The next delay is computed fresh from
    /// the current tick; no timing gap is back-filled.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.status != ScheduleStatus::Paused {
            return Err(EngineError::InvalidState {
                operation: "resume",
                status: state.status,
            });
        }
        state.status = ScheduleStatus::Running;
        state.pause_origin = None;
        state.last_safety = None;
        state.running_since = Some(self.clock.now_millis());
        info!("scheduler resumed");
        Ok(())
    }

    /// End the session. Valid from any state and idempotent.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        if state.status == ScheduleStatus::Stopped {
            return;
        }
        self.freeze_elapsed(&mut state);
        state.status = ScheduleStatus::Stopped;
        state.pause_origin = None;
        info!(clicks = state.click_count, "scheduler stopped");
    }

    /// Return a Stopped scheduler to Idle.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock_state();
        match state.status {
            ScheduleStatus::Idle => Ok(()),
            ScheduleStatus::Stopped => {
                *state = ScheduleState {
                    pending_config: state.pending_config.take(),
                    ..ScheduleState::default()
                };
                Ok(())
            }
            status => Err(EngineError::InvalidState {
                operation: "reset",
                status,
            }),
        }
    }

    /// Zero the statistics without changing state.
    pub fn reset_stats(&self) {
        let mut state = self.lock_state();
        state.click_count = 0;
        state.failed_clicks = 0;
        state.elapsed_active_ms = 0;
        let now = self.clock.now_millis();
        if state.status == ScheduleStatus::Running {
            state.started_at = Some(now);
            state.running_since = Some(now);
        }
    }

    /// Stage a new configuration. Takes effect at the start of the next
    /// tick, never mid-flight; applied immediately while no session is
    /// active.
    pub fn set_config(&self, config: EngineConfig) {
        let config = config.normalized();
        let mut state = self.lock_state();
        match state.status {
            ScheduleStatus::Idle | ScheduleStatus::Stopped => {
                self.lock_pattern().set_config(config.pattern.clone());
                *self.lock_config() = config;
            }
            _ => {
                debug!("configuration staged for next tick");
                state.pending_config = Some(config);
            }
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.lock_config().clone()
    }

    /// One scheduling decision point.
    ///
    /// Order: pending config, safety interlocks, window validity, click
    /// emission, next-delay computation. Driven by [`run`](Self::run) in
    /// production and directly by tests.
    pub fn tick(&self) -> TickOutcome {
        let mut state = self.lock_state();
        match state.status {
            ScheduleStatus::Idle | ScheduleStatus::Stopped => return TickOutcome::Halted,
            _ => {}
        }
        self.apply_pending(&mut state);
        let config = self.lock_config().clone();

        // The minimized flag follows the tracked window so the interlock
        // sees it even without an external monitor, and so a minimize
        // pause clears itself once the window is restored.
        self.safety
            .flags()
            .set_minimized(self.tracker.is_minimized());

        if state.status == ScheduleStatus::Paused {
            match state.pause_origin {
                Some(PauseOrigin::Safety(_)) => {
                    // re-evaluate so safety pauses self-clear
                    let elapsed = self.elapsed_now(&state);
                    match self.safety.evaluate(&config, elapsed) {
                        SafetyDecision::Continue => {
                            state.status = ScheduleStatus::Running;
                            state.pause_origin = None;
                            state.last_safety = None;
                            state.running_since = Some(self.clock.now_millis());
                            info!("safety condition cleared, clicking resumes");
                        }
                        SafetyDecision::PauseClicking { reason, backoff_ms } => {
                            return TickOutcome::Skipped {
                                reason: SkipReason::Safety(reason),
                                next_delay_ms: config.pattern.base_interval_ms.max(backoff_ms),
                            };
                        }
                        SafetyDecision::HardStop { reason } => {
                            self.halt(&mut state, reason);
                            return TickOutcome::Halted;
                        }
                    }
                }
                _ => {
                    return TickOutcome::Skipped {
                        reason: SkipReason::Paused,
                        next_delay_ms: config.pattern.base_interval_ms,
                    };
                }
            }
        }

        let elapsed = self.elapsed_now(&state);
        match self.safety.evaluate(&config, elapsed) {
            SafetyDecision::HardStop { reason } => {
                self.halt(&mut state, reason);
                return TickOutcome::Halted;
            }
            SafetyDecision::PauseClicking { reason, backoff_ms } => {
                self.freeze_elapsed(&mut state);
                state.status = ScheduleStatus::Paused;
                state.pause_origin = Some(PauseOrigin::Safety(reason));
                state.last_safety = Some(reason);
                info!(?reason, "safety interlock paused clicking");
                self.emit(EngineEvent::SafetyTripped {
                    reason,
                    hard_stop: false,
                });
                return TickOutcome::Skipped {
                    reason: SkipReason::Safety(reason),
                    next_delay_ms: config.pattern.base_interval_ms.max(backoff_ms),
                };
            }
            SafetyDecision::Continue => {}
        }

        self.tracker.refresh();
        let Some(position) = self.tracker.click_point(config.click_offset) else {
            // auto-pause of clicking only; the session stays Running and
            // picks back up when the tracker re-acquires the window
            let next_delay_ms = self.advance_pattern(&mut state);
            return TickOutcome::Skipped {
                reason: SkipReason::WindowUnavailable,
                next_delay_ms,
            };
        };

        let clicked = match self.input.send_click(position, config.button) {
            Ok(()) => {
                state.click_count += 1;
                self.emit(EngineEvent::Click {
                    count: state.click_count,
                    position,
                    button: config.button,
                });
                true
            }
            Err(err) => {
                state.failed_clicks += 1;
                warn!(%err, "click injection failed");
                self.emit(EngineEvent::SendFailed {
                    message: err.to_string(),
                });
                false
            }
        };

        let next_delay_ms = self.advance_pattern(&mut state);
        TickOutcome::Ticked {
            next_delay_ms,
            clicked,
        }
    }

    /// Drive ticks until the session halts. Cancellation is cooperative:
    /// `stop()` and the emergency flag are observed at the start of the
    /// next tick, bounded by one tick interval.
    pub async fn run(&self) {
        debug!("scheduler loop entered");
        loop {
            match self.tick().next_delay_ms() {
                Some(delay) => tokio::time::sleep(Duration::from_millis(delay)).await,
                None => break,
            }
        }
        debug!("scheduler loop exited");
    }

    /// Point-in-time snapshot for status display.
    pub fn status(&self) -> EngineStatus {
        let (schedule, click_count, failed_clicks, elapsed, effective, last_safety) = {
            let state = self.lock_state();
            (
                state.status,
                state.click_count,
                state.failed_clicks,
                self.elapsed_now(&state),
                state.effective_interval_ms,
                state.last_safety,
            )
        };
        let report = self.tracker.report();
        EngineStatus {
            schedule,
            tracker: report.status,
            target_title: report.window.map(|w| w.title().to_string()),
            click_count,
            failed_clicks,
            elapsed_active_ms: elapsed,
            effective_interval_ms: effective,
            last_safety_trip: last_safety,
        }
    }

    /// Subscribe to engine events.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Engine events as an async stream. Lagged subscribers skip events
    /// instead of ending the stream.
    pub fn event_stream(&self) -> impl Stream<Item = EngineEvent> + Send + Unpin {
        let mut rx = self.event_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("event stream lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.event_tx.clone()
    }

    fn advance_pattern(&self, state: &mut ScheduleState) -> u64 {
        let delay = self.lock_pattern().next_delay_ms(self.random.as_ref());
        state.effective_interval_ms = delay;
        delay
    }

    fn apply_pending(&self, state: &mut ScheduleState) {
        if let Some(config) = state.pending_config.take() {
            self.lock_pattern().set_config(config.pattern.clone());
            *self.lock_config() = config;
            debug!("staged configuration applied");
        }
    }

    fn halt(&self, state: &mut ScheduleState, reason: SafetyReason) {
        self.freeze_elapsed(state);
        state.status = ScheduleStatus::Stopped;
        state.pause_origin = None;
        state.last_safety = Some(reason);
        info!(?reason, "safety interlock stopped the session");
        self.emit(EngineEvent::SafetyTripped {
            reason,
            hard_stop: true,
        });
    }

    fn freeze_elapsed(&self, state: &mut ScheduleState) {
        if let Some(since) = state.running_since.take() {
            state.elapsed_active_ms += self.clock.now_millis().saturating_sub(since);
        }
    }

    fn elapsed_now(&self, state: &ScheduleState) -> u64 {
        let live = state
            .running_since
            .map(|since| self.clock.now_millis().saturating_sub(since))
            .unwrap_or(0);
        state.elapsed_active_ms + live
    }

    fn emit(&self, event: EngineEvent) {
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ScheduleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_config(&self) -> std::sync::MutexGuard<'_, EngineConfig> {
        match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_pattern(&self) -> std::sync::MutexGuard<'_, PatternGenerator> {
        match self.pattern.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
