//! Window-targeted auto-click engine.
//!
//! This crate is the scheduling and tracking core of an auto clicker: it
//! binds one target window, keeps tracking it across closes/reopens and
//! moves, and emits clicks on a configurable temporal pattern, independent
//! of which window currently has input focus. OS specifics (window
//! enumeration, input injection) are injected capabilities; see
//! [`platforms`].
//!
//! ```no_run
//! use forgeclick::{ClickEngine, EngineConfig, MatchCriteria};
//! use forgeclick::platforms::fake::FakeDesktop;
//! use std::sync::Arc;
//!
//! # async fn demo() -> forgeclick::Result<()> {
//! let desktop = Arc::new(FakeDesktop::new());
//! let engine = ClickEngine::new(desktop.clone(), desktop, EngineConfig::default());
//! engine.select_target(&MatchCriteria::title("Roblox"))?;
//! engine.start()?;
//! engine.run().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio_stream::Stream;
use tracing::instrument;

pub mod config;
pub mod errors;
pub mod events;
pub mod pattern;
pub mod platforms;
pub mod safety;
pub mod scheduler;
pub mod types;
pub mod window;

pub use config::{ClickPatternConfig, EngineConfig, PatternKind, MAX_INTERVAL_MS, MIN_INTERVAL_MS};
pub use errors::{EngineError, Result};
pub use events::EngineEvent;
pub use pattern::PatternGenerator;
pub use safety::{SafetyDecision, SafetyFlags, SafetyMonitor, SafetyReason};
pub use scheduler::{ClickScheduler, EngineStatus, ScheduleStatus, SkipReason, TickOutcome};
pub use types::{MouseButton, Position, Rect, WindowId, WindowInfo};
pub use window::{
    MatchCriteria, ResolveOutcome, TrackerReport, TrackerStatus, WindowEvent, WindowRef,
    WindowTracker,
};

use platforms::{Capabilities, InputBackend, WindowBackend};
use tokio::sync::broadcast;

/// The main entry point: tracker, scheduler and safety monitor wired
/// together over one capability bundle.
pub struct ClickEngine {
    tracker: Arc<WindowTracker>,
    scheduler: Arc<ClickScheduler>,
    flags: Arc<SafetyFlags>,
}

impl ClickEngine {
    /// Build an engine from window/input backends, using system
    /// implementations for clock, randomness and CPU sampling.
    pub fn new(
        windows: Arc<dyn WindowBackend>,
        input: Arc<dyn InputBackend>,
        config: EngineConfig,
    ) -> Self {
        Self::with_capabilities(Capabilities::system(windows, input), config)
    }

    /// Build an engine from a fully explicit capability bundle. Tests use
    /// this to inject a manual clock and a seeded random source.
    pub fn with_capabilities(caps: Capabilities, config: EngineConfig) -> Self {
        let flags = Arc::new(SafetyFlags::new());
        let tracker = Arc::new(WindowTracker::new(caps.windows, caps.clock.clone()));
        let safety = Arc::new(SafetyMonitor::new(flags.clone(), caps.cpu));
        let scheduler = Arc::new(ClickScheduler::new(
            tracker.clone(),
            caps.input,
            caps.clock,
            caps.random,
            safety,
            config,
        ));

        // forward tracker transitions onto the engine event channel
        let event_tx = scheduler.event_sender();
        tracker.on_state_changed(move |event| {
            let _ = event_tx.send(EngineEvent::WindowState {
                event: event.clone(),
            });
        });

        Self {
            tracker,
            scheduler,
            flags,
        }
    }

    /// Find and bind the target window. A lone match binds immediately;
    /// multiple matches are returned for disambiguation via
    /// [`bind_target`](Self::bind_target).
    #[instrument(skip(self))]
    pub fn select_target(&self, criteria: &MatchCriteria) -> Result<ResolveOutcome> {
        self.tracker.resolve(criteria)
    }

    /// Bind an explicitly chosen window after an ambiguous resolve.
    pub fn bind_target(&self, window: WindowRef) {
        self.tracker.bind(window);
    }

    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    pub fn pause(&self) -> Result<()> {
        self.scheduler.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.scheduler.resume()
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Return a Stopped session to Idle.
    pub fn reset(&self) -> Result<()> {
        self.scheduler.reset()
    }

    pub fn reset_stats(&self) {
        self.scheduler.reset_stats();
    }

    /// Drive the scheduling loop to completion. Typically spawned as a
    /// task; returns once the session is stopped.
    pub async fn run(&self) {
        self.scheduler.run().await;
    }

    /// Read-only status snapshot for UI polling.
    pub fn status(&self) -> EngineStatus {
        self.scheduler.status()
    }

    /// Stage a configuration change; applied at the next tick boundary.
    pub fn set_config(&self, config: EngineConfig) {
        self.scheduler.set_config(config);
    }

    pub fn config(&self) -> EngineConfig {
        self.scheduler.config()
    }

    /// Subscribe to engine events.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.scheduler.events()
    }

    /// Engine events as an async stream.
    pub fn event_stream(&self) -> impl Stream<Item = EngineEvent> + Send + Unpin {
        self.scheduler.event_stream()
    }

    /// Safety flags shared with the global-hotkey and window-monitor
    /// collaborators. They set these from OS callback contexts; the tick
    /// loop observes them, so there is no reentrancy into scheduler state.
    pub fn flags(&self) -> Arc<SafetyFlags> {
        self.flags.clone()
    }

    /// Direct access to the window tracker, e.g. for UI status display.
    pub fn tracker(&self) -> Arc<WindowTracker> {
        self.tracker.clone()
    }

    /// Direct access to the scheduler, e.g. for driving ticks manually.
    pub fn scheduler(&self) -> Arc<ClickScheduler> {
        self.scheduler.clone()
    }
}
