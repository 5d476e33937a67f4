//! Target window identity and tracking.
//!
//! The tracker keeps at most one bound window, re-validates it on every
//! refresh and re-resolves it with the last-used criteria when it
//! disappears. Liveness is polled, never event-driven, so the whole module
//! works against a fake enumeration source in tests.

use crate::errors::Result;
use crate::platforms::{Clock, WindowBackend};
use crate::types::{Position, Rect, WindowId, WindowInfo};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// A report older than this is re-validated before being served.
pub const STALE_AFTER_MS: u64 = 1_000;

/// Rect movement below this many pixels does not fire `RectChanged`,
/// keeping notification volume sane during drags and resizes.
pub const RECT_CHANGE_THRESHOLD_PX: i32 = 4;

/// Handle to one OS window plus its last-known geometry.
///
/// Immutable once bound except for the rect cache, which is refreshed on
/// demand and never assumed fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRef {
    id: WindowId,
    title: String,
    process_name: String,
    rect: Rect,
}

impl WindowRef {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Last-known bounding rectangle. May be stale; the tracker refreshes
    /// it on every liveness check.
    pub fn last_rect(&self) -> Rect {
        self.rect
    }

    /// Live liveness query against the backend.
    pub fn is_alive(&self, backend: &dyn WindowBackend) -> bool {
        backend.is_alive(self.id)
    }
}

impl From<WindowInfo> for WindowRef {
    fn from(info: WindowInfo) -> Self {
        Self {
            id: info.id,
            title: info.title,
            process_name: info.process_name,
            rect: info.rect,
        }
    }
}

/// How candidate windows are matched during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCriteria {
    /// Case-insensitive substring match against the window title.
    pub title_contains: Option<String>,
    /// Case-insensitive match against the owning process name.
    pub process_name: Option<String>,
    /// When several candidates match, one whose title contains this string
    /// wins outright instead of reporting ambiguity.
    pub preferred_title: Option<String>,
}

impl MatchCriteria {
    pub fn title(substring: impl Into<String>) -> Self {
        Self {
            title_contains: Some(substring.into()),
            ..Self::default()
        }
    }

    pub fn with_process(mut self, process_name: impl Into<String>) -> Self {
        self.process_name = Some(process_name.into());
        self
    }

    pub fn with_preferred_title(mut self, substring: impl Into<String>) -> Self {
        self.preferred_title = Some(substring.into());
        self
    }

    fn matches(&self, info: &WindowInfo) -> bool {
        if let Some(needle) = &self.title_contains {
            if !contains_ignore_case(&info.title, needle) {
                return false;
            }
        }
        if let Some(process) = &self.process_name {
            if !info.process_name.eq_ignore_ascii_case(process) {
                return false;
            }
        }
        true
    }

    fn is_preferred(&self, info: &WindowInfo) -> bool {
        match &self.preferred_title {
            Some(needle) => contains_ignore_case(&info.title, needle),
            None => false,
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Result of a resolution attempt. A missing window is a normal outcome,
/// not an error; only the enumeration call failing is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found(WindowRef),
    NotFound,
    /// More than one candidate matched; the caller disambiguates and
    /// passes its choice to [`WindowTracker::bind`].
    Ambiguous(Vec<WindowRef>),
}

/// Coarse tracker state for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Searching,
    Tracking,
}

/// Edge-triggered state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowEvent {
    Found { id: WindowId, title: String },
    Lost,
    RectChanged { rect: Rect },
}

/// Snapshot handed to callers after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerReport {
    pub status: TrackerStatus,
    pub window: Option<WindowRef>,
}

impl TrackerReport {
    fn searching() -> Self {
        Self {
            status: TrackerStatus::Searching,
            window: None,
        }
    }
}

struct TrackerState {
    current: Option<WindowRef>,
    last_seen_at: u64,
    criteria: Option<MatchCriteria>,
    // title of the most recently tracked window, used to break ambiguity
    // when re-acquiring after a loss
    last_title: Option<String>,
}

type Listener = Box<dyn Fn(&WindowEvent) + Send + Sync>;

/// Maintains the current target window across OS state changes.
pub struct WindowTracker {
    backend: Arc<dyn WindowBackend>,
    clock: Arc<dyn Clock>,
    state: RwLock<TrackerState>,
    listeners: Mutex<Vec<Listener>>,
}

impl WindowTracker {
    pub fn new(backend: Arc<dyn WindowBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            state: RwLock::new(TrackerState {
                current: None,
                last_seen_at: 0,
                criteria: None,
                last_title: None,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback invoked synchronously whenever a refresh detects
    /// a transition (Found/Lost/RectChanged). Listeners are called outside
    /// the tracker's locks, so they may query the tracker freely.
    pub fn on_state_changed(&self, listener: impl Fn(&WindowEvent) + Send + Sync + 'static) {
        self.lock_listeners().push(Box::new(listener));
    }

    /// Enumerate windows and try to select one matching `criteria`.
    ///
    /// A unique match (or a preferred-title hit) binds immediately.
    /// Multiple matches are returned for caller disambiguation and leave
    /// the current binding untouched.
    pub fn resolve(&self, criteria: &MatchCriteria) -> Result<ResolveOutcome> {
        let windows = self.backend.enumerate()?;
        let candidates: Vec<WindowInfo> =
            windows.into_iter().filter(|w| criteria.matches(w)).collect();

        let mut events = Vec::new();
        let outcome = {
            let mut state = self.lock_write();
            state.criteria = Some(criteria.clone());

            let chosen = candidates
                .iter()
                .find(|w| criteria.is_preferred(w))
                .cloned()
                .or_else(|| (candidates.len() == 1).then(|| candidates[0].clone()));

            match chosen {
                Some(info) => {
                    let window = WindowRef::from(info);
                    info!(id = %window.id(), title = window.title(), "target window bound");
                    self.set_current(&mut state, Some(window.clone()), &mut events);
                    ResolveOutcome::Found(window)
                }
                None if candidates.is_empty() => {
                    debug!(?criteria, "no window matched");
                    self.set_current(&mut state, None, &mut events);
                    ResolveOutcome::NotFound
                }
                None => {
                    debug!(count = candidates.len(), "ambiguous window match");
                    ResolveOutcome::Ambiguous(
                        candidates.into_iter().map(WindowRef::from).collect(),
                    )
                }
            }
        };
        self.notify(&events);
        Ok(outcome)
    }

    /// Bind an explicitly chosen window, e.g. after an ambiguous resolve.
    pub fn bind(&self, window: WindowRef) {
        let mut events = Vec::new();
        {
            let mut state = self.lock_write();
            info!(id = %window.id(), title = window.title(), "target window bound");
            self.set_current(&mut state, Some(window), &mut events);
        }
        self.notify(&events);
    }

    /// Drop the current binding and forget the last-used criteria.
    pub fn clear(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.lock_write();
            state.criteria = None;
            state.last_title = None;
            self.set_current(&mut state, None, &mut events);
        }
        self.notify(&events);
    }

    /// Re-validate the current window, re-resolving it on loss.
    ///
    /// State-change notifications fire exactly when the reported
    /// liveness/identity differs from the previous report.
    pub fn refresh(&self) -> TrackerReport {
        let mut events = Vec::new();
        let report = {
            let mut state = self.lock_write();
            self.refresh_locked(&mut state, &mut events)
        };
        self.notify(&events);
        report
    }

    /// Current snapshot, re-validated first if the last check is older
    /// than [`STALE_AFTER_MS`].
    pub fn report(&self) -> TrackerReport {
        let stale = {
            let state = self.lock_read();
            state.current.is_some()
                && self.clock.now_millis().saturating_sub(state.last_seen_at) > STALE_AFTER_MS
        };
        if stale {
            return self.refresh();
        }
        let state = self.lock_read();
        TrackerReport {
            status: if state.current.is_some() {
                TrackerStatus::Tracking
            } else {
                TrackerStatus::Searching
            },
            window: state.current.clone(),
        }
    }

    pub fn status(&self) -> TrackerStatus {
        self.report().status
    }

    /// Screen position the scheduler should click: the window center, or
    /// the configured offset from the window origin.
    pub fn click_point(&self, offset: Option<Position>) -> Option<Position> {
        let report = self.report();
        report.window.map(|w| {
            let rect = w.last_rect();
            match offset {
                Some(offset) => rect.offset(offset),
                None => rect.center(),
            }
        })
    }

    /// Whether the currently bound window is minimized. False while
    /// searching.
    pub fn is_minimized(&self) -> bool {
        let state = self.lock_read();
        state
            .current
            .as_ref()
            .map(|w| self.backend.is_minimized(w.id()))
            .unwrap_or(false)
    }

    fn refresh_locked(
        &self,
        state: &mut TrackerState,
        events: &mut Vec<WindowEvent>,
    ) -> TrackerReport {
        if let Some(current) = state.current.clone() {
            if current.is_alive(self.backend.as_ref()) {
                state.last_seen_at = self.clock.now_millis();
                if let Some(rect) = self.backend.rect(current.id()) {
                    if rect_moved(current.last_rect(), rect) {
                        events.push(WindowEvent::RectChanged { rect });
                    }
                    if let Some(w) = state.current.as_mut() {
                        w.rect = rect;
                    }
                }
                return TrackerReport {
                    status: TrackerStatus::Tracking,
                    window: state.current.clone(),
                };
            }
            info!(id = %current.id(), "target window lost");
            self.set_current(state, None, events);
        }

        // searching: try to re-acquire with the last-used criteria
        let Some(criteria) = state.criteria.clone() else {
            return TrackerReport::searching();
        };

        let windows = match self.backend.enumerate() {
            Ok(windows) => windows,
            Err(err) => {
                // recoverable; retried on the next tick
                warn!(%err, "window enumeration failed");
                return TrackerReport::searching();
            }
        };
        let candidates: Vec<WindowInfo> =
            windows.into_iter().filter(|w| criteria.matches(w)).collect();

        let reacquired = candidates
            .iter()
            .find(|w| criteria.is_preferred(w))
            .or_else(|| (candidates.len() == 1).then(|| &candidates[0]))
            .or_else(|| {
                // ambiguous: only take a window whose title matches the one
                // we lost, otherwise keep searching
                let last_title = state.last_title.as_deref()?;
                candidates.iter().find(|w| w.title == last_title)
            })
            .cloned();

        match reacquired {
            Some(info) => {
                let window = WindowRef::from(info);
                info!(id = %window.id(), title = window.title(), "target window re-acquired");
                self.set_current(state, Some(window), events);
                TrackerReport {
                    status: TrackerStatus::Tracking,
                    window: state.current.clone(),
                }
            }
            None => TrackerReport::searching(),
        }
    }

    // Sole writer of `current`; computes the Found/Lost edges.
    fn set_current(
        &self,
        state: &mut TrackerState,
        window: Option<WindowRef>,
        events: &mut Vec<WindowEvent>,
    ) {
        match (&state.current, &window) {
            (Some(_), None) => events.push(WindowEvent::Lost),
            (prev, Some(next)) if prev.as_ref().map(|w| w.id()) != Some(next.id()) => {
                events.push(WindowEvent::Found {
                    id: next.id(),
                    title: next.title().to_string(),
                });
            }
            _ => {}
        }
        if let Some(w) = &window {
            state.last_title = Some(w.title().to_string());
            state.last_seen_at = self.clock.now_millis();
        }
        state.current = window;
    }

    fn notify(&self, events: &[WindowEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.lock_listeners();
        for event in events {
            for listener in listeners.iter() {
                listener(event);
            }
        }
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, TrackerState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, TrackerState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn rect_moved(previous: Rect, next: Rect) -> bool {
    (previous.x - next.x).abs() > RECT_CHANGE_THRESHOLD_PX
        || (previous.y - next.y).abs() > RECT_CHANGE_THRESHOLD_PX
        || (previous.width - next.width).abs() > RECT_CHANGE_THRESHOLD_PX
        || (previous.height - next.height).abs() > RECT_CHANGE_THRESHOLD_PX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_match_is_case_insensitive() {
        let info = WindowInfo {
            id: WindowId(1),
            title: "The Forge - Roblox".to_string(),
            process_name: "RobloxPlayer".to_string(),
            rect: Rect::new(0, 0, 100, 100),
        };
        assert!(MatchCriteria::title("forge").matches(&info));
        assert!(MatchCriteria::title("Roblox")
            .with_process("robloxplayer")
            .matches(&info));
        assert!(!MatchCriteria::title("minecraft").matches(&info));
        assert!(!MatchCriteria::title("forge")
            .with_process("chrome")
            .matches(&info));
    }

    #[test]
    fn rect_moved_honors_threshold() {
        let base = Rect::new(100, 100, 800, 600);
        assert!(!rect_moved(base, Rect::new(102, 101, 800, 600)));
        assert!(rect_moved(base, Rect::new(110, 100, 800, 600)));
        assert!(rect_moved(base, Rect::new(100, 100, 800, 660)));
    }
}
