//! Engine notification events.

use crate::safety::SafetyReason;
use crate::types::{MouseButton, Position};
use crate::window::WindowEvent;
use serde::Serialize;

/// Events broadcast by the scheduler while a session is active.
///
/// Delivered over a `tokio::sync::broadcast` channel; slow subscribers lag
/// rather than block the tick loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// One click was emitted. `count` is the running total.
    Click {
        count: u64,
        position: Position,
        button: MouseButton,
    },
    /// The target window's tracked state changed.
    WindowState { event: WindowEvent },
    /// A safety interlock fired. Not a failure; `hard_stop` tells whether
    /// the session ended or merely paused.
    SafetyTripped {
        reason: SafetyReason,
        hard_stop: bool,
    },
    /// A click injection failed. Non-fatal; scheduling continues.
    SendFailed { message: String },
}
