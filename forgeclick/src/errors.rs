use crate::scheduler::ScheduleStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A lifecycle method was called in a state that does not permit it,
    /// e.g. `start()` while already Running. Contract violation, surfaced
    /// immediately to the caller.
    #[error("cannot {operation} while scheduler is {status:?}")]
    InvalidState {
        operation: &'static str,
        status: ScheduleStatus,
    },

    /// The OS window enumeration call itself failed. Recoverable; the
    /// tracker logs it and retries on the next tick. A target window that
    /// is simply absent is NOT this error (see `ResolveOutcome::NotFound`).
    #[error("window enumeration failed: {0}")]
    Enumeration(String),

    /// A single click injection failed. Recoverable; counted separately
    /// from successful clicks and never stops the scheduler.
    #[error("click injection failed: {0}")]
    Send(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
