//! Lifecycle states.

use std::fmt;

/// `Stopped → Initialized → Running → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    /// Registry built, archives open, listener not bound.
    Initialized,
    Running,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
        })
    }
}
