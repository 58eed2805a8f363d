//! Plugin lifecycle states and the legal transitions between them.
//!
//! ```text
//! Discovered ──load──► Loaded ──init──► Initialized ──start──► Started
//!                                                      ▲          │
//!                                                start │          │ stop
//!                                                      │          ▼
//!                                  Unloaded ◄──unload── Stopped ◄─┘
//!
//! any non-terminal state ──(hook failure)──► Failed
//! ```
//!
//! `Unloaded` and `Failed` are terminal.

use std::fmt;

use serde::Serialize;

use crate::topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Registered; no instance exists yet.
    Discovered,
    /// Instance constructed with its dependencies injected.
    Loaded,
    /// `on_init` completed.
    Initialized,
    /// `on_start` completed.
    Started,
    /// `on_stop` completed; may be started again.
    Stopped,
    /// `on_unload` completed; the instance is dropped.
    Unloaded,
    /// A lifecycle step failed.
    Failed,
}

impl PluginState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;

        match self {
            Discovered => matches!(next, Loaded | Failed),
            Loaded => matches!(next, Initialized | Failed),
            Initialized => matches!(next, Started | Failed),
            Started => matches!(next, Stopped | Failed),
            Stopped => matches!(next, Started | Unloaded | Failed),
            Unloaded | Failed => false,
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unloaded | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Loaded => "loaded",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Unloaded => "unloaded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Init,
    Start,
    Stop,
    Unload,
}

impl Stage {
    /// The state a plugin reaches when this stage succeeds.
    pub fn target(self) -> PluginState {
        match self {
            Self::Load => PluginState::Loaded,
            Self::Init => PluginState::Initialized,
            Self::Start => PluginState::Started,
            Self::Stop => PluginState::Stopped,
            Self::Unload => PluginState::Unloaded,
        }
    }

    /// The topic published when this stage succeeds.
    pub fn topic(self) -> &'static str {
        match self {
            Self::Load => topics::PLUGIN_LOADED,
            Self::Init => topics::PLUGIN_INITIALIZED,
            Self::Start => topics::PLUGIN_STARTED,
            Self::Stop => topics::PLUGIN_STOPPED,
            Self::Unload => topics::PLUGIN_UNLOADED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Unload => "unload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PluginState::*;

    const ALL: [PluginState; 7] = [
        Discovered,
        Loaded,
        Initialized,
        Started,
        Stopped,
        Unloaded,
        Failed,
    ];

    #[test]
    fn test_happy_path_is_legal() {
        let path = [Discovered, Loaded, Initialized, Started, Stopped, Started, Stopped, Unloaded];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Discovered.can_transition_to(Initialized));
        assert!(!Loaded.can_transition_to(Started));
        assert!(!Loaded.can_transition_to(Stopped));
        assert!(!Initialized.can_transition_to(Loaded));
        assert!(!Started.can_transition_to(Unloaded));
        assert!(!Stopped.can_transition_to(Initialized));
    }

    #[test]
    fn test_terminal_states() {
        for state in ALL {
            if state.is_terminal() {
                assert!(ALL.iter().all(|&next| !state.can_transition_to(next)));
            } else {
                assert!(state.can_transition_to(Failed));
            }
        }
    }

    #[test]
    fn test_stage_targets() {
        for stage in [Stage::Load, Stage::Init, Stage::Start, Stage::Stop, Stage::Unload] {
            assert!(stage.topic().starts_with("plugin."));
            assert!(stage.topic().ends_with(stage.target().as_str()));
        }
    }
}
