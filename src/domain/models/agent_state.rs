//! Lifecycle states (spec.md §4.2 "Lifecycle states").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Shutdown,
    Wakeup,
    Work,
    Play,
    Solitude,
    Dream,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "SHUTDOWN",
            Self::Wakeup => "WAKEUP",
            Self::Work => "WORK",
            Self::Play => "PLAY",
            Self::Solitude => "SOLITUDE",
            Self::Dream => "DREAM",
        }
    }
}
