//! Call-status state machine governing one collection's async lifecycle.
//!
//! State machine: `Idle -> Loading -> {Loaded | Error}`, with
//! `Loaded -> Loading` and `Error -> Loading` as refetch re-entries and a
//! reset to `Idle` from anywhere. `Idle` is the only initial state and no
//! state is terminal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The stored form of a failed load, after error mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct LoadError {
    /// Human-readable description.
    pub message: String,
    /// Application-defined structured payload (status codes, field errors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl LoadError {
    /// Error with a message and no detail.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    /// Attaches a structured detail payload.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Default mapping: the full `anyhow` context chain as the message.
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Current status of a collection's fetch lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Nothing requested yet, or reset.
    #[default]
    Idle,
    /// A fetch is in progress.
    Loading,
    /// The last fetch succeeded (or entities were set directly).
    Loaded,
    /// The last fetch failed.
    Error(LoadError),
}

/// Rejected call-status transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid call status transition from {from} to {to}")]
pub struct CallStatusError {
    /// Name of the current state.
    pub from: &'static str,
    /// Name of the requested state.
    pub to: &'static str,
}

impl CallStatus {
    /// Lowercase state name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Error(_) => "error",
        }
    }

    /// Whether a fetch is in progress.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether the last fetch succeeded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// The stored error, if in the error state.
    #[must_use]
    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Applies a transition if the state machine allows it.
    ///
    /// # Errors
    ///
    /// Returns [`CallStatusError`] for transitions outside the machine, most
    /// notably `Loading -> Loading`, which callers treat as a coalesced
    /// request.
    pub fn transition(&mut self, next: CallStatus) -> Result<(), CallStatusError> {
        let allowed = match (&*self, &next) {
            (_, Self::Idle)
            | (Self::Idle | Self::Loaded | Self::Error(_), Self::Loading)
            | (Self::Idle | Self::Loading | Self::Loaded, Self::Loaded)
            | (Self::Loading, Self::Error(_)) => true,
            _ => false,
        };
        if allowed {
            *self = next;
            Ok(())
        } else {
            Err(CallStatusError {
                from: self.name(),
                to: next.name(),
            })
        }
    }

    /// Enters `Loading`. Returns `false` if a load was already in progress.
    pub fn begin_loading(&mut self) -> bool {
        self.transition(Self::Loading).is_ok()
    }
}
