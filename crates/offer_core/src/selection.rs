//! Selection state machine for the "choose a driver" step.
//!
//! ```text
//! Idle ──tap(a)──▶ Highlighted(a) ──tap(a)──▶ ConfirmPending(a) ──paid──▶ Confirmed(a)
//!                   │   ▲    ▲                    │
//!                tap(b) └────┴── back out / payment failed
//!
//! any state ──request cancelled──▶ Cancelled (terminal)
//! ```
//!
//! Transitions are pure; the controller decides when each event fires.

use serde::Serialize;
use thiserror::Error;

use crate::offers::CandidateId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum SelectionState {
    #[default]
    Idle,
    Highlighted(CandidateId),
    ConfirmPending(CandidateId),
    Confirmed(CandidateId),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Tap(CandidateId),
    BackOut,
    PaymentSucceeded,
    PaymentFailed,
    RequestCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("cannot {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
    #[error("candidate {0} is not in the ranked offers")]
    UnknownCandidate(CandidateId),
    #[error("another confirm or cancel is in progress")]
    ActionInProgress,
    #[error("the request is closed")]
    RequestClosed,
}

impl SelectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tap(_) => "tap",
            Self::BackOut => "back out",
            Self::PaymentSucceeded => "complete payment",
            Self::PaymentFailed => "fail payment",
            Self::RequestCancelled => "cancel",
        }
    }
}

impl SelectionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Highlighted(_) => "highlighted",
            Self::ConfirmPending(_) => "confirm pending",
            Self::Confirmed(_) => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// The candidate this state refers to, if any.
    pub fn candidate(&self) -> Option<&CandidateId> {
        match self {
            Self::Highlighted(id) | Self::ConfirmPending(id) | Self::Confirmed(id) => Some(id),
            Self::Idle | Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Next state for `event`, or why the event is not allowed here.
    pub fn apply(&self, event: &SelectionEvent) -> Result<SelectionState, SelectionError> {
        use SelectionEvent as E;
        use SelectionState as S;

        match (self, event) {
            (S::Cancelled, E::RequestCancelled) => Ok(S::Cancelled),
            (S::Cancelled, _) => Err(SelectionError::RequestClosed),
            (_, E::RequestCancelled) => Ok(S::Cancelled),

            (S::Idle, E::Tap(id)) => Ok(S::Highlighted(id.clone())),
            (S::Highlighted(current), E::Tap(id)) if current == id => Ok(S::ConfirmPending(id.clone())),
            (S::Highlighted(_), E::Tap(id)) => Ok(S::Highlighted(id.clone())),

            (S::ConfirmPending(id), E::BackOut) => Ok(S::Highlighted(id.clone())),
            (S::ConfirmPending(id), E::PaymentSucceeded) => Ok(S::Confirmed(id.clone())),
            (S::ConfirmPending(id), E::PaymentFailed) => Ok(S::Highlighted(id.clone())),

            (state, event) => Err(SelectionError::InvalidTransition {
                state: state.name(),
                event: event.name(),
            }),
        }
    }
}
