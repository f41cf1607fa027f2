//! Errors returned by coordinator entry points.
//!
//! Inbound network traffic never produces a `SessionError`; it is screened
//! into a [`crate::Disposition`] instead. These errors only describe local
//! calls made at the wrong moment.

use thiserror::Error;

use crate::coordinator::LifecycleState;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Operation not valid in state {state:?}")]
    WrongState { state: LifecycleState },

    #[error("Only the authority can do this")]
    NotAuthority,

    #[error("Not enough participants: have {have}, need {need}")]
    NotEnoughParticipants { have: usize, need: usize },

    #[error("Local participant already eliminated")]
    AlreadyEliminated,

    #[error("Session runtime is gone")]
    RuntimeClosed,
}
