//! HyprGlide Session Coordination
//!
//! Peer-to-peer session layer for HyprGlide multiplayer. Every peer runs one
//! [`SessionCoordinator`]; there is no server. The coordinator owns:
//! - Lifecycle (`Disconnected → Connecting → Connected → Active → Ended`)
//! - Authority election over the connected roster
//! - Round setup, spawn generation and broadcast (authority only)
//! - Replay of announced spawns through an `EventStream` (every peer)
//! - Elimination tracking, rankings and round end
//! - Power-up collection arbitration and shared effects
//! - Rematch ballots
//!
//! # Architecture
//!
//! The coordinator is plain synchronous state. Transport and simulation are
//! injected through the [`Transport`] and [`SimulationPort`] traits, and time
//! enters only as explicit `now` arguments. [`SessionRuntime`] moves a
//! coordinator onto a single tokio task and drives its timers; callers on
//! other threads talk to it through a cloneable [`SessionHandle`].
//!
//! Nothing in this crate treats a network problem as fatal. Undecodable or
//! out-of-place messages are dropped with a [`Disposition`] describing why.

#![deny(unsafe_code)]

pub mod arbiter;
pub mod coordinator;
pub mod error;
pub mod loopback;
pub mod participant;
pub mod ports;
pub mod ranking;
pub mod runtime;
pub mod setup;
pub mod validation;

pub use arbiter::{Claim, CollectionArbiter, RemoteClaimOutcome};
pub use coordinator::{LifecycleState, RoundOutcome, SessionCoordinator, SessionStatus};
pub use error::SessionError;
pub use participant::{Participant, ParticipantId, ParticipantRuntimeState, elect_authority};
pub use ports::{Clock, LocalKinematics, SimulationPort, SystemClock, TokioClock, Transport};
pub use ranking::{Ranking, compute_rankings};
pub use runtime::{SessionHandle, SessionRuntime};
pub use setup::SessionSetup;
pub use validation::Disposition;

use hyprglide_sim::{DifficultyCurve, LingerConfig, Seconds};

// ============================================================================
// Session Parameters
// ============================================================================

/// Smallest roster that can start a round.
pub const MIN_PARTICIPANTS: usize = 2;

/// Largest roster a session accepts.
pub const MAX_PARTICIPANTS: usize = 4;

/// Warm-up before match start when the roster is below capacity.
pub const WARMUP_BELOW_CAPACITY_SECS: Seconds = 5.0;

/// Warm-up before match start when the roster is full.
pub const WARMUP_FULL_SECS: Seconds = 3.0;

/// Local state broadcast rate.
pub const BROADCAST_HZ: u32 = 15;

/// Rate at which the runtime advances spawn generation and replay.
pub const UPDATE_HZ: u32 = 60;

/// How far ahead of its due time a spawn is announced.
pub const SPAWN_LEAD_SECS: Seconds = 0.75;

// ============================================================================
// Configuration
// ============================================================================

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub min_participants: usize,
    pub max_participants: usize,
    pub warmup_below_capacity_secs: Seconds,
    pub warmup_full_secs: Seconds,
    pub broadcast_hz: u32,
    pub update_hz: u32,
    pub spawn_lead_secs: Seconds,
    pub difficulty: DifficultyCurve,
    pub linger: LingerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_participants: MIN_PARTICIPANTS,
            max_participants: MAX_PARTICIPANTS,
            warmup_below_capacity_secs: WARMUP_BELOW_CAPACITY_SECS,
            warmup_full_secs: WARMUP_FULL_SECS,
            broadcast_hz: BROADCAST_HZ,
            update_hz: UPDATE_HZ,
            spawn_lead_secs: SPAWN_LEAD_SECS,
            difficulty: DifficultyCurve::default(),
            linger: LingerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Warm-up length for a roster of `roster_len` participants.
    pub fn warmup_for(&self, roster_len: usize) -> Seconds {
        if roster_len >= self.max_participants {
            self.warmup_full_secs
        } else {
            self.warmup_below_capacity_secs
        }
    }
}
