//! Inbound message screening.
//!
//! Screening rules, applied in order:
//! - Coordinator disconnected: DROP
//! - Coordinator still connecting: DROP (a setup is held by the coordinator
//!   and applied once the peer group forms)
//! - Envelope sender differs from the transport peer: DROP
//! - Own echo: DROP
//! - Sender not in the connected roster: DROP
//! - Payload not valid in the current lifecycle state: DROP
//! - Authority-only payload from a non-authority: DROP
//! - Round-scoped payload for another round: DROP
//!
//! Payload-level checks (setup validity, rematch opt-in, spawn fields) are
//! done by the coordinator after screening and use the same [`Disposition`].

use hyprglide_wire::{Inbound, Payload};

use crate::coordinator::LifecycleState;
use crate::participant::Participant;

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Message applied to coordinator state.
    Applied,
    /// Held until the local peer group forms.
    Deferred,
    /// Dropped: bytes did not decode.
    DroppedUndecodable,
    /// Dropped: coordinator is disconnected.
    DroppedDisconnected,
    /// Dropped: not valid in the current lifecycle state.
    DroppedWrongState { state: LifecycleState },
    /// Dropped: envelope sender differs from the transport peer.
    DroppedSenderMismatch,
    /// Dropped: our own message came back.
    DroppedOwnEcho,
    /// Dropped: sender is not a connected participant.
    DroppedUnknownParticipant,
    /// Dropped: authority-only payload from someone else.
    DroppedNotFromAuthority,
    /// Dropped: rematch request reached a peer that is not the authority.
    DroppedNotAuthority,
    /// Dropped: payload belongs to a different round.
    DroppedStaleRound,
    /// Dropped: rematch setup for a peer that never opted in.
    DroppedNotOptedIn,
    /// Dropped: setup roster does not include the local participant.
    DroppedNotInRoster,
    /// Dropped: payload fields failed validation.
    DroppedInvalid { reason: &'static str },
    /// Dropped: already applied (at-least-once redelivery).
    DroppedDuplicate,
    /// Dropped: an earlier claim on the power-up is already recorded.
    DroppedLateClaim,
}

impl Disposition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Coordinator state needed to screen a message.
#[derive(Debug, Clone, Copy)]
pub struct ScreenContext<'a> {
    pub state: LifecycleState,
    pub local_id: &'a str,
    pub authority_id: Option<&'a str>,
    /// Connected participants, local included.
    pub roster: &'a [Participant],
    /// Session id of the current or most recent round.
    pub session_id: Option<&'a str>,
}

impl ScreenContext<'_> {
    fn is_authority(&self, id: &str) -> bool {
        self.authority_id == Some(id)
    }

    fn round_matches(&self, session_id: &str) -> bool {
        self.session_id == Some(session_id)
    }
}

/// Screen a decoded message received from transport peer `from`.
pub fn screen(from: &str, inbound: &Inbound, ctx: &ScreenContext<'_>) -> Result<(), Disposition> {
    use LifecycleState::*;

    match ctx.state {
        Disconnected => return Err(Disposition::DroppedDisconnected),
        Connecting => return Err(Disposition::DroppedWrongState { state: ctx.state }),
        Connected | Active | Ended => {}
    }

    let sender = inbound.sender_id.as_str();
    if sender != from {
        return Err(Disposition::DroppedSenderMismatch);
    }
    if sender == ctx.local_id {
        return Err(Disposition::DroppedOwnEcho);
    }
    if !ctx.roster.iter().any(|p| p.id == sender) {
        return Err(Disposition::DroppedUnknownParticipant);
    }

    let wrong_state = Disposition::DroppedWrongState { state: ctx.state };
    let (allowed, authority_only, session_id) = match &inbound.payload {
        Payload::Setup(_) => (matches!(ctx.state, Connected | Ended), true, None),
        Payload::Obstacle(m) => (ctx.state == Active, true, Some(m.session_id.as_str())),
        Payload::PowerUp(m) => (ctx.state == Active, true, Some(m.session_id.as_str())),
        Payload::SessionEnd(m) => {
            if ctx.state == Ended && ctx.round_matches(&m.session_id) {
                return Err(Disposition::DroppedDuplicate);
            }
            (ctx.state == Active, true, Some(m.session_id.as_str()))
        }
        Payload::State(m) => (ctx.state == Active, false, Some(m.session_id.as_str())),
        Payload::Elimination(m) => (ctx.state == Active, false, Some(m.session_id.as_str())),
        Payload::Claim(m) => (ctx.state == Active, false, Some(m.session_id.as_str())),
        Payload::Effect(m) => (ctx.state == Active, false, Some(m.session_id.as_str())),
        Payload::Rematch(m) => {
            if !matches!(ctx.state, Connected | Ended) {
                return Err(wrong_state);
            }
            if !ctx.is_authority(ctx.local_id) {
                return Err(Disposition::DroppedNotAuthority);
            }
            (true, false, Some(m.session_id.as_str()))
        }
    };

    if !allowed {
        return Err(wrong_state);
    }
    if authority_only && !ctx.is_authority(sender) {
        return Err(Disposition::DroppedNotFromAuthority);
    }
    if let Some(session_id) = session_id
        && !ctx.round_matches(session_id)
    {
        return Err(Disposition::DroppedStaleRound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyprglide_wire::{
        CollectionClaim, ObstacleSpawnAnnouncement, ParticipantStateUpdate, RematchRequest,
        SessionEndAnnouncement, SetupAnnouncement,
    };

    fn roster() -> Vec<Participant> {
        vec![
            Participant::new("a", "A", false),
            Participant::new("b", "B", true),
            Participant::new("c", "C", false),
        ]
    }

    fn ctx(state: LifecycleState, roster: &[Participant]) -> ScreenContext<'_> {
        ScreenContext {
            state,
            local_id: "b",
            authority_id: Some("a"),
            roster,
            session_id: Some("round-1"),
        }
    }

    fn inbound(sender: &str, payload: Payload) -> Inbound {
        Inbound {
            sender_id: sender.to_string(),
            timestamp: 0.0,
            payload,
        }
    }

    fn state_update(session_id: &str) -> Payload {
        Payload::State(ParticipantStateUpdate {
            session_id: session_id.to_string(),
            ..Default::default()
        })
    }

    fn obstacle(session_id: &str) -> Payload {
        Payload::Obstacle(ObstacleSpawnAnnouncement {
            session_id: session_id.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_disconnected_drops_everything() {
        let r = roster();
        let msg = inbound("a", state_update("round-1"));
        assert_eq!(
            screen("a", &msg, &ctx(LifecycleState::Disconnected, &r)),
            Err(Disposition::DroppedDisconnected)
        );
    }

    #[test]
    fn test_sender_identity_checks() {
        let r = roster();
        let active = ctx(LifecycleState::Active, &r);

        let spoofed = inbound("a", state_update("round-1"));
        assert_eq!(screen("c", &spoofed, &active), Err(Disposition::DroppedSenderMismatch));

        let echo = inbound("b", state_update("round-1"));
        assert_eq!(screen("b", &echo, &active), Err(Disposition::DroppedOwnEcho));

        let stranger = inbound("x", state_update("round-1"));
        assert_eq!(
            screen("x", &stranger, &active),
            Err(Disposition::DroppedUnknownParticipant)
        );
    }

    #[test]
    fn test_spawns_only_from_authority() {
        let r = roster();
        let active = ctx(LifecycleState::Active, &r);

        assert_eq!(screen("a", &inbound("a", obstacle("round-1")), &active), Ok(()));
        assert_eq!(
            screen("c", &inbound("c", obstacle("round-1")), &active),
            Err(Disposition::DroppedNotFromAuthority)
        );
    }

    #[test]
    fn test_stale_round_dropped() {
        let r = roster();
        let active = ctx(LifecycleState::Active, &r);
        assert_eq!(
            screen("c", &inbound("c", state_update("round-0")), &active),
            Err(Disposition::DroppedStaleRound)
        );
    }

    #[test]
    fn test_round_payloads_need_active() {
        let r = roster();
        let claim = Payload::Claim(CollectionClaim {
            session_id: "round-1".to_string(),
            ..Default::default()
        });
        assert_eq!(
            screen("c", &inbound("c", claim), &ctx(LifecycleState::Connected, &r)),
            Err(Disposition::DroppedWrongState {
                state: LifecycleState::Connected
            })
        );
    }

    #[test]
    fn test_setup_screening() {
        let r = roster();
        let setup = Payload::Setup(SetupAnnouncement::default());

        assert_eq!(
            screen("a", &inbound("a", setup.clone()), &ctx(LifecycleState::Connected, &r)),
            Ok(())
        );
        assert_eq!(
            screen("c", &inbound("c", setup.clone()), &ctx(LifecycleState::Connected, &r)),
            Err(Disposition::DroppedNotFromAuthority)
        );
        assert!(matches!(
            screen("a", &inbound("a", setup), &ctx(LifecycleState::Active, &r)),
            Err(Disposition::DroppedWrongState { .. })
        ));
    }

    #[test]
    fn test_repeated_session_end_is_duplicate() {
        let r = roster();
        let end = Payload::SessionEnd(SessionEndAnnouncement {
            session_id: "round-1".to_string(),
            ..Default::default()
        });
        assert_eq!(
            screen("a", &inbound("a", end), &ctx(LifecycleState::Ended, &r)),
            Err(Disposition::DroppedDuplicate)
        );
    }

    #[test]
    fn test_rematch_request_needs_local_authority() {
        let r = roster();
        let request = Payload::Rematch(RematchRequest {
            session_id: "round-1".to_string(),
        });

        assert_eq!(
            screen("c", &inbound("c", request.clone()), &ctx(LifecycleState::Ended, &r)),
            Err(Disposition::DroppedNotAuthority)
        );

        let as_authority = ScreenContext {
            local_id: "a",
            ..ctx(LifecycleState::Ended, &r)
        };
        assert_eq!(screen("c", &inbound("c", request), &as_authority), Ok(()));
    }
}
