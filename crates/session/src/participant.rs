//! Participants, per-round runtime state, and authority election.

use hyprglide_sim::Seconds;
use hyprglide_wire::ParticipantProto;

/// Opaque participant identifier; the sort key for authority election.
pub type ParticipantId = String;

/// A peer taking part in the session. Immutable once the session connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    /// True only on the peer this participant runs on.
    pub is_local: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, is_local: bool) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_local,
        }
    }

    pub fn to_proto(&self) -> ParticipantProto {
        ParticipantProto {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Rebuild from the wire, deriving `is_local` from the receiving peer's id.
    pub fn from_proto(proto: &ParticipantProto, local_id: &str) -> Self {
        Self {
            id: proto.id.clone(),
            display_name: proto.display_name.clone(),
            is_local: proto.id == local_id,
        }
    }
}

/// Sort by id and drop repeated ids, keeping the first occurrence.
pub fn canonical_roster(mut roster: Vec<Participant>) -> Vec<Participant> {
    roster.sort_by(|a, b| a.id.cmp(&b.id));
    roster.dedup_by(|a, b| a.id == b.id);
    roster
}

/// The participant with the lexicographically smallest id.
///
/// Pure function of the roster's membership; order does not matter.
pub fn elect_authority<'a, I>(roster: I) -> Option<&'a Participant>
where
    I: IntoIterator<Item = &'a Participant>,
{
    roster.into_iter().min_by(|a, b| a.id.cmp(&b.id))
}

/// Per-participant state for the current round.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRuntimeState {
    pub position_x: f64,
    pub velocity_x: f64,
    pub live_score: u64,
    pub is_alive: bool,
    pub final_score: Option<u64>,
    /// Seconds after match start.
    pub elimination_time: Option<Seconds>,
}

impl Default for ParticipantRuntimeState {
    fn default() -> Self {
        Self {
            position_x: 0.5,
            velocity_x: 0.0,
            live_score: 0,
            is_alive: true,
            final_score: None,
            elimination_time: None,
        }
    }
}

impl ParticipantRuntimeState {
    /// Mark eliminated. Returns false if already eliminated.
    pub fn eliminate(&mut self, final_score: u64, at: Seconds) -> bool {
        if !self.is_alive {
            return false;
        }
        self.is_alive = false;
        self.final_score = Some(final_score);
        self.elimination_time = Some(at);
        true
    }

    /// Overwrite kinematics with the latest received values.
    ///
    /// The score never moves backwards, which absorbs most reordering on
    /// the realtime channel.
    pub fn apply_update(&mut self, position_x: f64, velocity_x: f64, live_score: u64) {
        self.position_x = position_x;
        self.velocity_x = velocity_x;
        self.live_score = self.live_score.max(live_score);
    }

    /// Score used for ranking: final score, or live score while alive.
    pub fn ranking_score(&self) -> u64 {
        self.final_score.unwrap_or(self.live_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roster(ids: &[&str]) -> Vec<Participant> {
        ids.iter().map(|id| Participant::new(*id, *id, false)).collect()
    }

    #[test]
    fn test_three_peers_elect_same_authority() {
        // Each peer sees the roster in its own order.
        let peer_views = [
            roster(&["b", "a", "c"]),
            roster(&["c", "b", "a"]),
            roster(&["a", "c", "b"]),
        ];
        for view in &peer_views {
            assert_eq!(elect_authority(view).map(|p| p.id.as_str()), Some("a"));
        }
    }

    #[test]
    fn test_election_is_bytewise_lexicographic() {
        let r = roster(&["peer-10", "peer-9", "Peer-2"]);
        assert_eq!(elect_authority(&r).unwrap().id, "Peer-2");
        assert!(elect_authority(&Vec::new()).is_none());
    }

    #[test]
    fn test_canonical_roster_sorts_and_dedups() {
        let r = canonical_roster(roster(&["c", "a", "c", "b"]));
        let ids: Vec<&str> = r.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_proto_roundtrip_sets_is_local() {
        let p = Participant::new("me", "Me", true);
        let proto = p.to_proto();
        assert_eq!(Participant::from_proto(&proto, "me"), p);
        assert!(!Participant::from_proto(&proto, "other").is_local);
    }

    #[test]
    fn test_eliminate_once() {
        let mut state = ParticipantRuntimeState::default();
        state.apply_update(0.2, 0.1, 900);
        assert_eq!(state.ranking_score(), 900);

        assert!(state.eliminate(1000, 12.0));
        assert!(!state.eliminate(5, 13.0));
        assert_eq!(state.final_score, Some(1000));
        assert_eq!(state.elimination_time, Some(12.0));
        assert_eq!(state.ranking_score(), 1000);
    }

    #[test]
    fn test_stale_update_keeps_higher_score() {
        let mut state = ParticipantRuntimeState::default();
        state.apply_update(0.3, 0.0, 500);
        state.apply_update(0.25, -0.1, 480);
        assert_eq!(state.live_score, 500);
        assert_eq!(state.position_x, 0.25);
    }

    proptest! {
        #[test]
        fn prop_election_order_independent(
            mut ids in proptest::collection::vec("[a-z0-9]{1,6}", 1..8),
            rotate in 0usize..8,
        ) {
            let forward = roster(&ids.iter().map(String::as_str).collect::<Vec<_>>());
            let expected = elect_authority(&forward).unwrap().id.clone();

            let len = ids.len();
            ids.rotate_left(rotate % len);
            ids.reverse();
            let shuffled = roster(&ids.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(&elect_authority(&shuffled).unwrap().id, &expected);
        }
    }
}
