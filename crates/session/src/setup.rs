//! Round setup shared by every peer.

use hyprglide_wire::SetupAnnouncement;
use uuid::Uuid;

use crate::participant::{Participant, canonical_roster};

/// Everything a peer needs to start a round.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub authority_id: String,
    pub arena_seed: u64,
    /// Absolute, seconds since the Unix epoch.
    pub match_start_time: f64,
    /// Ordered by id.
    pub participants: Vec<Participant>,
    pub session_id: Uuid,
    pub min_participants: usize,
    pub max_participants: usize,
    pub is_rematch: bool,
}

impl SessionSetup {
    pub fn to_proto(&self) -> SetupAnnouncement {
        SetupAnnouncement {
            authority_id: self.authority_id.clone(),
            arena_seed: self.arena_seed,
            match_start_time: self.match_start_time,
            participants: self.participants.iter().map(Participant::to_proto).collect(),
            session_id: self.session_id.hyphenated().to_string(),
            min_participants: u32::try_from(self.min_participants).unwrap_or(u32::MAX),
            max_participants: u32::try_from(self.max_participants).unwrap_or(u32::MAX),
            is_rematch: self.is_rematch,
        }
    }

    /// Validate an announcement and rebuild the setup as seen by `local_id`.
    pub fn from_proto(proto: &SetupAnnouncement, local_id: &str) -> Result<Self, &'static str> {
        let session_id = Uuid::parse_str(&proto.session_id).map_err(|_| "bad session id")?;
        if !proto.match_start_time.is_finite() {
            return Err("non-finite match start time");
        }
        if proto.participants.iter().any(|p| p.id.is_empty()) {
            return Err("empty participant id");
        }
        let participants = canonical_roster(
            proto
                .participants
                .iter()
                .map(|p| Participant::from_proto(p, local_id))
                .collect(),
        );
        if participants.len() != proto.participants.len() {
            return Err("duplicate participant id");
        }
        if !participants.iter().any(|p| p.id == proto.authority_id) {
            return Err("authority not in roster");
        }

        Ok(Self {
            authority_id: proto.authority_id.clone(),
            arena_seed: proto.arena_seed,
            match_start_time: proto.match_start_time,
            participants,
            session_id,
            min_participants: proto.min_participants as usize,
            max_participants: proto.max_participants as usize,
            is_rematch: proto.is_rematch,
        })
    }

    pub fn includes(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SessionSetup {
        SessionSetup {
            authority_id: "a".to_string(),
            arena_seed: 0xDEAD_BEEF,
            match_start_time: 1_760_000_005.0,
            participants: vec![
                Participant::new("a", "Ada", true),
                Participant::new("b", "Bo", false),
            ],
            session_id: Uuid::new_v4(),
            min_participants: 2,
            max_participants: 4,
            is_rematch: false,
        }
    }

    #[test]
    fn test_proto_roundtrip_from_authority_view() {
        let original = setup();
        let decoded = SessionSetup::from_proto(&original.to_proto(), "a").unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_receiver_sees_itself_as_local() {
        let decoded = SessionSetup::from_proto(&setup().to_proto(), "b").unwrap();
        assert!(!decoded.participants[0].is_local);
        assert!(decoded.participants[1].is_local);
        assert!(decoded.includes("b"));
        assert!(!decoded.includes("z"));
    }

    #[test]
    fn test_roster_sorted_on_receive() {
        let mut proto = setup().to_proto();
        proto.participants.reverse();
        let decoded = SessionSetup::from_proto(&proto, "a").unwrap();
        assert_eq!(decoded.participants[0].id, "a");
    }

    #[test]
    fn test_invalid_announcements_rejected() {
        let mut bad_id = setup().to_proto();
        bad_id.session_id = "not-a-uuid".to_string();
        assert!(SessionSetup::from_proto(&bad_id, "a").is_err());

        let mut dup = setup().to_proto();
        dup.participants.push(dup.participants[0].clone());
        assert_eq!(
            SessionSetup::from_proto(&dup, "a"),
            Err("duplicate participant id")
        );

        let mut orphan = setup().to_proto();
        orphan.authority_id = "z".to_string();
        assert_eq!(
            SessionSetup::from_proto(&orphan, "a"),
            Err("authority not in roster")
        );

        let mut nan = setup().to_proto();
        nan.match_start_time = f64::NAN;
        assert!(SessionSetup::from_proto(&nan, "a").is_err());
    }
}
