//! HyprGlide Session Protocol Types
//!
//! This crate defines the envelope and the payload catalog exchanged between
//! peers of a HyprGlide session. Every peer depends on this crate, so the
//! byte layout is identical everywhere.
//!
//! # Message Categories
//!
//! - **Control Channel** (reliable + ordered per sender): setup, spawns,
//!   eliminations, end of round, collection claims, effects, rematch
//! - **Realtime Channel** (unreliable): periodic participant state
//!
//! Payloads are flat and versionless. Round-scoped payloads carry the
//! `session_id` of the round they belong to so that late traffic from an
//! earlier round can be recognized.

#![deny(unsafe_code)]

mod envelope;
mod error;

pub use envelope::{Channel, Envelope, Inbound, MessageKind, Payload, decode, encode};
pub use error::WireError;

use hyprglide_sim::{EdgeSide, EffectKind, ObstacleSpawn, ObstacleVariant, PowerUpSpawn};
use prost::Message;

// ============================================================================
// Setup
// ============================================================================

/// Roster entry. `is_local` is a per-peer notion and never travels.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantProto {
    #[prost(string, tag = "1")]
    pub id: String,

    #[prost(string, tag = "2")]
    pub display_name: String,
}

/// Round setup produced by the authority and applied by every peer.
#[derive(Clone, PartialEq, Message)]
pub struct SetupAnnouncement {
    #[prost(string, tag = "1")]
    pub authority_id: String,

    #[prost(uint64, tag = "2")]
    pub arena_seed: u64,

    /// Absolute match start, seconds since the Unix epoch.
    #[prost(double, tag = "3")]
    pub match_start_time: f64,

    /// Roster, ordered by participant id ascending.
    #[prost(message, repeated, tag = "4")]
    pub participants: Vec<ParticipantProto>,

    /// UUID of the round, hyphenated lowercase.
    #[prost(string, tag = "5")]
    pub session_id: String,

    #[prost(uint32, tag = "6")]
    pub min_participants: u32,

    #[prost(uint32, tag = "7")]
    pub max_participants: u32,

    #[prost(bool, tag = "8")]
    pub is_rematch: bool,
}

// ============================================================================
// Realtime Channel
// ============================================================================

/// Periodic local state of the sender.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantStateUpdate {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(double, tag = "2")]
    pub position_x: f64,

    #[prost(double, tag = "3")]
    pub velocity_x: f64,

    #[prost(uint64, tag = "4")]
    pub live_score: u64,

    #[prost(bool, tag = "5")]
    pub is_alive: bool,
}

// ============================================================================
// Spawns
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ObstacleVariantProto {
    Narrow = 0,
    Wide = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EdgePunishProto {
    NoEdge = 0,
    Left = 1,
    Right = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct ObstacleSpawnAnnouncement {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(uint64, tag = "2")]
    pub spawn_index: u64,

    #[prost(double, tag = "3")]
    pub time_offset: f64,

    #[prost(double, tag = "4")]
    pub normalized_x: f64,

    #[prost(double, tag = "5")]
    pub width: f64,

    #[prost(double, tag = "6")]
    pub speed: f64,

    #[prost(enumeration = "ObstacleVariantProto", tag = "7")]
    pub variant: i32,

    #[prost(enumeration = "EdgePunishProto", tag = "8")]
    pub edge_punish: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct PowerUpSpawnAnnouncement {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(uint64, tag = "2")]
    pub spawn_index: u64,

    #[prost(double, tag = "3")]
    pub time_offset: f64,

    #[prost(double, tag = "4")]
    pub normalized_x: f64,

    #[prost(double, tag = "5")]
    pub size: f64,

    #[prost(double, tag = "6")]
    pub speed: f64,

    /// [`EffectKind::code`].
    #[prost(uint32, tag = "7")]
    pub effect: u32,

    #[prost(string, tag = "8")]
    pub instance_id: String,
}

// ============================================================================
// Round Outcome
// ============================================================================

/// The sender was eliminated (or, on the authority's behalf, disconnected).
#[derive(Clone, PartialEq, Message)]
pub struct EliminationNotice {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(uint64, tag = "2")]
    pub final_score: u64,

    /// Seconds after match start.
    #[prost(double, tag = "3")]
    pub elimination_time: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RankingEntry {
    #[prost(string, tag = "1")]
    pub participant_id: String,

    #[prost(uint64, tag = "2")]
    pub score: u64,

    /// 1-based ordinal rank.
    #[prost(uint32, tag = "3")]
    pub rank: u32,

    /// Seconds after match start; absent when the participant survived.
    #[prost(double, optional, tag = "4")]
    pub elimination_time: Option<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SessionEndAnnouncement {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(string, tag = "2")]
    pub winner_id: String,

    /// Ordered by rank ascending.
    #[prost(message, repeated, tag = "3")]
    pub rankings: Vec<RankingEntry>,

    /// SHA-256 over the authority's spawn stream.
    #[prost(bytes = "vec", tag = "4")]
    pub spawn_digest: Vec<u8>,

    #[prost(uint64, tag = "5")]
    pub obstacle_count: u64,

    #[prost(uint64, tag = "6")]
    pub power_up_count: u64,
}

// ============================================================================
// Collection & Effects
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct CollectionClaim {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(string, tag = "2")]
    pub instance_id: String,

    /// [`EffectKind::code`].
    #[prost(uint32, tag = "3")]
    pub effect: u32,

    /// Seconds after match start at which the claimant touched the power-up.
    #[prost(double, tag = "4")]
    pub claimed_at: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct EffectActivationNotice {
    #[prost(string, tag = "1")]
    pub session_id: String,

    #[prost(double, tag = "2")]
    pub duration: f64,

    /// Remaining duration after stacking onto an already-running effect.
    #[prost(double, tag = "3")]
    pub stacked_duration: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RematchRequest {
    /// Round the sender wants to follow up on.
    #[prost(string, tag = "1")]
    pub session_id: String,
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<&ObstacleSpawn> for ObstacleSpawnAnnouncement {
    fn from(o: &ObstacleSpawn) -> Self {
        let variant = match o.variant {
            ObstacleVariant::Narrow => ObstacleVariantProto::Narrow,
            ObstacleVariant::Wide => ObstacleVariantProto::Wide,
        };
        let edge_punish = match o.edge_punish {
            None => EdgePunishProto::NoEdge,
            Some(EdgeSide::Left) => EdgePunishProto::Left,
            Some(EdgeSide::Right) => EdgePunishProto::Right,
        };
        Self {
            session_id: String::new(), // Must be set by caller
            spawn_index: o.spawn_index,
            time_offset: o.time_offset,
            normalized_x: o.normalized_x,
            width: o.width,
            speed: o.speed,
            variant: variant as i32,
            edge_punish: edge_punish as i32,
        }
    }
}

impl TryFrom<&ObstacleSpawnAnnouncement> for ObstacleSpawn {
    type Error = &'static str;

    fn try_from(a: &ObstacleSpawnAnnouncement) -> Result<Self, Self::Error> {
        if ![a.time_offset, a.normalized_x, a.width, a.speed]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err("obstacle fields must be finite");
        }
        let variant = match ObstacleVariantProto::try_from(a.variant) {
            Ok(ObstacleVariantProto::Narrow) => ObstacleVariant::Narrow,
            Ok(ObstacleVariantProto::Wide) => ObstacleVariant::Wide,
            Err(_) => return Err("unknown obstacle variant"),
        };
        let edge_punish = match EdgePunishProto::try_from(a.edge_punish) {
            Ok(EdgePunishProto::NoEdge) => None,
            Ok(EdgePunishProto::Left) => Some(EdgeSide::Left),
            Ok(EdgePunishProto::Right) => Some(EdgeSide::Right),
            Err(_) => return Err("unknown edge side"),
        };
        Ok(Self {
            spawn_index: a.spawn_index,
            time_offset: a.time_offset,
            normalized_x: a.normalized_x,
            width: a.width,
            speed: a.speed,
            variant,
            edge_punish,
        })
    }
}

impl From<&PowerUpSpawn> for PowerUpSpawnAnnouncement {
    fn from(p: &PowerUpSpawn) -> Self {
        Self {
            session_id: String::new(), // Must be set by caller
            spawn_index: p.spawn_index,
            time_offset: p.time_offset,
            normalized_x: p.normalized_x,
            size: p.size,
            speed: p.speed,
            effect: p.effect.code(),
            instance_id: p.instance_id.clone(),
        }
    }
}

impl TryFrom<&PowerUpSpawnAnnouncement> for PowerUpSpawn {
    type Error = &'static str;

    fn try_from(a: &PowerUpSpawnAnnouncement) -> Result<Self, Self::Error> {
        if ![a.time_offset, a.normalized_x, a.size, a.speed]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err("power-up fields must be finite");
        }
        if a.instance_id.is_empty() {
            return Err("power-up instance_id must not be empty");
        }
        let effect = EffectKind::from_code(a.effect).ok_or("unknown effect code")?;
        Ok(Self {
            spawn_index: a.spawn_index,
            time_offset: a.time_offset,
            normalized_x: a.normalized_x,
            size: a.size,
            speed: a.speed,
            effect,
            instance_id: a.instance_id.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_obstacle() -> ObstacleSpawn {
        ObstacleSpawn {
            spawn_index: 4,
            time_offset: 12.25,
            normalized_x: 0.031,
            width: 0.27,
            speed: 0.81,
            variant: ObstacleVariant::Wide,
            edge_punish: Some(EdgeSide::Right),
        }
    }

    #[test]
    fn test_setup_announcement_roundtrip() {
        let msg = SetupAnnouncement {
            authority_id: "a".to_string(),
            arena_seed: u64::MAX - 3,
            match_start_time: 1_760_000_000.125,
            participants: vec![
                ParticipantProto {
                    id: "a".to_string(),
                    display_name: "Ada".to_string(),
                },
                ParticipantProto {
                    id: "b".to_string(),
                    display_name: "Bo".to_string(),
                },
            ],
            session_id: "0b5c7c7e-7f5e-4b59-9d4c-7d1f7a1b2c3d".to_string(),
            min_participants: 2,
            max_participants: 4,
            is_rematch: true,
        };
        let encoded = msg.encode_to_vec();
        let decoded = SetupAnnouncement::decode(encoded.as_slice()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_obstacle_conversion_preserves_bits() {
        let spawn = sample_obstacle();
        let proto = ObstacleSpawnAnnouncement::from(&spawn);
        let bytes = proto.encode_to_vec();
        let decoded = ObstacleSpawnAnnouncement::decode(bytes.as_slice()).unwrap();
        let back = ObstacleSpawn::try_from(&decoded).unwrap();

        assert_eq!(back, spawn);
        assert_eq!(back.normalized_x.to_bits(), spawn.normalized_x.to_bits());
    }

    #[test]
    fn test_obstacle_rejects_unknown_variant() {
        let mut proto = ObstacleSpawnAnnouncement::from(&sample_obstacle());
        proto.variant = 9;
        assert_eq!(
            ObstacleSpawn::try_from(&proto),
            Err("unknown obstacle variant")
        );
    }

    #[test]
    fn test_obstacle_rejects_non_finite() {
        let mut proto = ObstacleSpawnAnnouncement::from(&sample_obstacle());
        proto.speed = f64::NAN;
        assert!(ObstacleSpawn::try_from(&proto).is_err());
    }

    #[test]
    fn test_power_up_conversion() {
        let spawn = PowerUpSpawn {
            spawn_index: 7,
            time_offset: 33.0,
            normalized_x: 0.5,
            size: 0.07,
            speed: 0.4,
            effect: EffectKind::Shield,
            instance_id: "powerup_7".to_string(),
        };
        let proto = PowerUpSpawnAnnouncement::from(&spawn);
        assert_eq!(proto.effect, 1);
        assert_eq!(PowerUpSpawn::try_from(&proto).unwrap(), spawn);

        let mut bad = proto.clone();
        bad.effect = 42;
        assert_eq!(PowerUpSpawn::try_from(&bad), Err("unknown effect code"));

        let mut anonymous = proto;
        anonymous.instance_id.clear();
        assert!(PowerUpSpawn::try_from(&anonymous).is_err());
    }

    #[test]
    fn test_session_end_roundtrip() {
        let msg = SessionEndAnnouncement {
            session_id: "s".to_string(),
            winner_id: "p1".to_string(),
            rankings: vec![
                RankingEntry {
                    participant_id: "p1".to_string(),
                    score: 5000,
                    rank: 1,
                    elimination_time: None,
                },
                RankingEntry {
                    participant_id: "p2".to_string(),
                    score: 3000,
                    rank: 2,
                    elimination_time: Some(41.5),
                },
            ],
            spawn_digest: vec![0xab; 32],
            obstacle_count: 40,
            power_up_count: 5,
        };
        let decoded = SessionEndAnnouncement::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(msg, decoded);
    }
}
