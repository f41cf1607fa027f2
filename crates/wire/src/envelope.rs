//! Envelope framing and payload dispatch.
//!
//! An envelope is `{kind, payload bytes, sender_id, timestamp}`; each kind
//! maps 1:1 to one payload message. Decoding never panics, and the session
//! layer treats any [`WireError`] as "drop and continue".

use prost::Message;

use crate::{
    CollectionClaim, EffectActivationNotice, EliminationNotice, ObstacleSpawnAnnouncement,
    ParticipantStateUpdate, PowerUpSpawnAnnouncement, RematchRequest, SessionEndAnnouncement,
    SetupAnnouncement, WireError,
};

/// Payload kind tag carried by every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageKind {
    SetupAnnouncement = 0,
    ParticipantStateUpdate = 1,
    ObstacleSpawnAnnouncement = 2,
    PowerUpSpawnAnnouncement = 3,
    EliminationNotice = 4,
    SessionEndAnnouncement = 5,
    CollectionClaim = 6,
    EffectActivationNotice = 7,
    RematchRequest = 8,
}

/// Outer wrapper of every message on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(enumeration = "MessageKind", tag = "1")]
    pub kind: i32,

    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,

    #[prost(string, tag = "3")]
    pub sender_id: String,

    /// Sender's wall clock, seconds since the Unix epoch.
    #[prost(double, tag = "4")]
    pub timestamp: f64,
}

/// Delivery mode requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Reliable, ordered per sender.
    Control,
    /// Unreliable; may drop or reorder.
    Realtime,
}

/// Typed payload of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Setup(SetupAnnouncement),
    State(ParticipantStateUpdate),
    Obstacle(ObstacleSpawnAnnouncement),
    PowerUp(PowerUpSpawnAnnouncement),
    Elimination(EliminationNotice),
    SessionEnd(SessionEndAnnouncement),
    Claim(CollectionClaim),
    Effect(EffectActivationNotice),
    Rematch(RematchRequest),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Setup(_) => MessageKind::SetupAnnouncement,
            Self::State(_) => MessageKind::ParticipantStateUpdate,
            Self::Obstacle(_) => MessageKind::ObstacleSpawnAnnouncement,
            Self::PowerUp(_) => MessageKind::PowerUpSpawnAnnouncement,
            Self::Elimination(_) => MessageKind::EliminationNotice,
            Self::SessionEnd(_) => MessageKind::SessionEndAnnouncement,
            Self::Claim(_) => MessageKind::CollectionClaim,
            Self::Effect(_) => MessageKind::EffectActivationNotice,
            Self::Rematch(_) => MessageKind::RematchRequest,
        }
    }

    /// Only periodic state rides the unreliable channel.
    pub fn channel(&self) -> Channel {
        match self {
            Self::State(_) => Channel::Realtime,
            _ => Channel::Control,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            Self::Setup(m) => m.encode_to_vec(),
            Self::State(m) => m.encode_to_vec(),
            Self::Obstacle(m) => m.encode_to_vec(),
            Self::PowerUp(m) => m.encode_to_vec(),
            Self::Elimination(m) => m.encode_to_vec(),
            Self::SessionEnd(m) => m.encode_to_vec(),
            Self::Claim(m) => m.encode_to_vec(),
            Self::Effect(m) => m.encode_to_vec(),
            Self::Rematch(m) => m.encode_to_vec(),
        }
    }

    fn decode_body(kind: MessageKind, body: &[u8]) -> Result<Self, prost::DecodeError> {
        Ok(match kind {
            MessageKind::SetupAnnouncement => Self::Setup(SetupAnnouncement::decode(body)?),
            MessageKind::ParticipantStateUpdate => {
                Self::State(ParticipantStateUpdate::decode(body)?)
            }
            MessageKind::ObstacleSpawnAnnouncement => {
                Self::Obstacle(ObstacleSpawnAnnouncement::decode(body)?)
            }
            MessageKind::PowerUpSpawnAnnouncement => {
                Self::PowerUp(PowerUpSpawnAnnouncement::decode(body)?)
            }
            MessageKind::EliminationNotice => Self::Elimination(EliminationNotice::decode(body)?),
            MessageKind::SessionEndAnnouncement => {
                Self::SessionEnd(SessionEndAnnouncement::decode(body)?)
            }
            MessageKind::CollectionClaim => Self::Claim(CollectionClaim::decode(body)?),
            MessageKind::EffectActivationNotice => {
                Self::Effect(EffectActivationNotice::decode(body)?)
            }
            MessageKind::RematchRequest => Self::Rematch(RematchRequest::decode(body)?),
        })
    }
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub sender_id: String,
    pub timestamp: f64,
    pub payload: Payload,
}

/// Serialize `payload` into envelope bytes.
pub fn encode(sender_id: &str, timestamp: f64, payload: &Payload) -> Vec<u8> {
    Envelope {
        kind: payload.kind() as i32,
        payload: payload.encode_body(),
        sender_id: sender_id.to_string(),
        timestamp,
    }
    .encode_to_vec()
}

/// Parse envelope bytes into a typed payload.
pub fn decode(bytes: &[u8]) -> Result<Inbound, WireError> {
    let envelope = Envelope::decode(bytes)?;
    let kind =
        MessageKind::try_from(envelope.kind).map_err(|_| WireError::UnknownKind(envelope.kind))?;
    if envelope.sender_id.is_empty() {
        return Err(WireError::MissingSender);
    }
    if !envelope.timestamp.is_finite() {
        return Err(WireError::InvalidTimestamp);
    }
    let payload = Payload::decode_body(kind, &envelope.payload)
        .map_err(|source| WireError::Payload { kind, source })?;

    Ok(Inbound {
        sender_id: envelope.sender_id,
        timestamp: envelope.timestamp,
        payload,
    })
}
