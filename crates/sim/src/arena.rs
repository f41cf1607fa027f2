//! Arena spawn generation.
//!
//! The authority calls [`ArenaEventGenerator`] with the round's single
//! [`DeterministicGenerator`]; every other peer only replays what it receives.
//! The draw order inside each call is normative: a peer seeded identically
//! and fed the same `(difficulty, elapsed)` sequence reproduces every event.
//!
//! Draw order:
//! - obstacle: variant, width, edge, side (only if edge), x
//! - edge-punish obstacle: width
//! - power-up: effect, x

use crate::{DeterministicGenerator, Seconds, SpawnIndex, clamp_unit, lerp};

// ============================================================================
// Spawn Policy Constants (Normative)
// ============================================================================

/// Probability of the narrow/fast variant at difficulty 0.
pub const NARROW_PROBABILITY_MIN: f64 = 0.3;
/// Probability of the narrow/fast variant at difficulty 1.
pub const NARROW_PROBABILITY_MAX: f64 = 0.7;

/// Speed multiplier applied to narrow obstacles.
pub const NARROW_SPEED_FACTOR: f64 = 1.2;
/// Speed multiplier applied to wide obstacles.
pub const WIDE_SPEED_FACTOR: f64 = 0.9;

/// Base vertical speed at difficulty 0, in arena heights per second.
pub const OBSTACLE_SPEED_MIN: f64 = 0.45;
/// Base vertical speed at difficulty 1, in arena heights per second.
pub const OBSTACLE_SPEED_MAX: f64 = 1.1;

/// Normalized width range of narrow obstacles.
pub const NARROW_WIDTH: std::ops::Range<f64> = 0.08..0.14;
/// Normalized width range of wide obstacles.
pub const WIDE_WIDTH: std::ops::Range<f64> = 0.22..0.32;

/// Probability of forced edge placement at difficulty 0.
pub const EDGE_PROBABILITY_MIN: f64 = 0.15;
/// Probability of forced edge placement at difficulty 1.
pub const EDGE_PROBABILITY_MAX: f64 = 0.45;

/// Placement band hugging the left edge.
pub const LEFT_EDGE_BAND: std::ops::Range<f64> = 0.02..0.12;
/// Placement band hugging the right edge.
pub const RIGHT_EDGE_BAND: std::ops::Range<f64> = 0.88..0.98;
/// Placement band used when no edge is forced.
pub const CENTER_BAND: std::ops::Range<f64> = 0.15..0.85;

/// Placement band of power-ups.
pub const POWER_UP_BAND: std::ops::Range<f64> = 0.1..0.9;
/// Power-up size at difficulty 0 / 1.
pub const POWER_UP_SIZE: (f64, f64) = (0.09, 0.06);
/// Power-up fall speed at difficulty 0 / 1.
pub const POWER_UP_SPEED: (f64, f64) = (0.3, 0.6);

// ============================================================================
// Spawn Types
// ============================================================================

/// Obstacle shape variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObstacleVariant {
    /// Narrow and fast.
    Narrow,
    /// Wide and slow.
    Wide,
}

/// Arena boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeSide {
    Left,
    Right,
}

/// Effect granted by a power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Slows the whole arena for every participant.
    SlowMotion,
    /// Absorbs one obstacle hit.
    Shield,
    /// Shrinks the collector's glider.
    Shrink,
}

impl EffectKind {
    /// All effects, in the order used by the generator's uniform pick.
    pub const ALL: [EffectKind; 3] = [Self::SlowMotion, Self::Shield, Self::Shrink];

    /// Stable numeric code used on the wire.
    pub fn code(self) -> u32 {
        match self {
            Self::SlowMotion => 0,
            Self::Shield => 1,
            Self::Shrink => 2,
        }
    }

    /// Inverse of [`EffectKind::code`].
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Obstacle spawn descriptor. Immutable once generated.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleSpawn {
    pub spawn_index: SpawnIndex,
    /// Seconds after match start at which the obstacle enters the arena.
    pub time_offset: Seconds,
    /// Horizontal center in `[0, 1]`.
    pub normalized_x: f64,
    /// Normalized width.
    pub width: f64,
    /// Vertical speed in arena heights per second.
    pub speed: f64,
    pub variant: ObstacleVariant,
    /// Set when the obstacle was forced flush against a side.
    pub edge_punish: Option<EdgeSide>,
}

/// Power-up spawn descriptor. Immutable once generated.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerUpSpawn {
    pub spawn_index: SpawnIndex,
    pub time_offset: Seconds,
    pub normalized_x: f64,
    pub size: f64,
    pub speed: f64,
    pub effect: EffectKind,
    /// Unique within the round; used for collection arbitration.
    pub instance_id: String,
}

/// Either kind of spawn descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnEvent {
    Obstacle(ObstacleSpawn),
    PowerUp(PowerUpSpawn),
}

impl SpawnEvent {
    pub fn time_offset(&self) -> Seconds {
        match self {
            Self::Obstacle(o) => o.time_offset,
            Self::PowerUp(p) => p.time_offset,
        }
    }

    pub fn spawn_index(&self) -> SpawnIndex {
        match self {
            Self::Obstacle(o) => o.spawn_index,
            Self::PowerUp(p) => p.spawn_index,
        }
    }
}

/// Instance id assigned to the power-up with the given spawn index.
pub fn power_up_instance_id(spawn_index: SpawnIndex) -> String {
    format!("powerup_{spawn_index}")
}

// ============================================================================
// ArenaEventGenerator
// ============================================================================

/// Produces spawn descriptors from a shared [`DeterministicGenerator`].
///
/// Obstacle and power-up indices are tracked independently and exposed for
/// replay verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArenaEventGenerator {
    obstacle_index: SpawnIndex,
    power_up_index: SpawnIndex,
}

impl ArenaEventGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of obstacles generated so far (also the next obstacle's index).
    pub fn obstacle_index(&self) -> SpawnIndex {
        self.obstacle_index
    }

    /// Number of power-ups generated so far (also the next power-up's index).
    pub fn power_up_index(&self) -> SpawnIndex {
        self.power_up_index
    }

    /// Rewind both counters for a new round.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate the next regular obstacle.
    pub fn next_obstacle(
        &mut self,
        rng: &mut DeterministicGenerator,
        difficulty: f64,
        time_offset: Seconds,
    ) -> ObstacleSpawn {
        let difficulty = clamp_unit(difficulty);

        let narrow_probability = lerp(NARROW_PROBABILITY_MIN, NARROW_PROBABILITY_MAX, difficulty);
        let variant = if rng.boolean(narrow_probability) {
            ObstacleVariant::Narrow
        } else {
            ObstacleVariant::Wide
        };

        let width = match variant {
            ObstacleVariant::Narrow => rng.uniform(NARROW_WIDTH),
            ObstacleVariant::Wide => rng.uniform(WIDE_WIDTH),
        };

        let edge_probability = lerp(EDGE_PROBABILITY_MIN, EDGE_PROBABILITY_MAX, difficulty);
        let normalized_x = if rng.boolean(edge_probability) {
            if rng.boolean(0.5) {
                rng.uniform(LEFT_EDGE_BAND)
            } else {
                rng.uniform(RIGHT_EDGE_BAND)
            }
        } else {
            rng.uniform(CENTER_BAND)
        };

        let spawn = ObstacleSpawn {
            spawn_index: self.obstacle_index,
            time_offset,
            normalized_x,
            width,
            speed: obstacle_speed(variant, difficulty),
            variant,
            edge_punish: None,
        };
        self.obstacle_index += 1;
        spawn
    }

    /// Generate a wide obstacle flush against `side`, bypassing normal placement.
    pub fn next_edge_punish(
        &mut self,
        rng: &mut DeterministicGenerator,
        side: EdgeSide,
        difficulty: f64,
        time_offset: Seconds,
    ) -> ObstacleSpawn {
        let difficulty = clamp_unit(difficulty);
        let width = rng.uniform(WIDE_WIDTH);
        let normalized_x = match side {
            EdgeSide::Left => width / 2.0,
            EdgeSide::Right => 1.0 - width / 2.0,
        };

        let spawn = ObstacleSpawn {
            spawn_index: self.obstacle_index,
            time_offset,
            normalized_x,
            width,
            speed: obstacle_speed(ObstacleVariant::Wide, difficulty),
            variant: ObstacleVariant::Wide,
            edge_punish: Some(side),
        };
        self.obstacle_index += 1;
        spawn
    }

    /// Generate the next power-up.
    pub fn next_power_up(
        &mut self,
        rng: &mut DeterministicGenerator,
        difficulty: f64,
        time_offset: Seconds,
    ) -> PowerUpSpawn {
        let difficulty = clamp_unit(difficulty);
        let effect = EffectKind::ALL[rng.index(EffectKind::ALL.len())];
        let normalized_x = rng.uniform(POWER_UP_BAND);

        let spawn = PowerUpSpawn {
            spawn_index: self.power_up_index,
            time_offset,
            normalized_x,
            size: lerp(POWER_UP_SIZE.0, POWER_UP_SIZE.1, difficulty),
            speed: lerp(POWER_UP_SPEED.0, POWER_UP_SPEED.1, difficulty),
            effect,
            instance_id: power_up_instance_id(self.power_up_index),
        };
        self.power_up_index += 1;
        spawn
    }
}

/// Vertical speed of an obstacle variant at the given difficulty.
fn obstacle_speed(variant: ObstacleVariant, difficulty: f64) -> f64 {
    let base = lerp(OBSTACLE_SPEED_MIN, OBSTACLE_SPEED_MAX, difficulty);
    match variant {
        ObstacleVariant::Narrow => base * NARROW_SPEED_FACTOR,
        ObstacleVariant::Wide => base * WIDE_SPEED_FACTOR,
    }
}

// ============================================================================
// Tests
// ============================================================================
