//! HyprGlide Spawn Replay
//!
//! This crate provides the replay side of spawn synchronization.
//!
//! # Architecture
//!
//! - `EventStream`: replay buffer every peer feeds with announced spawns
//! - `SpawnRecorder`: the authority's log of generation steps
//! - `stream_digest`: SHA-256 fingerprint of a spawn stream, compared across
//!   peers at the end of a round
//! - `verify_spawns`: regenerates a stream from its seed and steps and
//!   reports the first divergence

#![deny(unsafe_code)]

mod stream;

pub use stream::{AppendOutcome, EventStream};

use hyprglide_sim::{
    ArenaEventGenerator, DeterministicGenerator, EdgeSide, ObstacleSpawn, ObstacleVariant,
    PowerUpSpawn, Seconds, SpawnIndex,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ============================================================================
// Stream Digest
// ============================================================================

/// Digest algorithm identifier, bumped whenever the canonical encoding changes.
pub const STREAM_DIGEST_ALGO_ID: &str = "spawndigest-v1-sha256-le-f64bits-obstacles-then-powerups";

/// SHA-256 over a canonical little-endian encoding of both sequences.
///
/// Obstacles are hashed first, then power-ups, each in stored order. Floats
/// are hashed by bit pattern so any divergence is visible.
pub fn stream_digest(obstacles: &[ObstacleSpawn], power_ups: &[PowerUpSpawn]) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update((obstacles.len() as u64).to_le_bytes());
    for o in obstacles {
        hasher.update([0x01]);
        hasher.update(o.spawn_index.to_le_bytes());
        for value in [o.time_offset, o.normalized_x, o.width, o.speed] {
            hasher.update(value.to_bits().to_le_bytes());
        }
        hasher.update([match o.variant {
            ObstacleVariant::Narrow => 0,
            ObstacleVariant::Wide => 1,
        }]);
        hasher.update([match o.edge_punish {
            None => 0,
            Some(EdgeSide::Left) => 1,
            Some(EdgeSide::Right) => 2,
        }]);
    }

    hasher.update((power_ups.len() as u64).to_le_bytes());
    for p in power_ups {
        hasher.update([0x02]);
        hasher.update(p.spawn_index.to_le_bytes());
        for value in [p.time_offset, p.normalized_x, p.size, p.speed] {
            hasher.update(value.to_bits().to_le_bytes());
        }
        hasher.update(p.effect.code().to_le_bytes());
        hasher.update((p.instance_id.len() as u64).to_le_bytes());
        hasher.update(p.instance_id.as_bytes());
    }

    hasher.finalize().into()
}

// ============================================================================
// Spawn Recorder
// ============================================================================

/// Which generator entry point a step used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Obstacle,
    EdgePunish(EdgeSide),
    PowerUp,
}

/// Inputs of one generator call, enough to repeat it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationStep {
    pub kind: StepKind,
    pub difficulty: f64,
    pub time_offset: Seconds,
}

/// The authority's record of every generator call in a round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnRecorder {
    seed: u64,
    steps: Vec<GenerationStep>,
}

impl SpawnRecorder {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: GenerationStep) {
        self.steps.push(step);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    /// Regenerate from the recorded steps and compare against `produced`.
    pub fn verify(&self, produced: &EventStream) -> Result<(), VerifyError> {
        verify_spawns(
            self.seed,
            &self.steps,
            produced.obstacles(),
            produced.power_ups(),
        )
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Spawn stream verification error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    #[error("Obstacle {index} diverged from regeneration")]
    ObstacleMismatch { index: SpawnIndex },

    #[error("Power-up {index} diverged from regeneration")]
    PowerUpMismatch { index: SpawnIndex },

    #[error("Obstacle count mismatch: expected {expected}, got {actual}")]
    ObstacleCountMismatch { expected: usize, actual: usize },

    #[error("Power-up count mismatch: expected {expected}, got {actual}")]
    PowerUpCountMismatch { expected: usize, actual: usize },
}

/// Regenerate a spawn stream from `seed` and `steps` and compare it with the
/// stored sequences.
///
/// # Verification Steps
/// 1. Seed a fresh generator
/// 2. Repeat every step in order
/// 3. Compare each regenerated event with the stored one at the same index
/// 4. Compare counts
pub fn verify_spawns(
    seed: u64,
    steps: &[GenerationStep],
    obstacles: &[ObstacleSpawn],
    power_ups: &[PowerUpSpawn],
) -> Result<(), VerifyError> {
    let mut rng = DeterministicGenerator::new(seed);
    let mut generator = ArenaEventGenerator::new();
    let mut obstacle_count = 0usize;
    let mut power_up_count = 0usize;

    for step in steps {
        match step.kind {
            StepKind::Obstacle | StepKind::EdgePunish(_) => {
                let regenerated = match step.kind {
                    StepKind::EdgePunish(side) => generator.next_edge_punish(
                        &mut rng,
                        side,
                        step.difficulty,
                        step.time_offset,
                    ),
                    _ => generator.next_obstacle(&mut rng, step.difficulty, step.time_offset),
                };
                if obstacles.get(obstacle_count) != Some(&regenerated) {
                    return Err(VerifyError::ObstacleMismatch {
                        index: regenerated.spawn_index,
                    });
                }
                obstacle_count += 1;
            }
            StepKind::PowerUp => {
                let regenerated =
                    generator.next_power_up(&mut rng, step.difficulty, step.time_offset);
                if power_ups.get(power_up_count) != Some(&regenerated) {
                    return Err(VerifyError::PowerUpMismatch {
                        index: regenerated.spawn_index,
                    });
                }
                power_up_count += 1;
            }
        }
    }

    if obstacles.len() != obstacle_count {
        return Err(VerifyError::ObstacleCountMismatch {
            expected: obstacle_count,
            actual: obstacles.len(),
        });
    }
    if power_ups.len() != power_up_count {
        return Err(VerifyError::PowerUpCountMismatch {
            expected: power_up_count,
            actual: power_ups.len(),
        });
    }

    log::debug!(
        "Spawn stream verified: {obstacle_count} obstacles, {power_up_count} power-ups"
    );
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
