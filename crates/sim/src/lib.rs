//! HyprGlide Simulation Core
//!
//! This crate contains the deterministic parts of a HyprGlide round: the
//! seeded generator, the arena spawn generator built on top of it, the
//! difficulty curve and spawn schedule the authority follows, and the
//! edge-linger heuristic that selects edge-punish obstacles.
//!
//! # Architecture Constraints
//!
//! Nothing in this crate may:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness
//! - Depend on platform-specific floating point behavior
//!
//! Time enters only as explicit `elapsed` arguments (seconds since the match
//! start time). Two peers calling the same operations in the same order with
//! the same seed produce bit-identical results.

#![deny(unsafe_code)]

pub mod arena;
pub mod linger;
pub mod schedule;

use std::ops::Range;

pub use arena::{
    ArenaEventGenerator, EdgeSide, EffectKind, ObstacleSpawn, ObstacleVariant, PowerUpSpawn,
    SpawnEvent,
};
pub use linger::{EdgeLingerTracker, LingerConfig};
pub use schedule::{DifficultyCurve, ScheduledSpawn, SpawnKind, SpawnSchedule};

// ============================================================================
// Type Aliases
// ============================================================================

/// Seconds relative to the match start time.
pub type Seconds = f64;

/// Per-kind generation counter of a spawn event.
pub type SpawnIndex = u64;

// ============================================================================
// DeterministicGenerator
// ============================================================================

/// LCG multiplier (Knuth MMIX).
/// NORMATIVE: changing this breaks cross-peer agreement.
pub const LCG_MULTIPLIER: u64 = 6364136223846793005;

/// LCG increment (Knuth MMIX).
/// NORMATIVE: changing this breaks cross-peer agreement.
pub const LCG_INCREMENT: u64 = 1442695040888963407;

/// 2^-53, the spacing of the unit interval produced by [`DeterministicGenerator::unit`].
const UNIT_SCALE: f64 = 1.0 / (1u64 << 53) as f64;

/// Seeded pseudo-random sequence generator.
///
/// A 64-bit linear congruential recurrence `state' = state * A + C (mod 2^64)`.
/// The output is a pure function of `(seed, calls)`; there is no failure mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicGenerator {
    seed: u64,
    state: u64,
    calls: u64,
}

impl DeterministicGenerator {
    /// Create a generator positioned at the start of the sequence for `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            state: seed,
            calls: 0,
        }
    }

    /// Restore the initial state for `seed`.
    pub fn reset(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// Seed this generator was last reset with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of `next_u64` steps taken since the last reset.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Advance the recurrence and return the new state.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.calls += 1;
        self.state
    }

    /// Uniform value in `[0, 1)` built from the top 53 bits of the next step.
    ///
    /// The low bits of an LCG have short periods, so they are discarded.
    pub fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * UNIT_SCALE
    }

    /// Uniform value in `[range.start, range.end)`.
    pub fn uniform(&mut self, range: Range<f64>) -> f64 {
        range.start + (range.end - range.start) * self.unit()
    }

    /// `true` with the given probability. Consumes exactly one step.
    pub fn boolean(&mut self, probability: f64) -> bool {
        self.unit() < probability
    }

    /// Uniform index in `0..len`. Consumes exactly one step.
    ///
    /// Returns 0 for an empty range so the draw count stays fixed.
    pub fn index(&mut self, len: usize) -> usize {
        let raw = self.next_u64() >> 33;
        if len == 0 {
            return 0;
        }
        (raw % len as u64) as usize
    }
}

/// Linear interpolation from `from` to `to` by `t`.
pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

/// Clamp a difficulty scalar into `[0, 1]`. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
