//! Difficulty curve and spawn cadence followed by the authority.
//!
//! Spawn times are derived from the schedule itself, not from when the
//! authority happens to poll it, so the generated stream does not depend on
//! tick jitter.

use crate::{Seconds, clamp_unit, lerp};

/// Seconds from match start until difficulty reaches 1.
pub const DEFAULT_RAMP_SECONDS: Seconds = 90.0;

/// Obstacle interval at difficulty 0 / 1.
pub const OBSTACLE_INTERVAL: (Seconds, Seconds) = (1.4, 0.55);

/// Time of the first obstacle.
pub const FIRST_OBSTACLE_AT: Seconds = 1.0;

/// Fixed interval between power-ups.
pub const POWER_UP_INTERVAL: Seconds = 9.0;

/// Time of the first power-up.
pub const FIRST_POWER_UP_AT: Seconds = 6.0;

/// Maps elapsed match time to a normalized difficulty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyCurve {
    pub ramp_seconds: Seconds,
}

impl Default for DifficultyCurve {
    fn default() -> Self {
        Self {
            ramp_seconds: DEFAULT_RAMP_SECONDS,
        }
    }
}

impl DifficultyCurve {
    /// Linear ramp from 0 at match start to 1 at `ramp_seconds`.
    pub fn difficulty(&self, elapsed: Seconds) -> f64 {
        if self.ramp_seconds <= 0.0 {
            return 1.0;
        }
        clamp_unit(elapsed / self.ramp_seconds)
    }
}

/// Kind of spawn the schedule asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnKind {
    Obstacle,
    PowerUp,
}

/// A spawn slot that became due.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSpawn {
    pub kind: SpawnKind,
    /// Scheduled time of the slot.
    pub at: Seconds,
    /// Difficulty at `at`.
    pub difficulty: f64,
}

/// Spawn cadence state.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSchedule {
    curve: DifficultyCurve,
    next_obstacle_at: Seconds,
    next_power_up_at: Seconds,
}

impl SpawnSchedule {
    pub fn new(curve: DifficultyCurve) -> Self {
        Self {
            curve,
            next_obstacle_at: FIRST_OBSTACLE_AT,
            next_power_up_at: FIRST_POWER_UP_AT,
        }
    }

    pub fn curve(&self) -> DifficultyCurve {
        self.curve
    }

    /// Rewind to the start of a round.
    pub fn reset(&mut self) {
        *self = Self::new(self.curve);
    }

    /// Drain every slot scheduled at or before `elapsed`, in time order.
    ///
    /// On a tie the obstacle slot comes first.
    pub fn poll(&mut self, elapsed: Seconds) -> Vec<ScheduledSpawn> {
        let mut due = Vec::new();
        loop {
            let (kind, at) = if self.next_obstacle_at <= self.next_power_up_at {
                (SpawnKind::Obstacle, self.next_obstacle_at)
            } else {
                (SpawnKind::PowerUp, self.next_power_up_at)
            };
            if at > elapsed {
                break;
            }

            let difficulty = self.curve.difficulty(at);
            match kind {
                SpawnKind::Obstacle => {
                    self.next_obstacle_at +=
                        lerp(OBSTACLE_INTERVAL.0, OBSTACLE_INTERVAL.1, difficulty);
                }
                SpawnKind::PowerUp => self.next_power_up_at += POWER_UP_INTERVAL,
            }
            due.push(ScheduledSpawn {
                kind,
                at,
                difficulty,
            });
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_ramp() {
        let curve = DifficultyCurve::default();
        assert_eq!(curve.difficulty(-3.0), 0.0);
        assert_eq!(curve.difficulty(0.0), 0.0);
        assert_eq!(curve.difficulty(45.0), 0.5);
        assert_eq!(curve.difficulty(400.0), 1.0);

        let instant = DifficultyCurve { ramp_seconds: 0.0 };
        assert_eq!(instant.difficulty(0.0), 1.0);
    }

    #[test]
    fn test_nothing_due_during_warmup() {
        let mut schedule = SpawnSchedule::new(DifficultyCurve::default());
        assert!(schedule.poll(-2.0).is_empty());
        assert!(schedule.poll(0.99).is_empty());
    }

    #[test]
    fn test_first_slots() {
        let mut schedule = SpawnSchedule::new(DifficultyCurve::default());
        let due = schedule.poll(FIRST_POWER_UP_AT);

        assert_eq!(due[0].kind, SpawnKind::Obstacle);
        assert_eq!(due[0].at, FIRST_OBSTACLE_AT);
        let power_ups: Vec<_> = due.iter().filter(|s| s.kind == SpawnKind::PowerUp).collect();
        assert_eq!(power_ups.len(), 1);
        assert_eq!(power_ups[0].at, FIRST_POWER_UP_AT);
        assert!(due.windows(2).all(|w| w[0].at <= w[1].at));
    }

    /// Polling cadence must not change which slots are produced.
    #[test]
    fn test_poll_cadence_independent() {
        let mut coarse = SpawnSchedule::new(DifficultyCurve::default());
        let all_at_once = coarse.poll(120.0);

        let mut fine = SpawnSchedule::new(DifficultyCurve::default());
        let mut stepped = Vec::new();
        let mut t = 0.0;
        while t <= 120.0 {
            stepped.extend(fine.poll(t));
            t += 1.0 / 60.0;
        }
        stepped.extend(fine.poll(120.0));

        assert_eq!(all_at_once, stepped);
    }

    #[test]
    fn test_obstacles_accelerate() {
        let mut schedule = SpawnSchedule::new(DifficultyCurve::default());
        let obstacles: Vec<f64> = schedule
            .poll(200.0)
            .into_iter()
            .filter(|s| s.kind == SpawnKind::Obstacle)
            .map(|s| s.at)
            .collect();

        let first_gap = obstacles[1] - obstacles[0];
        let last_gap = obstacles[obstacles.len() - 1] - obstacles[obstacles.len() - 2];
        assert!((first_gap - OBSTACLE_INTERVAL.0).abs() < 0.05);
        assert!((last_gap - OBSTACLE_INTERVAL.1).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut schedule = SpawnSchedule::new(DifficultyCurve { ramp_seconds: 30.0 });
        let first = schedule.poll(20.0);
        schedule.reset();
        assert_eq!(schedule.curve().ramp_seconds, 30.0);
        assert_eq!(schedule.poll(20.0), first);
    }
}
