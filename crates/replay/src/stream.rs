//! Replay buffer of received spawn events.
//!
//! Peers append what the authority announces and consume events once their
//! `time_offset` has elapsed. The buffer never generates events itself.

use hyprglide_sim::{ObstacleSpawn, PowerUpSpawn, Seconds, SpawnEvent, SpawnIndex};

use crate::stream_digest;

/// Result of appending an announced event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored at the expected position.
    Appended,
    /// Already stored; at-least-once delivery repeated it.
    Duplicate,
    /// Stored, but earlier indices never arrived.
    Gap { expected: SpawnIndex },
}

/// Ordered obstacle and power-up sequences with independent read cursors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStream {
    obstacles: Vec<ObstacleSpawn>,
    power_ups: Vec<PowerUpSpawn>,
    obstacle_cursor: usize,
    power_up_cursor: usize,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_obstacle(&mut self, spawn: ObstacleSpawn) -> AppendOutcome {
        let outcome = append_outcome(spawn.spawn_index, &self.obstacles, |o| o.spawn_index);
        if outcome != AppendOutcome::Duplicate {
            self.obstacles.push(spawn);
        }
        outcome
    }

    pub fn push_power_up(&mut self, spawn: PowerUpSpawn) -> AppendOutcome {
        let outcome = append_outcome(spawn.spawn_index, &self.power_ups, |p| p.spawn_index);
        if outcome != AppendOutcome::Duplicate {
            self.power_ups.push(spawn);
        }
        outcome
    }

    /// Next unconsumed obstacle if its time offset has elapsed.
    pub fn consume_due_obstacle(&mut self, now: Seconds) -> Option<ObstacleSpawn> {
        let next = self.obstacles.get(self.obstacle_cursor)?;
        if next.time_offset > now {
            return None;
        }
        self.obstacle_cursor += 1;
        Some(next.clone())
    }

    /// Next unconsumed power-up if its time offset has elapsed.
    pub fn consume_due_power_up(&mut self, now: Seconds) -> Option<PowerUpSpawn> {
        let next = self.power_ups.get(self.power_up_cursor)?;
        if next.time_offset > now {
            return None;
        }
        self.power_up_cursor += 1;
        Some(next.clone())
    }

    /// Next due event of either kind, earliest `time_offset` first.
    ///
    /// On a tie the obstacle is returned first.
    pub fn consume_if_due(&mut self, now: Seconds) -> Option<SpawnEvent> {
        let obstacle_at = self
            .obstacles
            .get(self.obstacle_cursor)
            .map(|o| o.time_offset)
            .filter(|&t| t <= now);
        let power_up_at = self
            .power_ups
            .get(self.power_up_cursor)
            .map(|p| p.time_offset)
            .filter(|&t| t <= now);

        match (obstacle_at, power_up_at) {
            (Some(o), Some(p)) if p < o => self.consume_due_power_up(now).map(SpawnEvent::PowerUp),
            (Some(_), _) => self.consume_due_obstacle(now).map(SpawnEvent::Obstacle),
            (None, Some(_)) => self.consume_due_power_up(now).map(SpawnEvent::PowerUp),
            (None, None) => None,
        }
    }

    /// Drain every event due at `now`, in consumption order.
    pub fn drain_due(&mut self, now: Seconds) -> Vec<SpawnEvent> {
        std::iter::from_fn(|| self.consume_if_due(now)).collect()
    }

    /// Rewind both cursors without discarding events.
    pub fn reset_cursors(&mut self) {
        self.obstacle_cursor = 0;
        self.power_up_cursor = 0;
    }

    /// Discard all events for a new round.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn obstacles(&self) -> &[ObstacleSpawn] {
        &self.obstacles
    }

    pub fn power_ups(&self) -> &[PowerUpSpawn] {
        &self.power_ups
    }

    /// `(obstacle_cursor, power_up_cursor)`.
    pub fn cursors(&self) -> (usize, usize) {
        (self.obstacle_cursor, self.power_up_cursor)
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty() && self.power_ups.is_empty()
    }

    /// SHA-256 over the stored sequences. See [`stream_digest`].
    pub fn digest(&self) -> [u8; 32] {
        stream_digest(&self.obstacles, &self.power_ups)
    }
}

fn append_outcome<T>(
    index: SpawnIndex,
    stored: &[T],
    index_of: impl Fn(&T) -> SpawnIndex,
) -> AppendOutcome {
    let expected = stored.last().map_or(0, |last| index_of(last) + 1);
    if index < expected {
        AppendOutcome::Duplicate
    } else if index > expected {
        AppendOutcome::Gap { expected }
    } else {
        AppendOutcome::Appended
    }
}
