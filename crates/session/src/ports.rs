//! Collaborator interfaces.
//!
//! The coordinator owns one [`Transport`] and one [`SimulationPort`] and
//! never calls back into anything else. Rendering talks to the coordinator
//! only through a [`crate::SessionHandle`].

use std::time::{SystemTime, UNIX_EPOCH};

use hyprglide_sim::{ObstacleSpawn, PowerUpSpawn, Seconds};
use hyprglide_wire::Channel;

use crate::participant::Participant;
use crate::ranking::Ranking;

/// Outbound side of the peer group.
///
/// Sends are fire-and-forget broadcasts to every other connected peer.
pub trait Transport: Send {
    fn send(&mut self, bytes: Vec<u8>, channel: Channel);
}

/// Local participant state sampled for the periodic broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalKinematics {
    pub position_x: f64,
    pub velocity_x: f64,
    pub live_score: u64,
    pub is_alive: bool,
}

impl Default for LocalKinematics {
    fn default() -> Self {
        Self {
            position_x: 0.5,
            velocity_x: 0.0,
            live_score: 0,
            is_alive: true,
        }
    }
}

/// Simulation and presentation collaborator.
pub trait SimulationPort: Send {
    /// Current local state, read at the broadcast rate.
    fn local_kinematics(&self) -> LocalKinematics;

    fn apply_round_setup(&mut self, participants: &[Participant], seed: u64, start_time: f64);

    fn apply_remote_obstacle_event(&mut self, event: &ObstacleSpawn);

    fn apply_remote_power_up_event(&mut self, event: &PowerUpSpawn, instance_id: &str);

    fn apply_remote_participant_update(&mut self, id: &str, position_x: f64, velocity_x: f64);

    fn mark_remote_participant_eliminated(&mut self, id: &str);

    fn mark_power_up_collected(&mut self, instance_id: &str);

    fn apply_shared_effect(
        &mut self,
        collector_id: &str,
        duration: Seconds,
        is_local_collector: bool,
    );

    fn clear_round_visuals(&mut self);

    fn present_round_results(&mut self, winner_id: &str, rankings: &[Ranking]);
}

/// Wall clock, seconds since the Unix epoch.
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64())
    }
}

/// Clock anchored to a tokio `Instant`, so paused test time drives it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    epoch: f64,
}

impl TokioClock {
    /// Clock that reads `epoch` right now and advances with tokio time.
    pub fn starting_at(epoch: f64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            epoch,
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> f64 {
        self.epoch + self.origin.elapsed().as_secs_f64()
    }
}
