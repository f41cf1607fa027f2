//! In-process transport and simulation doubles.
//!
//! [`LoopbackHub`] connects several coordinators in one process. Messages
//! queue per recipient until drained, so tests decide exactly when delivery
//! happens. [`ScriptedSimulation`] records every call the coordinator makes
//! and returns whatever local kinematics the test sets.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hyprglide_sim::{ObstacleSpawn, PowerUpSpawn, Seconds};
use hyprglide_wire::Channel;

use crate::participant::Participant;
use crate::ports::{LocalKinematics, SimulationPort, Transport};
use crate::ranking::Ranking;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Transport
// ============================================================================

/// A queued delivery: `(sender, bytes)`.
pub type Delivery = (String, Vec<u8>);

#[derive(Debug, Default)]
struct HubInner {
    inboxes: BTreeMap<String, VecDeque<Delivery>>,
    drop_realtime: bool,
    dropped: u64,
}

/// Shared message switch for in-process peers.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer_id` and return its transport.
    pub fn connect(&self, peer_id: impl Into<String>) -> LoopbackTransport {
        let peer_id = peer_id.into();
        lock(&self.inner).inboxes.entry(peer_id.clone()).or_default();
        LoopbackTransport {
            hub: self.clone(),
            peer_id,
        }
    }

    /// Unregister `peer_id`; queued and future messages to it are discarded.
    pub fn disconnect(&self, peer_id: &str) {
        lock(&self.inner).inboxes.remove(peer_id);
    }

    /// Drop every realtime message from now on.
    pub fn set_drop_realtime(&self, drop: bool) {
        lock(&self.inner).drop_realtime = drop;
    }

    /// Number of realtime messages dropped so far.
    pub fn dropped(&self) -> u64 {
        lock(&self.inner).dropped
    }

    /// Take everything queued for `peer_id`, oldest first.
    pub fn drain(&self, peer_id: &str) -> Vec<Delivery> {
        lock(&self.inner)
            .inboxes
            .get_mut(peer_id)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        lock(&self.inner).inboxes.values().map(VecDeque::len).sum()
    }

    fn broadcast(&self, from: &str, bytes: Vec<u8>, channel: Channel) {
        let mut inner = lock(&self.inner);
        if channel == Channel::Realtime && inner.drop_realtime {
            inner.dropped += 1;
            return;
        }
        for (peer, inbox) in inner.inboxes.iter_mut() {
            if peer != from {
                inbox.push_back((from.to_string(), bytes.clone()));
            }
        }
    }
}

/// One peer's handle on a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    hub: LoopbackHub,
    peer_id: String,
}

impl LoopbackTransport {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, bytes: Vec<u8>, channel: Channel) {
        self.hub.broadcast(&self.peer_id, bytes, channel);
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// A call the coordinator made on the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    RoundSetup {
        participants: Vec<String>,
        seed: u64,
        start_time: f64,
    },
    Obstacle(ObstacleSpawn),
    PowerUp {
        spawn: PowerUpSpawn,
        instance_id: String,
    },
    RemoteUpdate {
        id: String,
        position_x: f64,
        velocity_x: f64,
    },
    RemoteEliminated(String),
    PowerUpCollected(String),
    SharedEffect {
        collector_id: String,
        duration: Seconds,
        is_local_collector: bool,
    },
    ClearedVisuals,
    Results {
        winner_id: String,
        rankings: Vec<Ranking>,
    },
}

#[derive(Debug, Default)]
struct ScriptState {
    kinematics: LocalKinematics,
    events: Vec<SimulationEvent>,
}

/// Simulation double shared between the coordinator and the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSimulation {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSimulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_kinematics(&self, kinematics: LocalKinematics) {
        lock(&self.state).kinematics = kinematics;
    }

    pub fn events(&self) -> Vec<SimulationEvent> {
        lock(&self.state).events.clone()
    }

    pub fn take_events(&self) -> Vec<SimulationEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }

    /// Obstacles applied so far, in order.
    pub fn obstacles(&self) -> Vec<ObstacleSpawn> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                SimulationEvent::Obstacle(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    /// Power-ups applied so far, in order.
    pub fn power_ups(&self) -> Vec<PowerUpSpawn> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                SimulationEvent::PowerUp { spawn, .. } => Some(spawn.clone()),
                _ => None,
            })
            .collect()
    }

    /// Most recent results presented.
    pub fn results(&self) -> Option<(String, Vec<Ranking>)> {
        lock(&self.state).events.iter().rev().find_map(|e| match e {
            SimulationEvent::Results {
                winner_id,
                rankings,
            } => Some((winner_id.clone(), rankings.clone())),
            _ => None,
        })
    }

    fn push(&self, event: SimulationEvent) {
        lock(&self.state).events.push(event);
    }
}

impl SimulationPort for ScriptedSimulation {
    fn local_kinematics(&self) -> LocalKinematics {
        lock(&self.state).kinematics
    }

    fn apply_round_setup(&mut self, participants: &[Participant], seed: u64, start_time: f64) {
        self.push(SimulationEvent::RoundSetup {
            participants: participants.iter().map(|p| p.id.clone()).collect(),
            seed,
            start_time,
        });
    }

    fn apply_remote_obstacle_event(&mut self, event: &ObstacleSpawn) {
        self.push(SimulationEvent::Obstacle(event.clone()));
    }

    fn apply_remote_power_up_event(&mut self, event: &PowerUpSpawn, instance_id: &str) {
        self.push(SimulationEvent::PowerUp {
            spawn: event.clone(),
            instance_id: instance_id.to_string(),
        });
    }

    fn apply_remote_participant_update(&mut self, id: &str, position_x: f64, velocity_x: f64) {
        self.push(SimulationEvent::RemoteUpdate {
            id: id.to_string(),
            position_x,
            velocity_x,
        });
    }

    fn mark_remote_participant_eliminated(&mut self, id: &str) {
        self.push(SimulationEvent::RemoteEliminated(id.to_string()));
    }

    fn mark_power_up_collected(&mut self, instance_id: &str) {
        self.push(SimulationEvent::PowerUpCollected(instance_id.to_string()));
    }

    fn apply_shared_effect(
        &mut self,
        collector_id: &str,
        duration: Seconds,
        is_local_collector: bool,
    ) {
        self.push(SimulationEvent::SharedEffect {
            collector_id: collector_id.to_string(),
            duration,
            is_local_collector,
        });
    }

    fn clear_round_visuals(&mut self) {
        self.push(SimulationEvent::ClearedVisuals);
    }

    fn present_round_results(&mut self, winner_id: &str, rankings: &[Ranking]) {
        self.push(SimulationEvent::Results {
            winner_id: winner_id.to_string(),
            rankings: rankings.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_delivers_to_everyone_but_sender() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect("a");
        let _b = hub.connect("b");
        let _c = hub.connect("c");

        a.send(vec![1, 2, 3], Channel::Control);

        assert!(hub.drain("a").is_empty());
        assert_eq!(hub.drain("b"), vec![("a".to_string(), vec![1, 2, 3])]);
        assert_eq!(hub.drain("c").len(), 1);
        assert_eq!(hub.pending(), 0);
    }

    #[test]
    fn test_realtime_drop_spares_control() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect("a");
        let _b = hub.connect("b");
        hub.set_drop_realtime(true);

        a.send(vec![1], Channel::Realtime);
        a.send(vec![2], Channel::Control);

        assert_eq!(hub.drain("b"), vec![("a".to_string(), vec![2])]);
        assert_eq!(hub.dropped(), 1);
    }

    #[test]
    fn test_disconnected_peer_gets_nothing() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect("a");
        let _b = hub.connect("b");
        hub.disconnect("b");

        a.send(vec![9], Channel::Control);
        assert!(hub.drain("b").is_empty());
    }

    #[test]
    fn test_scripted_simulation_records_calls() {
        let sim = ScriptedSimulation::new();
        let mut port = sim.clone();
        port.mark_power_up_collected("powerup_0");
        port.clear_round_visuals();

        assert_eq!(
            sim.take_events(),
            vec![
                SimulationEvent::PowerUpCollected("powerup_0".to_string()),
                SimulationEvent::ClearedVisuals,
            ]
        );
        assert!(sim.events().is_empty());
    }
}
