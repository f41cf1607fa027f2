//! Single-task runtime for a [`SessionCoordinator`].
//!
//! The coordinator is moved into one tokio task. Inbound bytes, transport
//! events and simulation calls arrive over an unbounded channel and are
//! applied strictly in order, interleaved with two timers: the update tick
//! (spawn generation and replay) and the state broadcast, which only runs
//! while the coordinator is broadcasting.

use std::future;
use std::time::Duration;

use hyprglide_sim::{EffectKind, Seconds};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::coordinator::{SessionCoordinator, SessionStatus};
use crate::error::SessionError;
use crate::participant::Participant;
use crate::ports::{Clock, SimulationPort, Transport};

enum Command {
    BeginMatchmaking,
    PeerGroupEstablished(Vec<Participant>),
    Inbound { from: String, bytes: Vec<u8> },
    ParticipantDisconnected(String),
    StartRound,
    LocalDied { final_score: u64, elimination_time: Seconds },
    TryCollect {
        instance_id: String,
        effect: EffectKind,
        reply: oneshot::Sender<bool>,
    },
    ActivatedEffect { duration: Seconds, stacked_duration: Seconds },
    RequestRematch { reply: oneshot::Sender<Result<(), SessionError>> },
    Status { reply: oneshot::Sender<SessionStatus> },
    Disconnect,
    CancelMatchmaking,
    Shutdown,
}

/// Cloneable handle for talking to a running session.
///
/// Fire-and-forget methods are safe to call from any thread, including the
/// simulation's frame loop.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BeginMatchmaking => "BeginMatchmaking",
            Self::PeerGroupEstablished(_) => "PeerGroupEstablished",
            Self::Inbound { .. } => "Inbound",
            Self::ParticipantDisconnected(_) => "ParticipantDisconnected",
            Self::StartRound => "StartRound",
            Self::LocalDied { .. } => "LocalDied",
            Self::TryCollect { .. } => "TryCollect",
            Self::ActivatedEffect { .. } => "ActivatedEffect",
            Self::RequestRematch { .. } => "RequestRematch",
            Self::Status { .. } => "Status",
            Self::Disconnect => "Disconnect",
            Self::CancelMatchmaking => "CancelMatchmaking",
            Self::Shutdown => "Shutdown",
        })
    }
}

impl SessionHandle {
    fn post(&self, command: Command) -> Result<(), SessionError> {
        self.tx.send(command).map_err(|_| SessionError::RuntimeClosed)
    }

    pub fn begin_matchmaking(&self) -> Result<(), SessionError> {
        self.post(Command::BeginMatchmaking)
    }

    pub fn peer_group_established(&self, peers: Vec<Participant>) -> Result<(), SessionError> {
        self.post(Command::PeerGroupEstablished(peers))
    }

    /// Bytes received from transport peer `from`.
    pub fn deliver(&self, from: impl Into<String>, bytes: Vec<u8>) -> Result<(), SessionError> {
        self.post(Command::Inbound {
            from: from.into(),
            bytes,
        })
    }

    pub fn participant_disconnected(&self, id: impl Into<String>) -> Result<(), SessionError> {
        self.post(Command::ParticipantDisconnected(id.into()))
    }

    pub fn start_round(&self) -> Result<(), SessionError> {
        self.post(Command::StartRound)
    }

    pub fn local_participant_died(
        &self,
        final_score: u64,
        elimination_time: Seconds,
    ) -> Result<(), SessionError> {
        self.post(Command::LocalDied {
            final_score,
            elimination_time,
        })
    }

    pub fn local_participant_activated_effect(
        &self,
        duration: Seconds,
        stacked_duration: Seconds,
    ) -> Result<(), SessionError> {
        self.post(Command::ActivatedEffect {
            duration,
            stacked_duration,
        })
    }

    pub async fn try_collect_power_up(
        &self,
        instance_id: impl Into<String>,
        effect: EffectKind,
    ) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::TryCollect {
            instance_id: instance_id.into(),
            effect,
            reply,
        })?;
        rx.await.map_err(|_| SessionError::RuntimeClosed)
    }

    /// Blocking variant for a simulation thread outside the runtime.
    pub fn blocking_try_collect_power_up(
        &self,
        instance_id: impl Into<String>,
        effect: EffectKind,
    ) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::TryCollect {
            instance_id: instance_id.into(),
            effect,
            reply,
        })?;
        rx.blocking_recv().map_err(|_| SessionError::RuntimeClosed)
    }

    pub async fn request_rematch(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::RequestRematch { reply })?;
        rx.await.map_err(|_| SessionError::RuntimeClosed)?
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Status { reply })?;
        rx.await.map_err(|_| SessionError::RuntimeClosed)
    }

    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.post(Command::Disconnect)
    }

    pub fn cancel_matchmaking(&self) -> Result<(), SessionError> {
        self.post(Command::CancelMatchmaking)
    }

    /// Stop the session task. The coordinator is returned by its join handle.
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.post(Command::Shutdown)
    }
}

/// Owner of a coordinator running on a tokio task.
pub struct SessionRuntime<T, S, C> {
    coordinator: SessionCoordinator<T, S>,
    clock: C,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<T, S, C> SessionRuntime<T, S, C>
where
    T: Transport + 'static,
    S: SimulationPort + 'static,
    C: Clock + 'static,
{
    /// Spawn the session task on the current runtime.
    pub fn spawn(
        coordinator: SessionCoordinator<T, S>,
        clock: C,
    ) -> (SessionHandle, JoinHandle<SessionCoordinator<T, S>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Self {
            coordinator,
            clock,
            rx,
        };
        (SessionHandle { tx }, tokio::spawn(runtime.run()))
    }

    async fn run(mut self) -> SessionCoordinator<T, S> {
        let config = self.coordinator.config().clone();
        let mut update = every(config.update_hz);
        let mut broadcast: Option<Interval> = None;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.apply(command),
                },
                _ = update.tick() => {
                    let now = self.clock.now();
                    self.coordinator.advance(now);
                }
                _ = next_tick(&mut broadcast) => {
                    let now = self.clock.now();
                    self.coordinator.broadcast_local_state(now);
                }
            }

            match (self.coordinator.is_broadcasting(), broadcast.is_some()) {
                (true, false) => broadcast = Some(every(config.broadcast_hz)),
                (false, true) => broadcast = None,
                _ => {}
            }
        }

        log::debug!("{}: session task stopped", self.coordinator.local_id());
        self.coordinator
    }

    fn apply(&mut self, command: Command) {
        let now = self.clock.now();
        let coordinator = &mut self.coordinator;
        let result = match command {
            Command::BeginMatchmaking => coordinator.begin_matchmaking(),
            Command::PeerGroupEstablished(peers) => {
                coordinator.on_peer_group_established(peers, now)
            }
            Command::Inbound { from, bytes } => {
                coordinator.handle_inbound(&from, &bytes, now);
                Ok(())
            }
            Command::ParticipantDisconnected(id) => {
                coordinator.on_participant_disconnected(&id, now);
                Ok(())
            }
            Command::StartRound => coordinator.start_round(now).map(|_| ()),
            Command::LocalDied {
                final_score,
                elimination_time,
            } => coordinator.local_participant_died(final_score, elimination_time, now),
            Command::TryCollect {
                instance_id,
                effect,
                reply,
            } => {
                let granted = coordinator.try_collect_power_up(&instance_id, effect, now);
                let _ = reply.send(granted);
                Ok(())
            }
            Command::ActivatedEffect {
                duration,
                stacked_duration,
            } => coordinator.local_participant_activated_effect(duration, stacked_duration, now),
            Command::RequestRematch { reply } => {
                let _ = reply.send(coordinator.request_rematch(now));
                Ok(())
            }
            Command::Status { reply } => {
                let _ = reply.send(coordinator.status());
                Ok(())
            }
            Command::Disconnect => {
                coordinator.disconnect();
                Ok(())
            }
            Command::CancelMatchmaking => {
                coordinator.cancel_matchmaking();
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };

        if let Err(err) = result {
            log::warn!("{}: {err}", coordinator.local_id());
        }
    }
}

fn every(hz: u32) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(hz.max(1))));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionConfig;
    use crate::coordinator::LifecycleState;
    use crate::loopback::{LoopbackHub, LoopbackTransport, ScriptedSimulation};
    use crate::ports::{LocalKinematics, TokioClock};

    const T0: f64 = 1_760_000_000.0;

    struct Peer {
        handle: SessionHandle,
        task: JoinHandle<SessionCoordinator<LoopbackTransport, ScriptedSimulation>>,
        sim: ScriptedSimulation,
    }

    fn spawn_peer(hub: &LoopbackHub, id: &str) -> Peer {
        let sim = ScriptedSimulation::new();
        let coordinator = SessionCoordinator::new(
            SessionConfig::default(),
            Participant::new(id, id, true),
            hub.connect(id),
            sim.clone(),
        );
        let (handle, task) = SessionRuntime::spawn(coordinator, TokioClock::starting_at(T0));
        Peer { handle, task, sim }
    }

    /// Move queued hub traffic into the session tasks.
    fn route(hub: &LoopbackHub, peers: &[(&str, &Peer)]) {
        for (id, peer) in peers {
            for (from, bytes) in hub.drain(id) {
                peer.handle.deliver(from, bytes).unwrap();
            }
        }
    }

    async fn run_for(hub: &LoopbackHub, peers: &[(&str, &Peer)], seconds: f64) {
        let steps = (seconds / 0.01).round() as u32;
        for _ in 0..steps {
            tokio::time::sleep(Duration::from_millis(10)).await;
            route(hub, peers);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_plays_a_round() {
        let hub = LoopbackHub::new();
        let a = spawn_peer(&hub, "a");
        let b = spawn_peer(&hub, "b");
        let peers = [("a", &a), ("b", &b)];

        let roster = vec![Participant::new("a", "a", false), Participant::new("b", "b", false)];
        for (_, peer) in &peers {
            peer.handle.begin_matchmaking().unwrap();
            peer.handle.peer_group_established(roster.clone()).unwrap();
        }
        run_for(&hub, &peers, 0.1).await;

        let status = b.handle.status().await.unwrap();
        assert_eq!(status.state, LifecycleState::Active);
        assert_eq!(status.authority_id.as_deref(), Some("a"));
        assert!(status.broadcasting);

        // Warm-up plus ten seconds of play.
        run_for(&hub, &peers, 15.0).await;
        assert!(!b.sim.obstacles().is_empty());
        assert_eq!(a.sim.obstacles(), b.sim.obstacles());

        b.sim.set_kinematics(LocalKinematics {
            is_alive: false,
            ..LocalKinematics::default()
        });
        b.handle.local_participant_died(700, 10.0).unwrap();
        run_for(&hub, &peers, 0.1).await;

        for (_, peer) in &peers {
            let status = peer.handle.status().await.unwrap();
            assert_eq!(status.state, LifecycleState::Ended);
            assert!(!status.broadcasting);
            assert_eq!(status.outcome.unwrap().winner_id, "a");
        }

        a.handle.shutdown().unwrap();
        b.handle.shutdown().unwrap();
        let coordinator = a.task.await.unwrap();
        assert_eq!(coordinator.state(), LifecycleState::Ended);
        b.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_answered_through_handle() {
        let hub = LoopbackHub::new();
        let a = spawn_peer(&hub, "a");
        let b = spawn_peer(&hub, "b");
        let peers = [("a", &a), ("b", &b)];

        let roster = vec![Participant::new("a", "a", false), Participant::new("b", "b", false)];
        for (_, peer) in &peers {
            peer.handle.begin_matchmaking().unwrap();
            peer.handle.peer_group_established(roster.clone()).unwrap();
        }
        run_for(&hub, &peers, 0.1).await;

        assert!(a.handle.try_collect_power_up("powerup_0", EffectKind::Shield).await.unwrap());
        run_for(&hub, &peers, 0.1).await;
        assert!(!b.handle.try_collect_power_up("powerup_0", EffectKind::Shield).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_follows_round() {
        let hub = LoopbackHub::new();
        let a = spawn_peer(&hub, "a");
        let b = spawn_peer(&hub, "b");

        let peers = [("a", &a), ("b", &b)];

        let roster = vec![Participant::new("a", "a", false), Participant::new("b", "b", false)];
        for (_, peer) in &peers {
            peer.handle.begin_matchmaking().unwrap();
            peer.handle.peer_group_established(roster.clone()).unwrap();
        }
        run_for(&hub, &peers, 0.1).await;
        assert!(b.handle.status().await.unwrap().broadcasting);
        hub.drain("a");

        // About 15 updates per second from b, none routed.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let queued = hub.drain("a").len();
        assert!((12..=18).contains(&queued), "queued {queued}");

        b.handle.disconnect().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        hub.drain("a");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(hub.drain("a").is_empty());
    }

    #[tokio::test]
    async fn test_closed_runtime_reports_error() {
        let hub = LoopbackHub::new();
        let a = spawn_peer(&hub, "a");
        a.handle.shutdown().unwrap();
        a.task.await.unwrap();

        assert_eq!(a.handle.begin_matchmaking(), Err(SessionError::RuntimeClosed));
        assert_eq!(a.handle.status().await, Err(SessionError::RuntimeClosed));
    }
}
