//! Session coordinator.
//!
//! One coordinator runs per peer. It is driven entirely from the outside:
//! transport events, simulation calls and timer ticks all arrive as method
//! calls with an explicit `now` (seconds since the Unix epoch), so the whole
//! state machine can be tested without a runtime.
//!
//! The authority of a round generates spawns, sends them, and feeds them
//! into its own [`EventStream`] the same way a remote peer would. Every peer,
//! authority included, hands spawns to the simulation only once they are due.

use std::collections::{BTreeMap, BTreeSet};

use hyprglide_replay::{AppendOutcome, EventStream, GenerationStep, SpawnRecorder, StepKind};
use hyprglide_sim::{
    ArenaEventGenerator, DeterministicGenerator, EdgeLingerTracker, EdgeSide, EffectKind,
    ObstacleSpawn, PowerUpSpawn, Seconds, SpawnEvent, SpawnKind, SpawnSchedule,
};
use hyprglide_wire::{
    CollectionClaim, EffectActivationNotice, EliminationNotice, Inbound,
    ObstacleSpawnAnnouncement, ParticipantStateUpdate, Payload, PowerUpSpawnAnnouncement,
    RematchRequest, SessionEndAnnouncement, SetupAnnouncement,
};
use uuid::Uuid;

use crate::SessionConfig;
use crate::arbiter::{Claim, CollectionArbiter, RemoteClaimOutcome};
use crate::error::SessionError;
use crate::participant::{Participant, ParticipantRuntimeState, canonical_roster, elect_authority};
use crate::ports::{SimulationPort, Transport};
use crate::ranking::{Ranking, compute_rankings};
use crate::setup::SessionSetup;
use crate::validation::{Disposition, ScreenContext, screen};

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Disconnected,
    Connecting,
    Connected,
    Active,
    Ended,
}

/// How a round ended, as seen by this peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub session_id: Uuid,
    pub winner_id: String,
    pub rankings: Vec<Ranking>,
    /// Whether the authority's spawn digest matched our own stream.
    pub digest_matches: bool,
}

/// Snapshot of coordinator state for callers outside the session task.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: LifecycleState,
    pub local_id: String,
    pub authority_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub roster: Vec<String>,
    pub broadcasting: bool,
    pub outcome: Option<RoundOutcome>,
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct SessionCoordinator<T, S> {
    config: SessionConfig,
    local: Participant,
    transport: T,
    simulation: S,
    state: LifecycleState,
    /// Connected peer group, local included, ordered by id.
    peers: Vec<Participant>,
    authority_id: Option<String>,
    setup: Option<SessionSetup>,
    runtime: BTreeMap<String, ParticipantRuntimeState>,
    /// Authority only: participants not yet eliminated.
    alive: BTreeSet<String>,
    rng: DeterministicGenerator,
    generator: ArenaEventGenerator,
    schedule: SpawnSchedule,
    linger: EdgeLingerTracker,
    recorder: SpawnRecorder,
    stream: EventStream,
    arbiter: CollectionArbiter,
    ballot: BTreeSet<String>,
    /// Set by `request_rematch`; gates rematch setups.
    opted_in: bool,
    broadcasting: bool,
    pending_edge_punish: Option<EdgeSide>,
    /// Setup that arrived before our own peer group formed: `(sender, setup)`.
    early_setup: Option<(String, SetupAnnouncement)>,
    outcome: Option<RoundOutcome>,
}

impl<T: Transport, S: SimulationPort> SessionCoordinator<T, S> {
    pub fn new(config: SessionConfig, local: Participant, transport: T, simulation: S) -> Self {
        let local = Participant {
            is_local: true,
            ..local
        };
        Self {
            arbiter: CollectionArbiter::new(local.id.clone()),
            schedule: SpawnSchedule::new(config.difficulty),
            linger: EdgeLingerTracker::new(config.linger),
            config,
            local,
            transport,
            simulation,
            state: LifecycleState::Disconnected,
            peers: Vec::new(),
            authority_id: None,
            setup: None,
            runtime: BTreeMap::new(),
            alive: BTreeSet::new(),
            rng: DeterministicGenerator::new(0),
            generator: ArenaEventGenerator::new(),
            recorder: SpawnRecorder::default(),
            stream: EventStream::new(),
            ballot: BTreeSet::new(),
            opted_in: false,
            broadcasting: false,
            pending_edge_punish: None,
            early_setup: None,
            outcome: None,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn local_id(&self) -> &str {
        &self.local.id
    }

    pub fn authority_id(&self) -> Option<&str> {
        self.authority_id.as_deref()
    }

    pub fn is_authority(&self) -> bool {
        self.authority_id.as_deref() == Some(self.local.id.as_str())
    }

    pub fn peers(&self) -> &[Participant] {
        &self.peers
    }

    pub fn setup(&self) -> Option<&SessionSetup> {
        self.setup.as_ref()
    }

    pub fn runtime_state(&self, id: &str) -> Option<&ParticipantRuntimeState> {
        self.runtime.get(id)
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub fn arbiter(&self) -> &CollectionArbiter {
        &self.arbiter
    }

    pub fn ballot(&self) -> &BTreeSet<String> {
        &self.ballot
    }

    pub fn outcome(&self) -> Option<&RoundOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcasting
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            local_id: self.local.id.clone(),
            authority_id: self.authority_id.clone(),
            session_id: self.setup.as_ref().map(|s| s.session_id),
            roster: self.peers.iter().map(|p| p.id.clone()).collect(),
            broadcasting: self.broadcasting,
            outcome: self.outcome.clone(),
        }
    }

    /// Seconds since the current round's match start.
    fn elapsed(&self, now: f64) -> Seconds {
        self.setup
            .as_ref()
            .map_or(0.0, |setup| now - setup.match_start_time)
    }

    fn session_tag(&self) -> String {
        self.setup
            .as_ref()
            .map(|s| s.session_id.hyphenated().to_string())
            .unwrap_or_default()
    }

    fn send(&mut self, now: f64, payload: Payload) {
        let channel = payload.channel();
        let bytes = hyprglide_wire::encode(&self.local.id, now, &payload);
        self.transport.send(bytes, channel);
    }

    // ------------------------------------------------------------------------
    // Matchmaking
    // ------------------------------------------------------------------------

    pub fn begin_matchmaking(&mut self) -> Result<(), SessionError> {
        if self.state != LifecycleState::Disconnected {
            return Err(SessionError::WrongState { state: self.state });
        }
        self.state = LifecycleState::Connecting;
        log::info!("{}: matchmaking", self.local.id);
        Ok(())
    }

    /// The transport formed a peer group. Elects the authority and, on the
    /// authority, starts the first round once the roster is large enough.
    pub fn on_peer_group_established(
        &mut self,
        peers: Vec<Participant>,
        now: f64,
    ) -> Result<(), SessionError> {
        if self.state != LifecycleState::Connecting {
            return Err(SessionError::WrongState { state: self.state });
        }

        let mut roster = vec![self.local.clone()];
        roster.extend(peers);
        let local_id = self.local.id.clone();
        self.peers = canonical_roster(roster)
            .into_iter()
            .map(|p| Participant {
                is_local: p.id == local_id,
                ..p
            })
            .collect();
        if self.peers.len() > self.config.max_participants {
            log::warn!(
                "{}: peer group of {} exceeds capacity {}",
                self.local.id,
                self.peers.len(),
                self.config.max_participants
            );
        }

        self.authority_id = elect_authority(&self.peers).map(|p| p.id.clone());
        self.state = LifecycleState::Connected;
        log::info!(
            "{}: connected with {} participants, authority {:?}",
            self.local.id,
            self.peers.len(),
            self.authority_id
        );

        if let Some((sender, proto)) = self.early_setup.take() {
            let disposition = if self.peers.iter().any(|p| p.id == sender) {
                self.on_setup(&proto)
            } else {
                Disposition::DroppedUnknownParticipant
            };
            log::debug!(
                "{}: held setup from {sender}: {disposition:?}",
                self.local.id
            );
        }

        if self.state == LifecycleState::Connected
            && self.is_authority()
            && self.peers.len() >= self.config.min_participants
        {
            self.start_round(now)?;
        }
        Ok(())
    }

    /// Unconditionally return to `Disconnected`, dropping all round state.
    pub fn disconnect(&mut self) {
        if self.state != LifecycleState::Disconnected {
            log::info!("{}: disconnected from {:?}", self.local.id, self.state);
        }
        self.broadcasting = false;
        self.reset_round_state();
        self.peers.clear();
        self.authority_id = None;
        self.setup = None;
        self.ballot.clear();
        self.opted_in = false;
        self.early_setup = None;
        self.outcome = None;
        self.state = LifecycleState::Disconnected;
        self.simulation.clear_round_visuals();
    }

    pub fn cancel_matchmaking(&mut self) {
        log::info!("{}: matchmaking cancelled", self.local.id);
        self.disconnect();
    }

    // ------------------------------------------------------------------------
    // Round Start
    // ------------------------------------------------------------------------

    /// Start a round with every connected peer. Authority only.
    pub fn start_round(&mut self, now: f64) -> Result<Uuid, SessionError> {
        if self.state != LifecycleState::Connected {
            return Err(SessionError::WrongState { state: self.state });
        }
        if !self.is_authority() {
            return Err(SessionError::NotAuthority);
        }
        if self.peers.len() < self.config.min_participants {
            return Err(SessionError::NotEnoughParticipants {
                have: self.peers.len(),
                need: self.config.min_participants,
            });
        }
        let roster = self.peers.clone();
        Ok(self.launch_round(roster, false, now))
    }

    fn launch_round(&mut self, roster: Vec<Participant>, is_rematch: bool, now: f64) -> Uuid {
        let setup = SessionSetup {
            authority_id: self.local.id.clone(),
            arena_seed: rand::random::<u64>(),
            match_start_time: now + self.config.warmup_for(roster.len()),
            session_id: Uuid::new_v4(),
            min_participants: self.config.min_participants,
            max_participants: self.config.max_participants,
            is_rematch,
            participants: roster,
        };
        let session_id = setup.session_id;

        self.send(now, Payload::Setup(setup.to_proto()));
        self.apply_setup(setup);
        session_id
    }

    /// Common path for every peer, the authority included.
    fn apply_setup(&mut self, setup: SessionSetup) {
        self.reset_round_state();
        self.ballot.clear();
        self.opted_in = false;
        self.outcome = None;

        self.rng.reset(setup.arena_seed);
        self.recorder = SpawnRecorder::new(setup.arena_seed);
        self.runtime = setup
            .participants
            .iter()
            .map(|p| (p.id.clone(), ParticipantRuntimeState::default()))
            .collect();
        if setup.authority_id == self.local.id {
            self.alive = setup.participants.iter().map(|p| p.id.clone()).collect();
        }

        self.simulation.clear_round_visuals();
        self.simulation
            .apply_round_setup(&setup.participants, setup.arena_seed, setup.match_start_time);

        log::info!(
            "{}: round {} active, seed {:#018x}, {} participants{}",
            self.local.id,
            setup.session_id,
            setup.arena_seed,
            setup.participants.len(),
            if setup.is_rematch { " (rematch)" } else { "" }
        );
        self.setup = Some(setup);
        self.state = LifecycleState::Active;
        self.broadcasting = true;
    }

    fn reset_round_state(&mut self) {
        self.runtime.clear();
        self.alive.clear();
        self.generator.reset();
        self.schedule.reset();
        self.linger.clear();
        self.stream.clear();
        self.arbiter.clear();
        self.pending_edge_punish = None;
    }

    // ------------------------------------------------------------------------
    // Periodic Work
    // ------------------------------------------------------------------------

    /// Generate due spawns (authority) and hand due events to the simulation.
    pub fn advance(&mut self, now: f64) {
        if self.state != LifecycleState::Active {
            return;
        }
        let elapsed = self.elapsed(now);

        if self.is_authority() {
            self.generate_spawns(elapsed, now);
        }

        for event in self.stream.drain_due(elapsed) {
            match event {
                SpawnEvent::Obstacle(obstacle) => {
                    self.simulation.apply_remote_obstacle_event(&obstacle);
                }
                SpawnEvent::PowerUp(power_up) => {
                    self.simulation
                        .apply_remote_power_up_event(&power_up, &power_up.instance_id);
                }
            }
        }
    }

    fn generate_spawns(&mut self, elapsed: Seconds, now: f64) {
        let session_id = self.session_tag();
        for slot in self.schedule.poll(elapsed + self.config.spawn_lead_secs) {
            match slot.kind {
                SpawnKind::Obstacle => {
                    let (kind, spawn) = match self.pending_edge_punish.take() {
                        Some(side) => (
                            StepKind::EdgePunish(side),
                            self.generator.next_edge_punish(
                                &mut self.rng,
                                side,
                                slot.difficulty,
                                slot.at,
                            ),
                        ),
                        None => (
                            StepKind::Obstacle,
                            self.generator
                                .next_obstacle(&mut self.rng, slot.difficulty, slot.at),
                        ),
                    };
                    self.recorder.record(GenerationStep {
                        kind,
                        difficulty: slot.difficulty,
                        time_offset: slot.at,
                    });
                    let announcement = ObstacleSpawnAnnouncement {
                        session_id: session_id.clone(),
                        ..ObstacleSpawnAnnouncement::from(&spawn)
                    };
                    self.stream.push_obstacle(spawn);
                    self.send(now, Payload::Obstacle(announcement));
                }
                SpawnKind::PowerUp => {
                    let spawn =
                        self.generator
                            .next_power_up(&mut self.rng, slot.difficulty, slot.at);
                    self.recorder.record(GenerationStep {
                        kind: StepKind::PowerUp,
                        difficulty: slot.difficulty,
                        time_offset: slot.at,
                    });
                    let announcement = PowerUpSpawnAnnouncement {
                        session_id: session_id.clone(),
                        ..PowerUpSpawnAnnouncement::from(&spawn)
                    };
                    self.stream.push_power_up(spawn);
                    self.send(now, Payload::PowerUp(announcement));
                }
            }
        }
    }

    /// Send local kinematics on the realtime channel.
    pub fn broadcast_local_state(&mut self, now: f64) {
        if !self.broadcasting || self.state != LifecycleState::Active {
            return;
        }
        let kinematics = self.simulation.local_kinematics();
        let elapsed = self.elapsed(now);

        if let Some(state) = self.runtime.get_mut(&self.local.id) {
            state.apply_update(
                kinematics.position_x,
                kinematics.velocity_x,
                kinematics.live_score,
            );
        }
        if self.is_authority() && kinematics.is_alive {
            let local_id = self.local.id.clone();
            self.observe_linger(&local_id, kinematics.position_x, elapsed);
        }

        let update = ParticipantStateUpdate {
            session_id: self.session_tag(),
            position_x: kinematics.position_x,
            velocity_x: kinematics.velocity_x,
            live_score: kinematics.live_score,
            is_alive: kinematics.is_alive,
        };
        self.send(now, Payload::State(update));
    }

    fn observe_linger(&mut self, id: &str, position_x: f64, elapsed: Seconds) {
        if let Some(side) = self.linger.observe(id, position_x, elapsed) {
            log::debug!("{id} lingering at {side:?} edge; next obstacle punishes");
            self.pending_edge_punish = Some(side);
        }
    }

    // ------------------------------------------------------------------------
    // Simulation Entry Points
    // ------------------------------------------------------------------------

    /// The local participant died with `final_score` at `elimination_time`
    /// seconds after match start.
    pub fn local_participant_died(
        &mut self,
        final_score: u64,
        elimination_time: Seconds,
        now: f64,
    ) -> Result<(), SessionError> {
        if self.state != LifecycleState::Active {
            return Err(SessionError::WrongState { state: self.state });
        }
        let local_id = self.local.id.clone();
        if !self.record_elimination(&local_id, final_score, elimination_time) {
            return Err(SessionError::AlreadyEliminated);
        }

        let notice = EliminationNotice {
            session_id: self.session_tag(),
            final_score,
            elimination_time,
        };
        self.send(now, Payload::Elimination(notice));
        self.evaluate_end(now);
        Ok(())
    }

    /// Ask to collect a power-up. True if the local participant may apply it.
    pub fn try_collect_power_up(
        &mut self,
        instance_id: &str,
        effect: EffectKind,
        now: f64,
    ) -> bool {
        if self.state != LifecycleState::Active {
            return false;
        }
        let claimed_at = self.elapsed(now);
        if !self.arbiter.try_claim(instance_id, effect, claimed_at) {
            return false;
        }

        let claim = CollectionClaim {
            session_id: self.session_tag(),
            instance_id: instance_id.to_string(),
            effect: effect.code(),
            claimed_at,
        };
        self.send(now, Payload::Claim(claim));
        true
    }

    /// The local participant activated a collected effect.
    pub fn local_participant_activated_effect(
        &mut self,
        duration: Seconds,
        stacked_duration: Seconds,
        now: f64,
    ) -> Result<(), SessionError> {
        if self.state != LifecycleState::Active {
            return Err(SessionError::WrongState { state: self.state });
        }
        let local_id = self.local.id.clone();
        self.simulation
            .apply_shared_effect(&local_id, stacked_duration, true);

        let notice = EffectActivationNotice {
            session_id: self.session_tag(),
            duration,
            stacked_duration,
        };
        self.send(now, Payload::Effect(notice));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Eliminations & Round End
    // ------------------------------------------------------------------------

    /// Returns false if `id` is unknown or already eliminated.
    fn record_elimination(&mut self, id: &str, final_score: u64, at: Seconds) -> bool {
        let Some(state) = self.runtime.get_mut(id) else {
            return false;
        };
        if !state.eliminate(final_score, at) {
            return false;
        }
        self.alive.remove(id);
        self.linger.forget(id);
        log::info!("{}: {id} eliminated with {final_score} at {at:.2}s", self.local.id);
        true
    }

    /// Authority: end the round once at most one participant is alive.
    ///
    /// The last survivor wins. If nobody survived, the top-ranked participant
    /// does.
    fn evaluate_end(&mut self, now: f64) {
        if !self.is_authority() || self.state != LifecycleState::Active || self.alive.len() > 1 {
            return;
        }
        let Some(session_id) = self.setup.as_ref().map(|s| s.session_id) else {
            return;
        };

        let kinematics = self.simulation.local_kinematics();
        if let Some(state) = self.runtime.get_mut(&self.local.id)
            && state.is_alive
        {
            state.live_score = state.live_score.max(kinematics.live_score);
        }

        let rankings = compute_rankings(&self.runtime);
        let winner_id = match self.alive.iter().next() {
            Some(survivor) => survivor.clone(),
            None => rankings
                .first()
                .map(|r| r.participant_id.clone())
                .unwrap_or_default(),
        };

        if let Err(err) = self.recorder.verify(&self.stream) {
            log::error!("{}: own spawn stream failed verification: {err}", self.local.id);
        }
        let digest = self.stream.digest();

        let announcement = SessionEndAnnouncement {
            session_id: session_id.hyphenated().to_string(),
            winner_id: winner_id.clone(),
            rankings: rankings.iter().map(Ranking::to_proto).collect(),
            spawn_digest: digest.to_vec(),
            obstacle_count: self.stream.obstacles().len() as u64,
            power_up_count: self.stream.power_ups().len() as u64,
        };
        self.send(now, Payload::SessionEnd(announcement));
        self.apply_end(session_id, winner_id, rankings, &digest);
    }

    fn apply_end(
        &mut self,
        session_id: Uuid,
        winner_id: String,
        rankings: Vec<Ranking>,
        digest: &[u8],
    ) {
        self.broadcasting = false;
        self.state = LifecycleState::Ended;
        self.pending_edge_punish = None;

        let digest_matches = digest == self.stream.digest().as_slice();
        if !digest_matches {
            log::warn!(
                "{}: spawn stream diverged from authority in round {session_id}",
                self.local.id
            );
        }

        log::info!("{}: round {session_id} ended, winner {winner_id}", self.local.id);
        self.simulation.present_round_results(&winner_id, &rankings);
        self.outcome = Some(RoundOutcome {
            session_id,
            winner_id,
            rankings,
            digest_matches,
        });
    }

    // ------------------------------------------------------------------------
    // Disconnects
    // ------------------------------------------------------------------------

    /// The transport lost `id`.
    pub fn on_participant_disconnected(&mut self, id: &str, now: f64) {
        if id == self.local.id {
            self.disconnect();
            return;
        }
        let before = self.peers.len();
        self.peers.retain(|p| p.id != id);
        if self.peers.len() == before {
            return;
        }
        self.ballot.remove(id);

        match self.state {
            LifecycleState::Active => {
                let elapsed = self.elapsed(now);
                let last_score = self.runtime.get(id).map_or(0, |s| s.live_score);
                if self.record_elimination(id, last_score, elapsed) {
                    self.simulation.mark_remote_participant_eliminated(id);
                }
                if self.authority_id.as_deref() == Some(id) {
                    log::warn!(
                        "{}: authority {id} left mid-round; no further spawns or round end",
                        self.local.id
                    );
                }
                self.evaluate_end(now);
            }
            LifecycleState::Connected | LifecycleState::Ended => {
                let previous = self.authority_id.take();
                self.authority_id = elect_authority(&self.peers).map(|p| p.id.clone());
                if previous != self.authority_id {
                    log::info!(
                        "{}: {id} left, authority now {:?}",
                        self.local.id,
                        self.authority_id
                    );
                    // The old authority took its ballot with it; vote again.
                    if self.opted_in {
                        self.cast_rematch_vote(now);
                    }
                }
            }
            LifecycleState::Disconnected | LifecycleState::Connecting => {}
        }
    }

    // ------------------------------------------------------------------------
    // Rematch
    // ------------------------------------------------------------------------

    /// Opt in to another round after the current one ended.
    ///
    /// Calling it again while waiting in `Connected` resends the vote.
    pub fn request_rematch(&mut self, now: f64) -> Result<(), SessionError> {
        let waiting = self.state == LifecycleState::Connected && self.opted_in;
        if self.state != LifecycleState::Ended && !waiting {
            return Err(SessionError::WrongState { state: self.state });
        }
        self.opted_in = true;
        self.state = LifecycleState::Connected;
        self.cast_rematch_vote(now);
        Ok(())
    }

    fn cast_rematch_vote(&mut self, now: f64) {
        if self.is_authority() {
            self.ballot.insert(self.local.id.clone());
            self.maybe_start_rematch(now);
        } else {
            let request = RematchRequest {
                session_id: self.session_tag(),
            };
            self.send(now, Payload::Rematch(request));
        }
    }

    fn maybe_start_rematch(&mut self, now: f64) {
        if !self.is_authority()
            || !self.ballot.contains(&self.local.id)
            || self.ballot.len() < self.config.min_participants
        {
            return;
        }
        let roster: Vec<Participant> = self
            .peers
            .iter()
            .filter(|p| self.ballot.contains(&p.id))
            .cloned()
            .collect();
        self.ballot.clear();
        self.launch_round(roster, true, now);
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Handle bytes received from transport peer `from`.
    pub fn handle_inbound(&mut self, from: &str, bytes: &[u8], now: f64) -> Disposition {
        if self.state == LifecycleState::Disconnected {
            return Disposition::DroppedDisconnected;
        }
        let inbound = match hyprglide_wire::decode(bytes) {
            Ok(inbound) => inbound,
            Err(err) => {
                log::warn!("{}: dropping message from {from}: {err}", self.local.id);
                return Disposition::DroppedUndecodable;
            }
        };

        // The authority may finish forming the group first; its setup is sent
        // once, so keep it until our own election can vouch for the sender.
        if self.state == LifecycleState::Connecting
            && inbound.sender_id == from
            && from != self.local.id
            && let Payload::Setup(proto) = &inbound.payload
        {
            log::debug!("{}: holding setup from {from} until connected", self.local.id);
            self.early_setup = Some((from.to_string(), proto.clone()));
            return Disposition::Deferred;
        }

        let session_id = self.session_tag();
        let ctx = ScreenContext {
            state: self.state,
            local_id: &self.local.id,
            authority_id: self.authority_id.as_deref(),
            roster: &self.peers,
            session_id: self.setup.as_ref().map(|_| session_id.as_str()),
        };
        if let Err(disposition) = screen(from, &inbound, &ctx) {
            log::debug!(
                "{}: dropped {:?} from {from}: {disposition:?}",
                self.local.id,
                inbound.payload.kind()
            );
            return disposition;
        }

        let disposition = self.dispatch(inbound, now);
        if !disposition.is_applied() {
            log::debug!("{}: {from} message not applied: {disposition:?}", self.local.id);
        }
        disposition
    }

    fn dispatch(&mut self, inbound: Inbound, now: f64) -> Disposition {
        let sender = inbound.sender_id;
        match inbound.payload {
            Payload::Setup(m) => self.on_setup(&m),
            Payload::State(m) => self.on_state_update(&sender, &m, now),
            Payload::Obstacle(m) => self.on_obstacle(&m),
            Payload::PowerUp(m) => self.on_power_up(&m),
            Payload::Elimination(m) => self.on_elimination(&sender, &m, now),
            Payload::SessionEnd(m) => self.on_session_end(&m),
            Payload::Claim(m) => self.on_claim(&sender, &m),
            Payload::Effect(m) => self.on_effect(&sender, &m),
            Payload::Rematch(_) => self.on_rematch_request(&sender, now),
        }
    }

    fn on_setup(&mut self, proto: &SetupAnnouncement) -> Disposition {
        let setup = match SessionSetup::from_proto(proto, &self.local.id) {
            Ok(setup) => setup,
            Err(reason) => return Disposition::DroppedInvalid { reason },
        };
        if self.authority_id.as_deref() != Some(setup.authority_id.as_str()) {
            return Disposition::DroppedNotFromAuthority;
        }
        if self.setup.as_ref().map(|s| s.session_id) == Some(setup.session_id) {
            return Disposition::DroppedDuplicate;
        }
        if !setup.includes(&self.local.id) {
            return Disposition::DroppedNotInRoster;
        }
        if (setup.is_rematch || self.state == LifecycleState::Ended) && !self.opted_in {
            log::warn!(
                "{}: ignoring setup {} without a rematch opt-in",
                self.local.id,
                setup.session_id
            );
            return Disposition::DroppedNotOptedIn;
        }

        self.apply_setup(setup);
        Disposition::Applied
    }

    fn on_state_update(
        &mut self,
        sender: &str,
        m: &ParticipantStateUpdate,
        now: f64,
    ) -> Disposition {
        if !m.position_x.is_finite() || !m.velocity_x.is_finite() {
            return Disposition::DroppedInvalid {
                reason: "non-finite kinematics",
            };
        }
        let elapsed = self.elapsed(now);
        let Some(state) = self.runtime.get_mut(sender) else {
            return Disposition::DroppedUnknownParticipant;
        };
        state.apply_update(m.position_x, m.velocity_x, m.live_score);
        let alive = state.is_alive && m.is_alive;

        self.simulation
            .apply_remote_participant_update(sender, m.position_x, m.velocity_x);
        if self.is_authority() && alive {
            self.observe_linger(sender, m.position_x, elapsed);
        }
        Disposition::Applied
    }

    fn on_obstacle(&mut self, m: &ObstacleSpawnAnnouncement) -> Disposition {
        let spawn = match ObstacleSpawn::try_from(m) {
            Ok(spawn) => spawn,
            Err(reason) => return Disposition::DroppedInvalid { reason },
        };
        let outcome = self.stream.push_obstacle(spawn);
        self.append_outcome(outcome, "obstacle")
    }

    fn on_power_up(&mut self, m: &PowerUpSpawnAnnouncement) -> Disposition {
        let spawn = match PowerUpSpawn::try_from(m) {
            Ok(spawn) => spawn,
            Err(reason) => return Disposition::DroppedInvalid { reason },
        };
        let outcome = self.stream.push_power_up(spawn);
        self.append_outcome(outcome, "power-up")
    }

    fn append_outcome(&self, outcome: AppendOutcome, what: &str) -> Disposition {
        match outcome {
            AppendOutcome::Appended => Disposition::Applied,
            AppendOutcome::Duplicate => Disposition::DroppedDuplicate,
            AppendOutcome::Gap { expected } => {
                log::warn!(
                    "{}: {what} stream skipped past index {expected}",
                    self.local.id
                );
                Disposition::Applied
            }
        }
    }

    fn on_elimination(&mut self, sender: &str, m: &EliminationNotice, now: f64) -> Disposition {
        if !m.elimination_time.is_finite() {
            return Disposition::DroppedInvalid {
                reason: "non-finite elimination time",
            };
        }
        if !self.runtime.contains_key(sender) {
            return Disposition::DroppedUnknownParticipant;
        }
        if !self.record_elimination(sender, m.final_score, m.elimination_time) {
            return Disposition::DroppedDuplicate;
        }
        self.simulation.mark_remote_participant_eliminated(sender);
        self.evaluate_end(now);
        Disposition::Applied
    }

    fn on_session_end(&mut self, m: &SessionEndAnnouncement) -> Disposition {
        let Some(session_id) = self.setup.as_ref().map(|s| s.session_id) else {
            return Disposition::DroppedStaleRound;
        };
        let rankings: Vec<Ranking> = m.rankings.iter().map(Ranking::from_proto).collect();
        if m.obstacle_count != self.stream.obstacles().len() as u64
            || m.power_up_count != self.stream.power_ups().len() as u64
        {
            log::warn!(
                "{}: authority sent {} obstacles and {} power-ups, we hold {} and {}",
                self.local.id,
                m.obstacle_count,
                m.power_up_count,
                self.stream.obstacles().len(),
                self.stream.power_ups().len()
            );
        }
        self.apply_end(session_id, m.winner_id.clone(), rankings, &m.spawn_digest);
        Disposition::Applied
    }

    fn on_claim(&mut self, sender: &str, m: &CollectionClaim) -> Disposition {
        let Some(effect) = EffectKind::from_code(m.effect) else {
            return Disposition::DroppedInvalid {
                reason: "unknown effect",
            };
        };
        if m.instance_id.is_empty() || !m.claimed_at.is_finite() {
            return Disposition::DroppedInvalid {
                reason: "malformed claim",
            };
        }

        let claim = Claim {
            claimant: sender.to_string(),
            claimed_at: m.claimed_at,
            effect,
        };
        match self.arbiter.apply_remote_claim(&m.instance_id, claim) {
            RemoteClaimOutcome::Recorded => {
                self.simulation.mark_power_up_collected(&m.instance_id);
                Disposition::Applied
            }
            RemoteClaimOutcome::Superseded { .. } => Disposition::Applied,
            RemoteClaimOutcome::Ignored => Disposition::DroppedLateClaim,
        }
    }

    fn on_effect(&mut self, sender: &str, m: &EffectActivationNotice) -> Disposition {
        if !m.duration.is_finite() || !m.stacked_duration.is_finite() {
            return Disposition::DroppedInvalid {
                reason: "non-finite effect duration",
            };
        }
        self.simulation
            .apply_shared_effect(sender, m.stacked_duration, false);
        Disposition::Applied
    }

    fn on_rematch_request(&mut self, sender: &str, now: f64) -> Disposition {
        if !self.ballot.insert(sender.to_string()) {
            return Disposition::DroppedDuplicate;
        }
        log::info!(
            "{}: {sender} opted in to a rematch ({} on ballot)",
            self.local.id,
            self.ballot.len()
        );
        self.maybe_start_rematch(now);
        Disposition::Applied
    }
}

// ============================================================================
// Tests
// ============================================================================
