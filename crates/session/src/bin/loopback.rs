//! Plays scripted HyprGlide rounds between in-process peers.
//!
//! Usage: `hyprglide-loopback [PEERS] [ROUNDS]` (defaults 3 and 2). Time is
//! simulated at 60 steps per second, so the run finishes immediately.
//! Set `RUST_LOG=debug` to see message routing.

use hyprglide_session::loopback::{LoopbackHub, LoopbackTransport, ScriptedSimulation};
use hyprglide_session::{
    LifecycleState, LocalKinematics, MAX_PARTICIPANTS, MIN_PARTICIPANTS, Participant,
    SessionConfig, SessionCoordinator,
};

type Peer = SessionCoordinator<LoopbackTransport, ScriptedSimulation>;

const EPOCH: f64 = 1_760_000_000.0;
const STEP: f64 = 1.0 / 60.0;
const BROADCAST_EVERY: u32 = 4;
const ROUND_LIMIT_SECS: f64 = 120.0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let peer_count = args
        .next()
        .and_then(|a| a.parse::<usize>().ok())
        .unwrap_or(3)
        .clamp(MIN_PARTICIPANTS, MAX_PARTICIPANTS);
    let rounds = args
        .next()
        .and_then(|a| a.parse::<u32>().ok())
        .unwrap_or(2)
        .max(1);

    let hub = LoopbackHub::new();
    let mut sims = Vec::new();
    let mut peers: Vec<Peer> = (0..peer_count)
        .map(|i| {
            let id = format!("peer-{i}");
            let sim = ScriptedSimulation::new();
            sims.push(sim.clone());
            SessionCoordinator::new(
                SessionConfig::default(),
                Participant::new(id.clone(), format!("Glider {i}"), true),
                hub.connect(id),
                sim,
            )
        })
        .collect();

    let roster: Vec<Participant> = peers
        .iter()
        .map(|p| Participant::new(p.local_id(), p.local_id(), false))
        .collect();
    let mut now = EPOCH;
    for peer in &mut peers {
        if let Err(err) = peer
            .begin_matchmaking()
            .and_then(|()| peer.on_peer_group_established(roster.clone(), now))
        {
            log::error!("{}: {err}", peer.local_id());
            return;
        }
    }
    pump(&hub, &mut peers, now);

    for round in 1..=rounds {
        now = play_round(&hub, &mut peers, &sims, now, round);
        report(&peers);

        // The authority launches as soon as it has opted in and the ballot is
        // large enough, so everyone else votes first.
        if round < rounds {
            for peer in peers.iter_mut().filter(|p| !p.is_authority()) {
                if let Err(err) = peer.request_rematch(now) {
                    log::warn!("{}: {err}", peer.local_id());
                }
            }
            pump(&hub, &mut peers, now);
            for peer in peers.iter_mut().filter(|p| p.is_authority()) {
                if let Err(err) = peer.request_rematch(now) {
                    log::warn!("{}: {err}", peer.local_id());
                }
            }
            pump(&hub, &mut peers, now);
        }
    }
}

/// Step until every peer has seen the round end. Peer `k` dies `4k + 6`
/// seconds into the round, so `peer-0` outlasts everyone.
fn play_round(
    hub: &LoopbackHub,
    peers: &mut [Peer],
    sims: &[ScriptedSimulation],
    mut now: f64,
    round: u32,
) -> f64 {
    let Some(start) = peers.first().and_then(|p| p.setup()).map(|s| s.match_start_time) else {
        log::error!("round {round} never started");
        return now;
    };
    let mut step = 0u32;

    while peers.iter().any(|p| p.state() == LifecycleState::Active) {
        now += STEP;
        step += 1;
        let elapsed = now - start;
        if elapsed > ROUND_LIMIT_SECS {
            log::error!("round {round} did not finish");
            break;
        }

        for (k, (peer, sim)) in peers.iter_mut().zip(sims).enumerate() {
            let phase = elapsed * (0.7 + k as f64 * 0.2);
            let alive = peer
                .runtime_state(peer.local_id())
                .is_some_and(|s| s.is_alive);
            let score = (elapsed.max(0.0) * 100.0) as u64;
            sim.set_kinematics(LocalKinematics {
                position_x: 0.5 + 0.4 * phase.sin(),
                velocity_x: 0.4 * phase.cos(),
                live_score: score,
                is_alive: alive,
            });

            let death_at = 6.0 + 4.0 * k as f64;
            if k > 0 && alive && elapsed >= death_at {
                if let Err(err) = peer.local_participant_died(score, elapsed, now) {
                    log::warn!("{}: {err}", peer.local_id());
                }
            }

            peer.advance(now);
            if step % BROADCAST_EVERY == 0 {
                peer.broadcast_local_state(now);
            }
        }
        pump(hub, peers, now);
    }
    now
}

fn report(peers: &[Peer]) {
    for peer in peers {
        let Some(outcome) = peer.outcome() else {
            log::warn!("{}: no outcome", peer.local_id());
            continue;
        };
        let table: Vec<String> = outcome
            .rankings
            .iter()
            .map(|r| format!("#{} {} ({})", r.rank, r.participant_id, r.score))
            .collect();
        log::info!(
            "{}: winner {}, {} obstacles, digest {}, rankings [{}]",
            peer.local_id(),
            outcome.winner_id,
            peer.stream().obstacles().len(),
            if outcome.digest_matches { "ok" } else { "DIVERGED" },
            table.join(", ")
        );
    }
}

/// Deliver queued messages until the hub is quiet.
fn pump(hub: &LoopbackHub, peers: &mut [Peer], now: f64) {
    while hub.pending() > 0 {
        for peer in peers.iter_mut() {
            let id = peer.local_id().to_string();
            for (from, bytes) in hub.drain(&id) {
                peer.handle_inbound(&from, &bytes, now);
            }
        }
    }
}
