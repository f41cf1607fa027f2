//! Final rankings.
//!
//! Order: score descending; on equal score, survivors before eliminated
//! participants and later eliminations before earlier ones; then participant
//! id ascending. Ranks are ordinal, 1 through n, so equal scores never share
//! a rank.

use std::cmp::Ordering;

use hyprglide_sim::Seconds;
use hyprglide_wire::RankingEntry;

use crate::participant::ParticipantRuntimeState;

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub participant_id: String,
    pub score: u64,
    /// 1-based.
    pub rank: u32,
    /// `None` when the participant survived the round.
    pub elimination_time: Option<Seconds>,
}

impl Ranking {
    pub fn to_proto(&self) -> RankingEntry {
        RankingEntry {
            participant_id: self.participant_id.clone(),
            score: self.score,
            rank: self.rank,
            elimination_time: self.elimination_time,
        }
    }

    pub fn from_proto(proto: &RankingEntry) -> Self {
        Self {
            participant_id: proto.participant_id.clone(),
            score: proto.score,
            rank: proto.rank,
            elimination_time: proto.elimination_time,
        }
    }
}

/// Rank every participant in `states`.
pub fn compute_rankings<'a, I>(states: I) -> Vec<Ranking>
where
    I: IntoIterator<Item = (&'a String, &'a ParticipantRuntimeState)>,
{
    let mut entries: Vec<(&String, u64, Option<Seconds>)> = states
        .into_iter()
        .map(|(id, state)| (id, state.ranking_score(), state.elimination_time))
        .collect();

    entries.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| survival_order(a.2, b.2))
            .then_with(|| a.0.cmp(b.0))
    });

    entries
        .into_iter()
        .zip(1u32..)
        .map(|((id, score, elimination_time), rank)| Ranking {
            participant_id: id.clone(),
            score,
            rank,
            elimination_time,
        })
        .collect()
}

/// Survivors first, then the later elimination first.
fn survival_order(a: Option<Seconds>, b: Option<Seconds>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.total_cmp(&a),
    }
}
