//! Power-up collection arbitration.
//!
//! Local-first: a local claim is granted immediately if this peer has not
//! seen a claim for the instance yet. Remote claims are merged so that all
//! peers settle on the same claimant once claims have been exchanged: the
//! earlier `claimed_at` wins, and equal times go to the smaller participant
//! id. A local claim that loses this comparison is reported as superseded;
//! the effect it already applied is left in place.

use std::cmp::Ordering;
use std::collections::HashMap;

use hyprglide_sim::{EffectKind, Seconds};

/// One recorded claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub claimant: String,
    /// Seconds after match start.
    pub claimed_at: Seconds,
    pub effect: EffectKind,
}

impl Claim {
    /// Whether `self` takes precedence over `other`.
    fn precedes(&self, other: &Claim) -> bool {
        match self.claimed_at.total_cmp(&other.claimed_at) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.claimant < other.claimant,
        }
    }
}

/// Result of merging a remote claim.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteClaimOutcome {
    /// First claim seen for the instance.
    Recorded,
    /// An earlier or identical claim is already recorded.
    Ignored,
    /// The remote claim replaced `previous`.
    Superseded { previous: Claim },
}

/// Collection record for one round.
#[derive(Debug, Clone)]
pub struct CollectionArbiter {
    local_id: String,
    record: HashMap<String, Claim>,
}

impl CollectionArbiter {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            record: HashMap::new(),
        }
    }

    /// Claim `instance_id` for the local participant.
    ///
    /// Returns true if no claim for the instance was known.
    pub fn try_claim(
        &mut self,
        instance_id: &str,
        effect: EffectKind,
        claimed_at: Seconds,
    ) -> bool {
        if self.record.contains_key(instance_id) {
            log::debug!("Claim for {instance_id} refused: already collected");
            return false;
        }
        self.record.insert(
            instance_id.to_string(),
            Claim {
                claimant: self.local_id.clone(),
                claimed_at,
                effect,
            },
        );
        true
    }

    /// Merge a claim announced by another peer.
    pub fn apply_remote_claim(&mut self, instance_id: &str, claim: Claim) -> RemoteClaimOutcome {
        match self.record.get_mut(instance_id) {
            None => {
                self.record.insert(instance_id.to_string(), claim);
                RemoteClaimOutcome::Recorded
            }
            Some(existing) if claim.precedes(existing) => {
                let previous = std::mem::replace(existing, claim);
                if previous.claimant == self.local_id {
                    log::warn!(
                        "Local claim on {instance_id} lost to {}; effect already applied",
                        existing.claimant
                    );
                }
                RemoteClaimOutcome::Superseded { previous }
            }
            Some(_) => RemoteClaimOutcome::Ignored,
        }
    }

    /// Current claimant of `instance_id`, if any.
    pub fn claimant(&self, instance_id: &str) -> Option<&str> {
        self.record.get(instance_id).map(|c| c.claimant.as_str())
    }

    /// Whether the local participant currently holds `instance_id`.
    pub fn holds(&self, instance_id: &str) -> bool {
        self.claimant(instance_id) == Some(self.local_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn clear(&mut self) {
        self.record.clear();
    }
}
