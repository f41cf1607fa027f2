//! Edge-linger heuristic.
//!
//! Detects a participant hugging one boundary of the arena for too long so the
//! authority can answer with an edge-punish obstacle. Runs only on the
//! authority and feeds [`crate::ArenaEventGenerator::next_edge_punish`]; the
//! resulting side is recorded with the spawn, so the heuristic itself does not
//! have to be reproducible on other peers.

use std::collections::BTreeMap;

use crate::{EdgeSide, Seconds};

/// Tuning for [`EdgeLingerTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LingerConfig {
    /// Width of the band along each edge, normalized.
    pub band: f64,
    /// Continuous time inside a band before the side is reported.
    pub threshold: Seconds,
    /// Quiet period after a report for the same participant.
    pub cooldown: Seconds,
}

impl Default for LingerConfig {
    fn default() -> Self {
        Self {
            band: 0.12,
            threshold: 2.5,
            cooldown: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LingerEntry {
    side: Option<EdgeSide>,
    since: Seconds,
    quiet_until: Seconds,
}

/// Per-participant edge dwell tracker.
#[derive(Debug, Clone, Default)]
pub struct EdgeLingerTracker {
    config: LingerConfig,
    entries: BTreeMap<String, LingerEntry>,
}

impl EdgeLingerTracker {
    pub fn new(config: LingerConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
        }
    }

    /// Record a position sample and report the side once the dwell threshold
    /// is crossed.
    pub fn observe(
        &mut self,
        participant: &str,
        normalized_x: f64,
        now: Seconds,
    ) -> Option<EdgeSide> {
        let side = self.classify(normalized_x);
        let entry = self
            .entries
            .entry(participant.to_string())
            .or_insert(LingerEntry {
                side,
                since: now,
                quiet_until: f64::NEG_INFINITY,
            });

        if entry.side != side {
            entry.side = side;
            entry.since = now;
            return None;
        }

        let side = side?;
        if now < entry.quiet_until || now - entry.since < self.config.threshold {
            return None;
        }

        entry.quiet_until = now + self.config.cooldown;
        entry.since = now;
        Some(side)
    }

    /// Drop state for a participant that left or was eliminated.
    pub fn forget(&mut self, participant: &str) {
        self.entries.remove(participant);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn classify(&self, normalized_x: f64) -> Option<EdgeSide> {
        if normalized_x < self.config.band {
            Some(EdgeSide::Left)
        } else if normalized_x > 1.0 - self.config.band {
            Some(EdgeSide::Right)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_after_threshold() {
        let mut tracker = EdgeLingerTracker::new(LingerConfig::default());

        assert_eq!(tracker.observe("a", 0.05, 0.0), None);
        assert_eq!(tracker.observe("a", 0.04, 1.0), None);
        assert_eq!(tracker.observe("a", 0.03, 2.5), Some(EdgeSide::Left));
    }

    #[test]
    fn test_leaving_band_resets_dwell() {
        let mut tracker = EdgeLingerTracker::new(LingerConfig::default());

        tracker.observe("a", 0.95, 0.0);
        tracker.observe("a", 0.5, 2.0);
        tracker.observe("a", 0.95, 2.1);
        assert_eq!(tracker.observe("a", 0.95, 4.0), None);
        assert_eq!(tracker.observe("a", 0.95, 4.6), Some(EdgeSide::Right));
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let config = LingerConfig {
            band: 0.1,
            threshold: 1.0,
            cooldown: 5.0,
        };
        let mut tracker = EdgeLingerTracker::new(config);

        tracker.observe("a", 0.0, 0.0);
        assert_eq!(tracker.observe("a", 0.0, 1.0), Some(EdgeSide::Left));
        assert_eq!(tracker.observe("a", 0.0, 2.5), None);
        assert_eq!(tracker.observe("a", 0.0, 6.0), Some(EdgeSide::Left));
    }

    #[test]
    fn test_participants_independent() {
        let mut tracker = EdgeLingerTracker::new(LingerConfig::default());

        tracker.observe("a", 0.01, 0.0);
        tracker.observe("b", 0.5, 0.0);
        assert_eq!(tracker.observe("b", 0.5, 10.0), None);
        assert_eq!(tracker.observe("a", 0.01, 10.0), Some(EdgeSide::Left));

        tracker.forget("a");
        assert_eq!(tracker.observe("a", 0.01, 11.0), None);
    }
}
