// Stats Aggregator: per-session snapshots folded into pool-wide rollups.

use std::collections::BTreeMap;
use std::fmt;

/// Download counters of one rendition at the moment of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenditionStats {
    /// `WIDTHxHEIGHT`, or the rendition index when the master had none.
    pub resolution: String,
    /// Whether this is the untranscoded source rendition.
    pub source: bool,
    pub attempted: u64,
    pub succeeded: u64,
}

/// Immutable copy of one session's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub stream: String,
    pub renditions: Vec<RenditionStats>,
}

impl SessionSnapshot {
    pub fn rollup(&self) -> StatsRollup {
        let mut rollup = StatsRollup::default();
        rollup.merge(self);
        rollup
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub attempted: u64,
    pub succeeded: u64,
}

impl Counts {
    fn add(&mut self, attempted: u64, succeeded: u64) {
        self.attempted += attempted;
        self.succeeded += succeeded;
    }
}

/// Additive aggregate of any number of session snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsRollup {
    pub sessions: usize,
    pub source: Counts,
    pub transcoded: Counts,
    /// Keyed by (is source, resolution).
    pub by_resolution: BTreeMap<(bool, String), Counts>,
}

impl StatsRollup {
    pub fn merge(&mut self, snapshot: &SessionSnapshot) {
        self.sessions += 1;
        for rendition in &snapshot.renditions {
            let side = if rendition.source {
                &mut self.source
            } else {
                &mut self.transcoded
            };
            side.add(rendition.attempted, rendition.succeeded);
            self.by_resolution
                .entry((rendition.source, rendition.resolution.clone()))
                .or_default()
                .add(rendition.attempted, rendition.succeeded);
        }
    }

    /// Folds another rollup into this one.
    pub fn combine(&mut self, other: &StatsRollup) {
        self.sessions += other.sessions;
        self.source.add(other.source.attempted, other.source.succeeded);
        self.transcoded
            .add(other.transcoded.attempted, other.transcoded.succeeded);
        for (key, counts) in &other.by_resolution {
            self.by_resolution
                .entry(key.clone())
                .or_default()
                .add(counts.attempted, counts.succeeded);
        }
    }

    /// Transcoded successes per source success, in percent. `None` while no
    /// source segment has been downloaded.
    pub fn success_rate(&self) -> Option<f64> {
        if self.source.succeeded == 0 {
            return None;
        }
        Some(self.transcoded.succeeded as f64 / self.source.succeeded as f64 * 100.0)
    }

    pub fn rate(&self) -> SuccessRate {
        SuccessRate(self.success_rate())
    }
}

/// Display helper that never renders NaN or infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuccessRate(pub Option<f64>);

impl fmt::Display for SuccessRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rate) if rate.is_finite() => write!(f, "{rate:.2}%"),
            _ => f.write_str("n/a"),
        }
    }
}
