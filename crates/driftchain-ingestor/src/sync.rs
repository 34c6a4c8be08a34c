//! Sync-mode tracking: the `Normal`/`Sync` FSM that governs how widely a
//! witness widens its block-collision window while catching up to the
//! anchor chain's tip.

use driftchain_types::block::SyncMode;

/// Tracks how far local anchor ingestion trails the anchor chain's tip and
/// derives the [`SyncMode`] a witness should report on blocks it produces.
///
/// Transitions (spec §4.5):
/// - `Normal -> Sync` when the observed lag exceeds `enter_sync_lag`.
/// - `Sync -> Normal` once the lag drops to zero (fully caught up), not
///   merely back under the entry threshold, to avoid flapping at the
///   boundary.
#[derive(Debug, Clone)]
pub struct SyncTracker {
    mode: SyncMode,
    local_height: u64,
    remote_tip: u64,
    enter_sync_lag: u64,
}

impl SyncTracker {
    /// Builds a tracker starting in `Normal` mode with no observed lag.
    pub fn new(enter_sync_lag: u64) -> Self {
        Self {
            mode: SyncMode::Normal,
            local_height: 0,
            remote_tip: 0,
            enter_sync_lag,
        }
    }

    /// Records the anchor chain's current tip height as last observed.
    pub fn observe_remote_tip(&mut self, height: u64) {
        self.remote_tip = self.remote_tip.max(height);
        self.recompute();
    }

    /// Records the height through which local ingestion has progressed.
    pub fn observe_local_progress(&mut self, height: u64) {
        self.local_height = self.local_height.max(height);
        self.recompute();
    }

    fn recompute(&mut self) {
        let lag = self.anchor_lag();
        self.mode = match self.mode {
            SyncMode::Normal if lag > self.enter_sync_lag => SyncMode::Sync,
            SyncMode::Sync if lag == 0 => SyncMode::Normal,
            other => other,
        };
    }

    /// How many anchor blocks behind the observed tip local ingestion is.
    pub fn anchor_lag(&self) -> u64 {
        self.remote_tip.saturating_sub(self.local_height)
    }

    /// The current sync mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }
}

/// An exponentially-weighted moving average, used to smooth the observed
/// anchor ingestion lag for logging/metrics without reacting to every
/// single-block jitter.
#[derive(Debug, Clone, Copy)]
pub struct EmaGauge {
    alpha: f64,
    value: Option<f64>,
}

impl EmaGauge {
    /// Builds a gauge with smoothing factor `alpha` in `(0.0, 1.0]`; larger
    /// values track recent samples more closely.
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Folds in a new sample, returning the updated average.
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            Some(prev) => prev + self.alpha * (sample - prev),
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// The current average, or `None` if no sample has been observed yet.
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
