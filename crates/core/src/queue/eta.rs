//! Wait-time estimation.
//!
//! `eta = (rank + 1) * avg_service_ms`: the waiter at rank 0 still
//! has one full service ahead of them. The average is an exponential
//! moving average of observed active-session durations. Expired
//! sessions contribute the full active window; the slot was occupied
//! for the whole window, and excluding abandonments would make the
//! estimate systematically optimistic.

use serde::{Deserialize, Serialize};

/// Estimator over the per-scope rolling average service time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EtaEstimator {
    /// Average used before any session has completed.
    pub default_avg_ms: f64,
    /// EMA smoothing factor in (0, 1]; higher weighs recent sessions
    /// more heavily.
    pub alpha: f64,
}

impl EtaEstimator {
    pub fn new(default_avg_ms: f64, alpha: f64) -> Self {
        Self {
            default_avg_ms,
            alpha,
        }
    }

    /// Estimated wait in milliseconds for a ticket at zero-based
    /// `rank`.
    pub fn estimate_ms(&self, rank: u64, avg_ms: Option<f64>) -> u64 {
        let avg = avg_ms.unwrap_or(self.default_avg_ms).max(0.0);
        ((rank + 1) as f64 * avg).round() as u64
    }

    /// Fold one observed session duration into the rolling average.
    pub fn update(&self, current: Option<f64>, sample_ms: f64) -> f64 {
        let sample = sample_ms.max(0.0);
        match current {
            Some(avg) => self.alpha * sample + (1.0 - self.alpha) * avg,
            None => sample,
        }
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self {
            default_avg_ms: 60_000.0,
            alpha: 0.2,
        }
    }
}
