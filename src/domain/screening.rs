//! Probabilistic screening decisions.
//!
//! Outcomes are decided from a single uniform draw in `[0, 1)` so the
//! classification can be tested without running any worker.

use serde::{Deserialize, Serialize};

/// Outcome probabilities for automatic screening. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoScreenRates {
    pub pass: f64,
    pub retry: f64,
    pub reject: f64,
}

impl Default for AutoScreenRates {
    fn default() -> Self {
        Self {
            pass: 0.85,
            retry: 0.10,
            reject: 0.05,
        }
    }
}

/// Outcome probabilities for manual screening. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualScreenRates {
    pub pass: f64,
    pub reject: f64,
}

impl Default for ManualScreenRates {
    fn default() -> Self {
        Self {
            pass: 0.70,
            reject: 0.30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoVerdict {
    Pass,
    /// Suspicious; route to manual review while attempts remain.
    Retry,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualVerdict {
    Pass,
    Reject,
}

impl AutoScreenRates {
    pub fn classify(&self, draw: f64) -> AutoVerdict {
        if draw < self.pass {
            AutoVerdict::Pass
        } else if draw < self.pass + self.retry {
            AutoVerdict::Retry
        } else {
            AutoVerdict::Reject
        }
    }
}

impl ManualScreenRates {
    pub fn classify(&self, draw: f64) -> ManualVerdict {
        if draw < self.pass {
            ManualVerdict::Pass
        } else {
            ManualVerdict::Reject
        }
    }
}
