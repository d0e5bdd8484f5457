// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-binding exponential backoff for failed reconciliations.

use crate::constants::backoff::{BASE_SECS, MAX_SECS};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Tracks consecutive failures per key. Delays double from `base` up to `max`.
#[derive(Debug)]
pub struct ErrorBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(BASE_SECS), Duration::from_secs(MAX_SECS))
    }
}

impl ErrorBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let attempt = failures.entry(key.to_string()).or_insert(0);
        let delay = self
            .base
            .checked_mul(2u32.saturating_pow(*attempt))
            .map_or(self.max, |d| d.min(self.max));
        *attempt = attempt.saturating_add(1);
        delay
    }

    /// Forget failures after a successful reconciliation
    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}
