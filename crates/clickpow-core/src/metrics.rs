//! Engine metrics.
//!
//! - **Counters**: submissions, clicks, rejected proofs, finalized epochs
//! - **Gauges**: current epoch
//! - **Amount totals**: tokens earned and burned (128-bit base units)
//!
//! # Usage
//!
//! ```rust,ignore
//! let metrics = EngineMetrics::new();
//! metrics.submissions_accepted.inc();
//! println!("{}", metrics.render_prometheus());
//! ```

use crate::Amount;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// =============================================================================
// Metric Types
// =============================================================================

/// A simple counter that can only increase.
#[derive(Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can be set to any value.
#[derive(Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Monotone token total. Token amounts do not fit an `AtomicU64`.
#[derive(Default)]
pub struct AmountTotal {
    value: Mutex<Amount>,
}

impl AmountTotal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, amount: Amount) {
        if let Ok(mut v) = self.value.lock() {
            *v = v.saturating_add(amount);
        }
    }

    pub fn get(&self) -> Amount {
        self.value.lock().map(|v| *v).unwrap_or(0)
    }
}

// =============================================================================
// Engine Metrics
// =============================================================================

pub struct EngineMetrics {
    // Counters
    pub submissions_accepted: Counter,
    pub submissions_rejected: Counter,
    pub clicks_total: Counter,
    pub proofs_rejected: Counter,
    pub epochs_finalized: Counter,
    pub payouts_clamped: Counter,

    // Gauges
    pub current_epoch: Gauge,

    // Token totals
    pub tokens_earned: AmountTotal,
    pub tokens_burned: AmountTotal,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            submissions_accepted: Counter::new(),
            submissions_rejected: Counter::new(),
            clicks_total: Counter::new(),
            proofs_rejected: Counter::new(),
            epochs_finalized: Counter::new(),
            payouts_clamped: Counter::new(),
            current_epoch: Gauge::new(),
            tokens_earned: AmountTotal::new(),
            tokens_burned: AmountTotal::new(),
        }
    }

    /// Export metrics as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "counters": {
                "submissions_accepted": self.submissions_accepted.get(),
                "submissions_rejected": self.submissions_rejected.get(),
                "clicks_total": self.clicks_total.get(),
                "proofs_rejected": self.proofs_rejected.get(),
                "epochs_finalized": self.epochs_finalized.get(),
                "payouts_clamped": self.payouts_clamped.get(),
            },
            "gauges": {
                "current_epoch": self.current_epoch.get(),
            },
            "tokens": {
                "earned": self.tokens_earned.get().to_string(),
                "burned": self.tokens_burned.get().to_string(),
            },
        })
    }

    /// Render in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        let counters: [(&str, &str, u64); 6] = [
            ("clickpow_submissions_accepted_total", "Accepted submissions", self.submissions_accepted.get()),
            ("clickpow_submissions_rejected_total", "Rejected submissions", self.submissions_rejected.get()),
            ("clickpow_clicks_total", "Valid clicks recorded", self.clicks_total.get()),
            ("clickpow_proofs_rejected_total", "Nonces filtered out of accepted batches", self.proofs_rejected.get()),
            ("clickpow_epochs_finalized_total", "Finalized epochs", self.epochs_finalized.get()),
            ("clickpow_payouts_clamped_total", "Submissions whose payout hit the outflow limit", self.payouts_clamped.get()),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        let _ = writeln!(out, "# HELP clickpow_current_epoch Recorded current epoch");
        let _ = writeln!(out, "# TYPE clickpow_current_epoch gauge");
        let _ = writeln!(out, "clickpow_current_epoch {}", self.current_epoch.get());
        for (name, value) in [
            ("clickpow_tokens_earned_total", self.tokens_earned.get()),
            ("clickpow_tokens_burned_total", self.tokens_burned.get()),
        ] {
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
