//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queue manager (joins, departures, promotions)
//! - Active sessions (completions, expiries, service time)
//! - Notifier (events published)
//! - Cleanup sweeps

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
};

// =============================================================================
// Queue Metrics
// =============================================================================

/// Join attempts total by outcome.
pub static JOINS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("anteroom_joins_total", "Total join attempts"),
        &["outcome"], // "queued", "admitted", "duplicate", "rejected"
    )
    .unwrap()
});

/// Promotions from waiting to active.
pub static PROMOTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "anteroom_promotions_total",
        "Total tickets promoted from waiting to active",
    )
    .unwrap()
});

/// Voluntary departures from the waiting queue.
pub static LEAVES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "anteroom_leaves_total",
        "Total tickets that left the waiting queue voluntarily",
    )
    .unwrap()
});

/// Current queue depth per scope.
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("anteroom_queue_depth", "Current waiting queue depth"),
        &["scope"],
    )
    .unwrap()
});

/// Current active sessions per scope.
pub static ACTIVE_SESSIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("anteroom_active_sessions", "Current active session count"),
        &["scope"],
    )
    .unwrap()
});

// =============================================================================
// Session Metrics
// =============================================================================

/// Active sessions ended by result.
pub static SESSIONS_ENDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("anteroom_sessions_ended_total", "Total active sessions ended"),
        &["result"], // "completed", "terminated", "expired"
    )
    .unwrap()
});

/// Observed service time in seconds.
pub static SERVICE_TIME: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "anteroom_service_time_seconds",
            "Time from admission to session end",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Notifier Metrics
// =============================================================================

/// Events published by channel kind and event kind.
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("anteroom_events_published_total", "Total events published"),
        &["channel", "event"], // channel: "public", "private"
    )
    .unwrap()
});

// =============================================================================
// Cleanup Metrics
// =============================================================================

/// Scopes purged by cleanup sweeps.
pub static SCOPES_PURGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "anteroom_scopes_purged_total",
        "Total scopes purged by cleanup sweeps",
    )
    .unwrap()
});

/// Keys deleted by cleanup sweeps.
pub static KEYS_PURGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "anteroom_keys_purged_total",
        "Total store keys deleted by cleanup sweeps",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Queue
        Box::new(JOINS_TOTAL.clone()),
        Box::new(PROMOTIONS_TOTAL.clone()),
        Box::new(LEAVES_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        // Sessions
        Box::new(SESSIONS_ENDED.clone()),
        Box::new(SERVICE_TIME.clone()),
        // Notifier
        Box::new(EVENTS_PUBLISHED.clone()),
        // Cleanup
        Box::new(SCOPES_PURGED.clone()),
        Box::new(KEYS_PURGED.clone()),
    ]
}
