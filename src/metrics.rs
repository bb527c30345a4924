//! Metrics instrumentation.
//!
//! Uses the `metrics` crate facade; the binary decides whether an exporter is
//! installed. Without one every call is a no-op.
//!
//! # Metric Naming Convention
//! - `linktrail_` prefix for all metrics
//! - `_total` suffix for counters
//!
//! # Labels
//! - `backend`: cache backend for hit/miss counters
//! - `reason`: why a click was dropped or dead-lettered

use metrics::counter;

pub fn record_link_created() {
    counter!("linktrail_links_created_total").increment(1);
}

pub fn record_cache_hit(backend: &'static str) {
    counter!("linktrail_cache_hits_total", "backend" => backend).increment(1);
}

pub fn record_cache_miss(backend: &'static str) {
    counter!("linktrail_cache_misses_total", "backend" => backend).increment(1);
}

/// A click event accepted by the broker.
pub fn record_click_published() {
    counter!("linktrail_clicks_published_total").increment(1);
}

/// A click event that never reached the broker.
pub fn record_click_dropped(reason: &'static str) {
    counter!("linktrail_clicks_dropped_total", "reason" => reason).increment(1);
}

pub fn record_click_persisted() {
    counter!("linktrail_clicks_persisted_total").increment(1);
}

/// A redelivered click whose record already existed.
pub fn record_click_duplicate() {
    counter!("linktrail_clicks_duplicate_total").increment(1);
}

/// A malformed click message, discarded without retry.
pub fn record_click_invalid() {
    counter!("linktrail_clicks_invalid_total").increment(1);
}

/// A click left pending for redelivery after a transient failure.
pub fn record_click_requeued() {
    counter!("linktrail_clicks_requeued_total").increment(1);
}

pub fn record_click_dead_lettered() {
    counter!("linktrail_clicks_dead_lettered_total").increment(1);
}
