//! Internal counters.
//!
//! # Responsibilities
//! - Count entries lost to diode overflow
//! - Count annotation fields dropped because they could not be encoded
//! - Count failed writes to the sink
//!
//! # Metrics
//! - `ctxlog_entries_dropped_total` (counter): entries the diode discarded
//! - `ctxlog_annotation_fields_dropped_total` (counter): fields omitted from
//!   annotation snapshots
//! - `ctxlog_write_errors_total` (counter): sink writes that returned an error
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - No labels: the layer has a single sink per logger

pub const ENTRIES_DROPPED: &str = "ctxlog_entries_dropped_total";
pub const ANNOTATION_FIELDS_DROPPED: &str = "ctxlog_annotation_fields_dropped_total";
pub const WRITE_ERRORS: &str = "ctxlog_write_errors_total";

pub fn record_dropped_entries(count: usize) {
    metrics::counter!(ENTRIES_DROPPED).increment(count as u64);
}

pub fn record_annotation_field_dropped() {
    metrics::counter!(ANNOTATION_FIELDS_DROPPED).increment(1);
}

pub fn record_write_error() {
    metrics::counter!(WRITE_ERRORS).increment(1);
}
