//! Metric handles for the dispatcher.
//!
//! With the `metrics` feature the handles are OpenTelemetry instruments
//! registered once through [`init`]; without it every recording function
//! compiles to a no-op so call sites stay unconditional.

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
static CYCLES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CYCLE_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CYCLE_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static MESSAGES_WRITTEN: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static MESSAGES_DROPPED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ITEMS_SKIPPED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static READ_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static MESSAGES_HANDLED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static WORKERS_OUTSTANDING: OnceLock<UpDownCounter<i64>> = OnceLock::new();

/// Registers every instrument on `meter`. Later calls are ignored.
#[cfg(feature = "metrics")]
pub fn init(meter: &Meter) {
    let _ = CYCLES.set(
        meter
            .u64_counter("cycles")
            .with_description("Dispatch cycles started")
            .build(),
    );

    let _ = CYCLE_ERRORS.set(
        meter
            .u64_counter("cycle_errors")
            .with_description("Dispatch cycles skipped because of an error")
            .build(),
    );

    let _ = CYCLE_DURATION_MS.set(
        meter
            .f64_histogram("cycle_duration")
            .with_unit("ms")
            .with_description("Fetch-to-drain duration of a dispatch cycle")
            .build(),
    );

    let _ = MESSAGES_WRITTEN.set(
        meter
            .u64_counter("messages_written")
            .with_description("Messages acknowledged by the transport")
            .build(),
    );

    let _ = MESSAGES_DROPPED.set(
        meter
            .u64_counter("messages_dropped")
            .with_description("Messages lost to a failed batch flush")
            .build(),
    );

    let _ = ITEMS_SKIPPED.set(
        meter
            .u64_counter("items_skipped")
            .with_description("Work items that could not be encoded")
            .build(),
    );

    let _ = READ_ERRORS.set(
        meter
            .u64_counter("read_errors")
            .with_description("Failed consumer reads")
            .build(),
    );

    let _ = MESSAGES_HANDLED.set(
        meter
            .u64_counter("messages_handled")
            .with_description("Messages consumed and handled successfully")
            .build(),
    );

    let _ = WORKERS_OUTSTANDING.set(
        meter
            .i64_up_down_counter("workers_outstanding")
            .with_description("Workers that have not reached Done")
            .build(),
    );
}

#[cfg(feature = "metrics")]
pub fn increment_cycles() {
    if let Some(counter) = CYCLES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_cycles() {}

#[cfg(feature = "metrics")]
pub fn increment_cycle_errors() {
    if let Some(counter) = CYCLE_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_cycle_errors() {}

#[cfg(feature = "metrics")]
pub fn record_cycle_duration(duration_ms: f64) {
    if let Some(histogram) = CYCLE_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_cycle_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_messages_written(count: u64) {
    if let Some(counter) = MESSAGES_WRITTEN.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_messages_written(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_messages_dropped(count: u64) {
    if let Some(counter) = MESSAGES_DROPPED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_messages_dropped(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_items_skipped() {
    if let Some(counter) = ITEMS_SKIPPED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_items_skipped() {}

#[cfg(feature = "metrics")]
pub fn increment_read_errors() {
    if let Some(counter) = READ_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_read_errors() {}

#[cfg(feature = "metrics")]
pub fn increment_messages_handled() {
    if let Some(counter) = MESSAGES_HANDLED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_messages_handled() {}

#[cfg(feature = "metrics")]
pub fn add_workers_outstanding(delta: i64) {
    if let Some(counter) = WORKERS_OUTSTANDING.get() {
        counter.add(delta, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn add_workers_outstanding(_delta: i64) {}
