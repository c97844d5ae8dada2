//! Metric instrument factories for harvestq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"harvestq"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for harvestq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("harvestq")
}

/// Counter: sources created.
/// Labels: `site`.
pub fn sources_created() -> Counter<u64> {
    meter()
        .u64_counter("harvestq.sources.created")
        .with_description("Number of sources created")
        .build()
}

/// Counter: sources handed out by claim operations.
/// Labels: `phase` ("populate" | "refresh"), `site` (populate only).
pub fn source_claims() -> Counter<u64> {
    meter()
        .u64_counter("harvestq.sources.claimed")
        .with_description("Number of sources claimed for processing")
        .build()
}

/// Counter: bulk source state transitions.
/// Labels: `to`, `action`.
pub fn source_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("harvestq.sources.state_transitions")
        .with_description("Number of source state transitions")
        .build()
}

/// Counter: discovered image URLs recorded.
/// Labels: `result` ("inserted" | "duplicate").
pub fn images_discovered() -> Counter<u64> {
    meter()
        .u64_counter("harvestq.images.discovered")
        .with_description("Number of discovered image URLs recorded")
        .build()
}

/// Counter: images whose archived location was recorded.
pub fn images_stored() -> Counter<u64> {
    meter()
        .u64_counter("harvestq.images.stored")
        .with_description("Number of images archived")
        .build()
}
