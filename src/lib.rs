//! # harvestq
//!
//! Postgres-backed work queue for a content-ingestion pipeline.
//!
//! Tracks sources (remote accounts/feeds to be scraped) and images
//! discovered from them, driving each through a small state machine so
//! that many concurrent workers can claim work without colliding. Every
//! mutating operation is a single atomic statement against the store;
//! the store's transactional guarantees are the only concurrency
//! mechanism in play.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod telemetry;
