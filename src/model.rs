//! Core data model.
//!
//! A source is a remote account/feed to be scraped. It cycles through a
//! closed set of lifecycle states: claimed for initial ingestion, settled
//! into standby, periodically re-claimed for refresh. Images are content
//! discovered from a source, awaiting archival by a downloader pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Newtype for store-assigned source ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub i64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for store-assigned image ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageId(pub i64);

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Source state
// ---------------------------------------------------------------------------

/// Lifecycle state of a source.
///
/// Only a claim operation moves a source into an in-progress state
/// (`Populating`, `Refreshing`), and only a report-back operation moves
/// it out. `Error` sources are not automatically reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Newly created, never processed.
    Pending,
    /// Claimed for initial ingestion.
    Populating,
    /// Settled, fully ingested; eligible for refresh.
    Standby,
    /// Claimed for incremental re-ingestion.
    Refreshing,
    /// A worker reported failure. Manual intervention required.
    Error,
}

impl SourceState {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceState::Pending => "pending",
            SourceState::Populating => "populating",
            SourceState::Standby => "standby",
            SourceState::Refreshing => "refreshing",
            SourceState::Error => "error",
        }
    }

    /// Can transition from self to `to`?
    ///
    /// Error marking is unconditional: workers report failures for
    /// whatever they were handed, including stale id sets after a crash.
    pub fn can_transition_to(self, to: SourceState) -> bool {
        use SourceState::*;
        matches!(
            (self, to),
            (Pending, Populating)
                | (Populating, Populating) // crash-recovery re-claim
                | (Populating, Standby)
                | (Standby, Refreshing)
                | (Refreshing, Standby)
                | (_, Error)
        )
    }

    /// Is this state held by a worker that has claimed the source?
    pub fn is_in_progress(self) -> bool {
        matches!(self, SourceState::Populating | SourceState::Refreshing)
    }

    /// The states a `finish_processing` call may transition out of.
    pub fn in_progress_states() -> [SourceState; 2] {
        [SourceState::Populating, SourceState::Refreshing]
    }
}

impl std::str::FromStr for SourceState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SourceState::Pending),
            "populating" => Ok(SourceState::Populating),
            "standby" => Ok(SourceState::Standby),
            "refreshing" => Ok(SourceState::Refreshing),
            "error" => Ok(SourceState::Error),
            other => Err(crate::error::Error::InvalidState(other.to_string())),
        }
    }
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Image state
// ---------------------------------------------------------------------------

/// Lifecycle state of a discovered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageState {
    /// Discovered, not yet claimed by a downloader.
    Pending,
    /// Claimed by a downloader; archival in flight.
    Storing,
    /// Archived location recorded.
    Stored,
}

impl ImageState {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageState::Pending => "pending",
            ImageState::Storing => "storing",
            ImageState::Stored => "stored",
        }
    }
}

impl std::str::FromStr for ImageState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImageState::Pending),
            "storing" => Ok(ImageState::Storing),
            "stored" => Ok(ImageState::Stored),
            other => Err(crate::error::Error::InvalidState(other.to_string())),
        }
    }
}

impl std::fmt::Display for ImageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A source row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,

    /// Which remote platform this source belongs to. Immutable.
    pub site: String,

    /// Platform-specific handle/id. Immutable.
    pub remote_identifier: String,

    pub state: SourceState,

    /// Cursor for the backward (historical) ingestion pass. Set only by
    /// the owning worker while the source is claimed.
    pub earliest_processed_marker: Option<String>,

    /// Cursor for the forward (incremental) ingestion pass.
    pub latest_processed_marker: Option<String>,

    /// Stamped only on transition out of `refreshing`. Null until the
    /// source's first refresh cycle, so initial ingestion is
    /// distinguishable from steady-state refresh.
    pub last_refreshed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// A source handed to a scraper worker for initial ingestion.
///
/// Carries the previous earliest cursor so a worker resuming after a
/// crash continues where the last one stopped instead of restarting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateClaim {
    pub id: SourceId,
    pub remote_identifier: String,
    pub earliest_marker: Option<String>,
}

/// A source handed to a scraper worker for incremental refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaim {
    pub id: SourceId,
    pub remote_identifier: String,
    pub latest_marker: Option<String>,
}

/// An image awaiting archival, as handed to a downloader worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImage {
    pub id: ImageId,
    pub source_id: SourceId,
    pub source_url: String,
}

// ---------------------------------------------------------------------------
// Operation summaries
// ---------------------------------------------------------------------------

/// Outcome of a bulk state transition.
///
/// Partial or zero effect is a normal outcome, not an error: callers
/// routinely pass stale or overlapping id sets after crash recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSummary {
    /// How many ids the caller passed in.
    pub requested: usize,
    /// How many rows the store actually transitioned.
    pub affected: u64,
}

impl TransitionSummary {
    pub fn empty() -> Self {
        Self {
            requested: 0,
            affected: 0,
        }
    }
}

/// Outcome of recording a batch of discovered image URLs.
///
/// Distinguishes "0 of 5 inserted because all duplicates" from
/// "5 of 5 inserted"; the submitted list is echoed back for audit logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    /// Rows actually inserted (duplicates excluded).
    pub inserted: u64,
    /// The full input list, in submission order.
    pub submitted: Vec<String>,
}
