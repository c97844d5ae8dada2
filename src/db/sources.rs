//! Source lifecycle operations: create, claim, report, finish, error.
//!
//! Every mutation here is one atomic statement. Claims use a
//! select-for-update CTE with SKIP LOCKED so the predicate evaluation and
//! the state change are indivisible: two concurrent claims can never hand
//! out the same source id. A worker that crashes after claiming leaves its
//! rows in `populating`; the claim predicate re-matches those rows, so
//! recovery is by re-claim rather than by lease expiry.

use crate::error::{Error, Result};
use crate::model::{
    PopulateClaim, RefreshClaim, Source, SourceId, SourceState, TransitionSummary,
};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use tracing::info;

impl super::Db {
    /// Register a site (idempotent). Sources reference sites by name.
    pub async fn register_site(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT INTO sites (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Create a source in `pending` state, returning its id.
    ///
    /// Fails with `ConstraintViolation` if the site is unknown or the
    /// remote identifier is already registered for that site. Duplicates
    /// are rejected, not merged, so operator-visible duplication bugs
    /// surface at the call site.
    pub async fn create_source(&self, site: &str, remote_identifier: &str) -> Result<SourceId> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO sources (site_id, remote_identifier, state)
             VALUES ((SELECT id FROM sites WHERE name = $1), $2, $3)
             RETURNING id",
        )
        .bind(site)
        .bind(remote_identifier)
        .bind(SourceState::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        metrics::sources_created().add(1, &[KeyValue::new("site", site.to_string())]);
        info!(site, remote_identifier, id = row.0, "source created");
        Ok(SourceId(row.0))
    }

    /// Atomically claim up to `count` sources of `site` for initial
    /// ingestion, moving them to `populating`.
    ///
    /// Matches `pending` rows and `populating` rows left behind by a
    /// crashed worker. Candidates are taken in id order; the ordering is
    /// advisory (claimed work is processed independently) but keeps
    /// re-claims deterministic. Returns the previous earliest cursor so
    /// the worker resumes instead of restarting.
    pub async fn claim_sources_to_populate(
        &self,
        site: &str,
        count: i64,
    ) -> Result<Vec<PopulateClaim>> {
        let rows: Vec<(i64, String, Option<String>)> = sqlx::query_as(
            "WITH candidates AS (
                 SELECT id FROM sources
                 WHERE site_id = (SELECT id FROM sites WHERE name = $1)
                   AND state = ANY($2)
                 ORDER BY id
                 LIMIT $3
                 FOR UPDATE SKIP LOCKED
             ),
             claimed AS (
                 UPDATE sources s
                 SET state = $4, updated_at = now()
                 FROM candidates c
                 WHERE s.id = c.id
                 RETURNING s.id, s.remote_identifier, s.earliest_processed_marker
             )
             SELECT id, remote_identifier, earliest_processed_marker
             FROM claimed
             ORDER BY id",
        )
        .bind(site)
        .bind(vec![
            SourceState::Pending.as_str(),
            SourceState::Populating.as_str(),
        ])
        .bind(count)
        .bind(SourceState::Populating.as_str())
        .fetch_all(&self.pool)
        .await?;

        metrics::source_claims().add(
            rows.len() as u64,
            &[
                KeyValue::new("phase", "populate"),
                KeyValue::new("site", site.to_string()),
            ],
        );
        info!(site, requested = count, claimed = rows.len(), "claimed sources to populate");

        Ok(rows
            .into_iter()
            .map(|(id, remote_identifier, earliest_marker)| PopulateClaim {
                id: SourceId(id),
                remote_identifier,
                earliest_marker,
            })
            .collect())
    }

    /// Atomically claim every `standby` source for refresh, moving them
    /// to `refreshing`.
    ///
    /// Unbounded by design — refresh is a sweep, not a leased batch;
    /// pacing is the caller's concern. Results are ordered most-overdue
    /// first: never-refreshed sources (null `last_refreshed_at`) lead.
    pub async fn claim_sources_to_refresh(&self) -> Result<Vec<RefreshClaim>> {
        let rows: Vec<(i64, String, Option<String>)> = sqlx::query_as(
            "WITH due AS (
                 SELECT id FROM sources
                 WHERE state = $1
                 FOR UPDATE SKIP LOCKED
             ),
             claimed AS (
                 UPDATE sources s
                 SET state = $2, updated_at = now()
                 FROM due d
                 WHERE s.id = d.id
                 RETURNING s.id, s.remote_identifier, s.latest_processed_marker,
                           s.last_refreshed_at
             )
             SELECT id, remote_identifier, latest_processed_marker
             FROM claimed
             ORDER BY last_refreshed_at ASC NULLS FIRST, id",
        )
        .bind(SourceState::Standby.as_str())
        .bind(SourceState::Refreshing.as_str())
        .fetch_all(&self.pool)
        .await?;

        metrics::source_claims().add(rows.len() as u64, &[KeyValue::new("phase", "refresh")]);
        info!(claimed = rows.len(), "claimed sources to refresh");

        Ok(rows
            .into_iter()
            .map(|(id, remote_identifier, latest_marker)| RefreshClaim {
                id: SourceId(id),
                remote_identifier,
                latest_marker,
            })
            .collect())
    }

    /// Update whichever ingestion cursors the worker supplies; an omitted
    /// cursor is left untouched. Ingestion runs forward and backward
    /// passes, so the two report independently.
    pub async fn report_progress(
        &self,
        id: SourceId,
        earliest_marker: Option<&str>,
        latest_marker: Option<&str>,
    ) -> Result<()> {
        let affected = sqlx::query(
            "UPDATE sources
             SET earliest_processed_marker = COALESCE($2, earliest_processed_marker),
                 latest_processed_marker   = COALESCE($3, latest_processed_marker),
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(earliest_marker)
        .bind(latest_marker)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!("source {id}")));
        }
        Ok(())
    }

    /// Transition every id in the set from an in-progress state to
    /// `standby`. Ids not currently in progress are skipped; the summary
    /// reports how many rows actually moved.
    ///
    /// Rows leaving `refreshing` get `last_refreshed_at` stamped; rows
    /// leaving `populating` keep it null until their first refresh cycle.
    /// `action` is a free-form label for the operator log.
    pub async fn finish_processing(
        &self,
        ids: &[SourceId],
        action: &str,
    ) -> Result<TransitionSummary> {
        if ids.is_empty() {
            return Ok(TransitionSummary::empty());
        }

        let affected = sqlx::query(
            "UPDATE sources
             SET state = $2,
                 last_refreshed_at = CASE WHEN state = $3 THEN now()
                                          ELSE last_refreshed_at END,
                 updated_at = now()
             WHERE id = ANY($1) AND state = ANY($4)",
        )
        .bind(ids.iter().map(|id| id.0).collect::<Vec<i64>>())
        .bind(SourceState::Standby.as_str())
        .bind(SourceState::Refreshing.as_str())
        .bind(
            SourceState::in_progress_states()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        metrics::source_state_transitions().add(
            affected,
            &[
                KeyValue::new("to", SourceState::Standby.as_str()),
                KeyValue::new("action", action.to_string()),
            ],
        );
        info!(action, requested = ids.len(), affected, "finished processing sources");

        Ok(TransitionSummary {
            requested: ids.len(),
            affected,
        })
    }

    /// Transition every id in the set to `error`, regardless of current
    /// state. Unknown ids are skipped, not failed.
    pub async fn mark_errors(&self, ids: &[SourceId]) -> Result<TransitionSummary> {
        if ids.is_empty() {
            return Ok(TransitionSummary::empty());
        }

        let affected = sqlx::query(
            "UPDATE sources SET state = $2, updated_at = now() WHERE id = ANY($1)",
        )
        .bind(ids.iter().map(|id| id.0).collect::<Vec<i64>>())
        .bind(SourceState::Error.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        metrics::source_state_transitions().add(
            affected,
            &[
                KeyValue::new("to", SourceState::Error.as_str()),
                KeyValue::new("action", "error"),
            ],
        );
        info!(requested = ids.len(), affected, "marked sources as errored");

        Ok(TransitionSummary {
            requested: ids.len(),
            affected,
        })
    }

    /// Get a source by id.
    pub async fn get_source(&self, id: SourceId) -> Result<Source> {
        let row: Option<SourceRow> = sqlx::query_as(
            "SELECT s.id, sites.name AS site, s.remote_identifier, s.state,
                    s.earliest_processed_marker, s.latest_processed_marker,
                    s.last_refreshed_at, s.created_at, s.updated_at
             FROM sources s
             JOIN sites ON sites.id = s.site_id
             WHERE s.id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("source {id}")))?
            .try_into_source()
    }

    /// List sources, optionally filtered by site and/or state.
    pub async fn list_sources(
        &self,
        site: Option<&str>,
        state: Option<SourceState>,
        limit: i64,
    ) -> Result<Vec<Source>> {
        let rows: Vec<SourceRow> = sqlx::query_as(
            "SELECT s.id, sites.name AS site, s.remote_identifier, s.state,
                    s.earliest_processed_marker, s.latest_processed_marker,
                    s.last_refreshed_at, s.created_at, s.updated_at
             FROM sources s
             JOIN sites ON sites.id = s.site_id
             WHERE ($1::text IS NULL OR sites.name = $1)
               AND ($2::text IS NULL OR s.state = $2)
             ORDER BY s.id
             LIMIT $3",
        )
        .bind(site)
        .bind(state.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRow::try_into_source).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i64,
    site: String,
    remote_identifier: String,
    state: String,
    earliest_processed_marker: Option<String>,
    latest_processed_marker: Option<String>,
    last_refreshed_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl SourceRow {
    fn try_into_source(self) -> Result<Source> {
        Ok(Source {
            id: SourceId(self.id),
            site: self.site,
            remote_identifier: self.remote_identifier,
            state: self.state.parse()?,
            earliest_processed_marker: self.earliest_processed_marker,
            latest_processed_marker: self.latest_processed_marker,
            last_refreshed_at: self.last_refreshed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
