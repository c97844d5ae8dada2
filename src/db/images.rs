//! Image ledger operations: dedup'd discovery, storage claims, archival.
//!
//! Discovery passes repeat, so inserts are conflict-ignore on
//! `(source_id, source_url)` — recording the same batch twice is a no-op.
//! Downloaders claim images through the same SKIP LOCKED protocol the
//! source queue uses, so two pool workers never race on the same row.

use crate::error::{Error, Result};
use crate::model::{DiscoverySummary, ImageId, ImageState, PendingImage, SourceId};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use tracing::info;

impl super::Db {
    /// Record a batch of image URLs discovered from a source.
    ///
    /// Duplicate `(source_id, source_url)` pairs are silently skipped.
    /// Empty input short-circuits without a store round trip.
    pub async fn record_discovered_images(
        &self,
        source_id: SourceId,
        urls: &[String],
    ) -> Result<DiscoverySummary> {
        if urls.is_empty() {
            return Ok(DiscoverySummary {
                inserted: 0,
                submitted: Vec::new(),
            });
        }

        let inserted = sqlx::query(
            "INSERT INTO images (source_id, source_url, state)
             SELECT $1, u, $3 FROM UNNEST($2::text[]) AS t(u)
             ON CONFLICT (source_id, source_url) DO NOTHING",
        )
        .bind(source_id.0)
        .bind(urls)
        .bind(ImageState::Pending.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let duplicates = urls.len() as u64 - inserted;
        metrics::images_discovered().add(inserted, &[KeyValue::new("result", "inserted")]);
        metrics::images_discovered().add(duplicates, &[KeyValue::new("result", "duplicate")]);
        info!(source = %source_id, submitted = urls.len(), inserted, "recorded discovered images");

        Ok(DiscoverySummary {
            inserted,
            submitted: urls.to_vec(),
        })
    }

    /// List every image whose archived location has not been recorded.
    ///
    /// Read-only: does not claim. Downloader pools that want exclusive
    /// hand-out should use [`Db::claim_images_to_store`] instead.
    pub async fn list_images_pending_storage(&self) -> Result<Vec<PendingImage>> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT id, source_id, source_url
             FROM images
             WHERE stored_url IS NULL
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_pending_image).collect())
    }

    /// Atomically claim up to `count` images for archival, moving them to
    /// `storing`.
    ///
    /// Like the source claim, this re-matches `storing` rows whose worker
    /// never reported back, so stuck images recover by re-claim.
    pub async fn claim_images_to_store(&self, count: i64) -> Result<Vec<PendingImage>> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "WITH candidates AS (
                 SELECT id FROM images
                 WHERE stored_url IS NULL AND state = ANY($1)
                 ORDER BY id
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             ),
             claimed AS (
                 UPDATE images i
                 SET state = $3, updated_at = now()
                 FROM candidates c
                 WHERE i.id = c.id
                 RETURNING i.id, i.source_id, i.source_url
             )
             SELECT id, source_id, source_url
             FROM claimed
             ORDER BY id",
        )
        .bind(vec![
            ImageState::Pending.as_str(),
            ImageState::Storing.as_str(),
        ])
        .bind(count)
        .bind(ImageState::Storing.as_str())
        .fetch_all(&self.pool)
        .await?;

        info!(requested = count, claimed = rows.len(), "claimed images to store");

        Ok(rows.into_iter().map(into_pending_image).collect())
    }

    /// Record the archived location for one image, marking it `stored`.
    ///
    /// Repeated calls overwrite (last-write-wins). Unknown id is
    /// `NotFound`.
    pub async fn record_stored_location(&self, id: ImageId, stored_url: &str) -> Result<()> {
        let affected = sqlx::query(
            "UPDATE images
             SET stored_url = $2, state = $3, updated_at = now()
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(stored_url)
        .bind(ImageState::Stored.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!("image {id}")));
        }

        metrics::images_stored().add(1, &[]);
        info!(image = %id, "recorded stored location");
        Ok(())
    }
}

fn into_pending_image((id, source_id, source_url): (i64, i64, String)) -> PendingImage {
    PendingImage {
        id: ImageId(id),
        source_id: SourceId(source_id),
        source_url,
    }
}
