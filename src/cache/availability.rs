/*!
 * Availability Cache
 *
 * Persistent snapshot of PMS availability keyed by
 * (practitioner, business, date). Entries carry a TTL and an `is_stale`
 * flag; an entry is served only while `NOT is_stale AND expires_at > now`.
 *
 * Read failures degrade to a cache miss so a broken cache can never block
 * a request. Write failures are logged and swallowed. Staleness marking is
 * the exception: the booking coordinator marks entries stale inside its
 * own transaction, and a failure there must fail the booking write too.
 */

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::cache::stats::CacheStats;
use crate::models::{
    AvailabilityCacheEntry, BusinessId, CacheTier, ClinicId, PractitionerId,
};

/// Persistent availability cache
#[derive(Clone)]
pub struct AvailabilityCache {
    pool: PgPool,
    ttl: Duration,
    stats: CacheStats,
}

impl AvailabilityCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let stats = CacheStats::new(pool.clone());
        Self { pool, ttl, stats }
    }

    /// Read a single valid entry, touching its query recency
    pub async fn get(
        &self,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
        date: NaiveDate,
    ) -> Option<Vec<DateTime<Utc>>> {
        let result = sqlx::query_as::<_, AvailabilityCacheEntry>(
            r#"
            UPDATE availability_cache
            SET last_queried_at = NOW()
            WHERE practitioner_id = $1
              AND business_id = $2
              AND date = $3
              AND NOT is_stale
              AND expires_at > NOW()
            RETURNING clinic_id, practitioner_id, business_id, date, slots,
                      cached_at, expires_at, is_stale, last_queried_at
            "#,
        )
        .bind(practitioner_id)
        .bind(business_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(entry)) => {
                self.stats.record_hit(CacheTier::Availability).await;
                Some(entry.slots.0)
            }
            Ok(None) => {
                self.stats.record_miss(CacheTier::Availability).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "Availability cache read failed, treating as miss");
                None
            }
        }
    }

    /// Batch-read the valid subset of a date range for one
    /// (practitioner, business). Missing, stale, and expired dates are
    /// simply absent from the result.
    pub async fn get_range(
        &self,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> HashMap<NaiveDate, Vec<DateTime<Utc>>> {
        let result = sqlx::query_as::<_, AvailabilityCacheEntry>(
            r#"
            UPDATE availability_cache
            SET last_queried_at = NOW()
            WHERE practitioner_id = $1
              AND business_id = $2
              AND date BETWEEN $3 AND $4
              AND NOT is_stale
              AND expires_at > NOW()
            RETURNING clinic_id, practitioner_id, business_id, date, slots,
                      cached_at, expires_at, is_stale, last_queried_at
            "#,
        )
        .bind(practitioner_id)
        .bind(business_id)
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(entries) => entries
                .into_iter()
                .map(|e| (e.date, e.slots.0))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Availability cache range read failed, treating as miss");
                HashMap::new()
            }
        }
    }

    /// Write fresh slots for a key, clearing staleness and resetting the TTL
    pub async fn set(
        &self,
        clinic_id: ClinicId,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
        date: NaiveDate,
        slots: Vec<DateTime<Utc>>,
    ) {
        let expires_at = Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let result = sqlx::query(
            r#"
            INSERT INTO availability_cache
                (clinic_id, practitioner_id, business_id, date, slots,
                 cached_at, expires_at, is_stale, last_queried_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), $6, FALSE, NOW())
            ON CONFLICT (practitioner_id, business_id, date)
            DO UPDATE SET
                slots = EXCLUDED.slots,
                cached_at = NOW(),
                expires_at = EXCLUDED.expires_at,
                is_stale = FALSE,
                last_queried_at = NOW()
            "#,
        )
        .bind(clinic_id)
        .bind(practitioner_id)
        .bind(business_id)
        .bind(date)
        .bind(Json(slots))
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Availability cache write failed, continuing without cache");
        }
    }

    /// Mark one key stale inside an arbitrary executor. Used by the booking
    /// coordinator within the transaction that writes the appointment; a
    /// failure here must fail that transaction.
    pub async fn mark_stale<'e, E>(
        executor: E,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
        date: NaiveDate,
    ) -> sqlx::Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE availability_cache
            SET is_stale = TRUE
            WHERE practitioner_id = $1 AND business_id = $2 AND date = $3
            "#,
        )
        .bind(practitioner_id)
        .bind(business_id)
        .bind(date)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Mark a key stale outside a transaction, swallowing failures.
    /// Used for adjacent invalidation after upstream rejections.
    pub async fn invalidate_key(
        &self,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
        date: NaiveDate,
    ) {
        if let Err(e) =
            Self::mark_stale(&self.pool, practitioner_id, business_id, date).await
        {
            warn!(error = %e, "Availability cache invalidation failed");
        }
    }

    /// Mark every entry for a clinic stale
    pub async fn invalidate_clinic(&self, clinic_id: ClinicId) {
        let result = sqlx::query(
            "UPDATE availability_cache SET is_stale = TRUE WHERE clinic_id = $1",
        )
        .bind(clinic_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Availability cache clinic invalidation failed");
        }
    }

    /// Keys queried since `since`, used by the maintenance refresh
    pub async fn recently_queried(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Vec<(ClinicId, PractitionerId, BusinessId, NaiveDate)> {
        let result = sqlx::query_as::<_, (ClinicId, PractitionerId, BusinessId, NaiveDate)>(
            r#"
            SELECT c.clinic_id, c.practitioner_id, c.business_id, c.date
            FROM availability_cache c
            JOIN clinics cl ON cl.clinic_id = c.clinic_id AND cl.is_active
            WHERE c.last_queried_at > $1
              AND c.date >= CURRENT_DATE
            ORDER BY c.last_queried_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Availability cache refresh scan failed");
                Vec::new()
            }
        }
    }

    /// Delete stale entries older than a day and expired entries older
    /// than an hour
    pub async fn cleanup(&self) {
        let result = sqlx::query(
            r#"
            DELETE FROM availability_cache
            WHERE (is_stale AND cached_at < NOW() - INTERVAL '24 hours')
               OR (expires_at < NOW() - INTERVAL '1 hour')
            "#,
        )
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                if done.rows_affected() > 0 {
                    tracing::debug!(deleted = done.rows_affected(), "Availability cache cleanup");
                }
            }
            Err(e) => warn!(error = %e, "Availability cache cleanup failed"),
        }
    }
}
