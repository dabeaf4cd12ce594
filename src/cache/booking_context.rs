/*!
 * Booking Context Cache
 *
 * Per-caller conversational context keyed by normalized phone. Lets a
 * returning caller skip re-stating their preferred location and usual
 * practitioner. Entries expire after an hour of inactivity.
 */

use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;

use crate::cache::stats::CacheStats;
use crate::models::{BookingContext, CacheTier, ClinicId};

#[derive(Clone)]
pub struct BookingContextCache {
    pool: PgPool,
    ttl: Duration,
    stats: CacheStats,
}

impl BookingContextCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let stats = CacheStats::new(pool.clone());
        Self { pool, ttl, stats }
    }

    /// Read the caller's context, bumping the hit counter and sliding the
    /// expiry window
    pub async fn get(&self, phone_normalized: &str) -> Option<BookingContext> {
        let expires_at =
            chrono::Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let result = sqlx::query_as::<_, (Json<BookingContext>,)>(
            r#"
            UPDATE booking_contexts
            SET hit_count = hit_count + 1,
                last_accessed = NOW(),
                expires_at = $2
            WHERE phone_normalized = $1
              AND expires_at > NOW()
            RETURNING context
            "#,
        )
        .bind(phone_normalized)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some((Json(context),))) => {
                self.stats.record_hit(CacheTier::BookingContext).await;
                Some(context)
            }
            Ok(None) => {
                self.stats.record_miss(CacheTier::BookingContext).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "Booking context read failed, treating as miss");
                None
            }
        }
    }

    /// Merge an update into the caller's context, creating it if absent.
    /// Called opportunistically; failures are swallowed.
    pub async fn update(
        &self,
        phone_normalized: &str,
        clinic_id: ClinicId,
        update: BookingContext,
    ) {
        let mut context = self.peek(phone_normalized).await.unwrap_or_default();
        context.merge(update);

        let expires_at =
            chrono::Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let result = sqlx::query(
            r#"
            INSERT INTO booking_contexts
                (phone_normalized, clinic_id, context, hit_count, last_accessed, expires_at)
            VALUES ($1, $2, $3, 0, NOW(), $4)
            ON CONFLICT (phone_normalized)
            DO UPDATE SET
                clinic_id = EXCLUDED.clinic_id,
                context = EXCLUDED.context,
                last_accessed = NOW(),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(phone_normalized)
        .bind(clinic_id)
        .bind(Json(context))
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Booking context write failed, continuing");
        }
    }

    /// Read without statistics or expiry bumping; used by update()
    async fn peek(&self, phone_normalized: &str) -> Option<BookingContext> {
        sqlx::query_as::<_, (Json<BookingContext>,)>(
            r#"
            SELECT context FROM booking_contexts
            WHERE phone_normalized = $1 AND expires_at > NOW()
            "#,
        )
        .bind(phone_normalized)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        .map(|(Json(ctx),)| ctx)
    }

    /// Delete expired contexts
    pub async fn cleanup(&self) {
        let result = sqlx::query("DELETE FROM booking_contexts WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Booking context cleanup failed");
        }
    }
}
