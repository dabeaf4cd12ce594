/*!
 * Service Match Cache
 *
 * Remembers where a spoken service query resolved so the fuzzy matcher
 * runs once per phrasing per clinic, not once per call. Reference-counted
 * by usage; rarely used phrasings are evicted on cleanup.
 */

use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;

use crate::cache::stats::CacheStats;
use crate::models::{CacheTier, ClinicId, ServiceId, ServiceMatchEntry};

/// Entries below this usage count are eligible for eviction once expired
const LOW_USE_THRESHOLD: i32 = 3;

#[derive(Clone)]
pub struct ServiceMatchCache {
    pool: PgPool,
    ttl: Duration,
    stats: CacheStats,
}

impl ServiceMatchCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let stats = CacheStats::new(pool.clone());
        Self { pool, ttl, stats }
    }

    /// Look up a previous resolution, bumping the usage count
    pub async fn get(
        &self,
        clinic_id: ClinicId,
        normalized_query: &str,
    ) -> Option<ServiceMatchEntry> {
        let result = sqlx::query_as::<_, ServiceMatchEntry>(
            r#"
            UPDATE service_match_cache
            SET usage_count = usage_count + 1
            WHERE clinic_id = $1 AND normalized_query = $2 AND expires_at > NOW()
            RETURNING clinic_id, normalized_query, service_id, score,
                      usage_count, cached_at, expires_at
            "#,
        )
        .bind(clinic_id)
        .bind(normalized_query)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(entry)) => {
                self.stats.record_hit(CacheTier::ServiceMatch).await;
                Some(entry)
            }
            Ok(None) => {
                self.stats.record_miss(CacheTier::ServiceMatch).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "Service match cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(
        &self,
        clinic_id: ClinicId,
        normalized_query: &str,
        service_id: &ServiceId,
        score: f64,
    ) {
        let expires_at =
            chrono::Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let result = sqlx::query(
            r#"
            INSERT INTO service_match_cache
                (clinic_id, normalized_query, service_id, score, usage_count, cached_at, expires_at)
            VALUES ($1, $2, $3, $4, 1, NOW(), $5)
            ON CONFLICT (clinic_id, normalized_query)
            DO UPDATE SET
                service_id = EXCLUDED.service_id,
                score = EXCLUDED.score,
                usage_count = service_match_cache.usage_count + 1,
                cached_at = NOW(),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(clinic_id)
        .bind(normalized_query)
        .bind(service_id)
        .bind(score)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Service match cache write failed, continuing");
        }
    }

    /// Evict expired entries that never saw meaningful reuse
    pub async fn cleanup(&self) {
        let result = sqlx::query(
            r#"
            DELETE FROM service_match_cache
            WHERE expires_at < NOW() AND usage_count < $1
            "#,
        )
        .bind(LOW_USE_THRESHOLD)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Service match cache cleanup failed");
        }
    }
}
