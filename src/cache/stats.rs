/*!
 * Cache Statistics Recorder
 *
 * Hit/miss counters per cache tier, accumulated into a monthly-partitioned
 * table. Recording is best-effort; failures never affect the request.
 */

use sqlx::PgPool;
use tracing::debug;

use crate::models::CacheTier;

#[derive(Clone)]
pub struct CacheStats {
    pool: PgPool,
}

impl CacheStats {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_hit(&self, tier: CacheTier) {
        self.record(tier, 1, 0).await;
    }

    pub async fn record_miss(&self, tier: CacheTier) {
        self.record(tier, 0, 1).await;
    }

    async fn record(&self, tier: CacheTier, hits: i64, misses: i64) {
        let result = sqlx::query(
            r#"
            INSERT INTO cache_statistics (month, cache_tier, hits, misses)
            VALUES (date_trunc('month', NOW())::DATE, $1, $2, $3)
            ON CONFLICT (month, cache_tier)
            DO UPDATE SET
                hits = cache_statistics.hits + EXCLUDED.hits,
                misses = cache_statistics.misses + EXCLUDED.misses
            "#,
        )
        .bind(tier.as_str())
        .bind(hits)
        .bind(misses)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            debug!(error = %e, tier = tier.as_str(), "Cache statistics write failed");
        }
    }
}
