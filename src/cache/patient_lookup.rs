/*!
 * Patient Lookup Cache
 *
 * Maps (normalized phone, clinic) to the PMS patient id so a returning
 * caller's first booking needs a single read instead of a PMS search.
 */

use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;

use crate::cache::stats::CacheStats;
use crate::models::{CacheTier, ClinicId, PatientLookupEntry};

#[derive(Clone)]
pub struct PatientLookupCache {
    pool: PgPool,
    ttl: Duration,
    stats: CacheStats,
}

impl PatientLookupCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let stats = CacheStats::new(pool.clone());
        Self { pool, ttl, stats }
    }

    pub async fn get(
        &self,
        phone_normalized: &str,
        clinic_id: ClinicId,
    ) -> Option<PatientLookupEntry> {
        let result = sqlx::query_as::<_, PatientLookupEntry>(
            r#"
            SELECT phone_normalized, clinic_id, pms_patient_id, profile,
                   cached_at, expires_at
            FROM patient_lookup_cache
            WHERE phone_normalized = $1 AND clinic_id = $2 AND expires_at > NOW()
            "#,
        )
        .bind(phone_normalized)
        .bind(clinic_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(entry)) => {
                self.stats.record_hit(CacheTier::PatientLookup).await;
                Some(entry)
            }
            Ok(None) => {
                self.stats.record_miss(CacheTier::PatientLookup).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "Patient lookup cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(
        &self,
        phone_normalized: &str,
        clinic_id: ClinicId,
        pms_patient_id: &str,
        profile: serde_json::Value,
    ) {
        let expires_at =
            chrono::Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let result = sqlx::query(
            r#"
            INSERT INTO patient_lookup_cache
                (phone_normalized, clinic_id, pms_patient_id, profile, cached_at, expires_at)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            ON CONFLICT (phone_normalized, clinic_id)
            DO UPDATE SET
                pms_patient_id = EXCLUDED.pms_patient_id,
                profile = EXCLUDED.profile,
                cached_at = NOW(),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(phone_normalized)
        .bind(clinic_id)
        .bind(pms_patient_id)
        .bind(Json(profile))
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Patient lookup cache write failed, continuing");
        }
    }

    pub async fn cleanup(&self) {
        let result = sqlx::query("DELETE FROM patient_lookup_cache WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Patient lookup cache cleanup failed");
        }
    }
}
