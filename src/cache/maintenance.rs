/*!
 * Cache Maintenance Task
 *
 * Background loop that keeps the persistent caches healthy: expired rows
 * are deleted, low-use service matches evicted, and availability entries
 * that callers queried recently are refreshed from the PMS before their
 * TTL lapses, so the next caller gets a warm answer.
 */

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::TieredCache;
use crate::models::{BusinessId, Clinic, ClinicId, PractitionerId, ServiceId};
use crate::pms::PmsClientFactory;

/// How far back a query keeps an entry on the refresh list
const REFRESH_RECENCY_MINUTES: i64 = 30;
/// Upper bound on refreshes per maintenance cycle
const REFRESH_BATCH_LIMIT: i64 = 20;

/// Spawn the periodic maintenance task
pub fn spawn_cache_maintenance(
    pool: PgPool,
    pms: Arc<PmsClientFactory>,
    cache: TieredCache,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Cache maintenance task started"
        );
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_maintenance_cycle(&pool, &pms, &cache).await;
        }
    })
}

/// One full maintenance pass: cleanup, then incremental refresh
pub async fn run_maintenance_cycle(pool: &PgPool, pms: &PmsClientFactory, cache: &TieredCache) {
    cache.availability.cleanup().await;
    cache.booking_context.cleanup().await;
    cache.patient_lookup.cleanup().await;
    cache.service_match.cleanup().await;

    let since = Utc::now() - ChronoDuration::minutes(REFRESH_RECENCY_MINUTES);
    let keys = cache
        .availability
        .recently_queried(since, REFRESH_BATCH_LIMIT)
        .await;

    if keys.is_empty() {
        return;
    }

    debug!(count = keys.len(), "Refreshing recently queried availability");

    for (clinic_id, practitioner_id, business_id, date) in keys {
        if let Err(e) =
            refresh_entry(pool, pms, cache, clinic_id, &practitioner_id, &business_id, date).await
        {
            warn!(
                clinic_id = %clinic_id,
                practitioner_id = %practitioner_id,
                date = %date,
                error = %e,
                "Availability refresh failed"
            );
        }
    }
}

async fn refresh_entry(
    pool: &PgPool,
    pms: &PmsClientFactory,
    cache: &TieredCache,
    clinic_id: ClinicId,
    practitioner_id: &PractitionerId,
    business_id: &BusinessId,
    date: chrono::NaiveDate,
) -> anyhow::Result<()> {
    let clinic = sqlx::query_as::<_, Clinic>(
        "SELECT * FROM clinics WHERE clinic_id = $1 AND is_active",
    )
    .bind(clinic_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| anyhow::anyhow!("clinic not found or inactive"))?;

    // The cache key carries no service; refresh with the practitioner's
    // first active service, which yields the same offered starts
    let service_id = sqlx::query_scalar::<_, ServiceId>(
        r#"
        SELECT s.service_id
        FROM services s
        JOIN practitioner_services ps ON ps.service_id = s.service_id
        WHERE ps.practitioner_id = $1 AND s.is_active
        ORDER BY s.name
        LIMIT 1
        "#,
    )
    .bind(practitioner_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| anyhow::anyhow!("practitioner has no active services"))?;

    let client = pms.for_clinic(&clinic);
    let slots = client
        .get_available_times(
            business_id.as_str(),
            practitioner_id.as_str(),
            service_id.as_str(),
            date,
            date,
        )
        .await?;

    cache
        .availability
        .set(clinic_id, practitioner_id, business_id, date, slots)
        .await;

    Ok(())
}
