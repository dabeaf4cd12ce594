/*!
 * Session State Service
 *
 * Session-scoped rejected slots, the global failed-booking-attempt
 * suppression list, and the short-lived booking locks. The rejected and
 * failed sets feed one shared `SlotFilter` predicate used by every
 * availability path, so the single-day and multi-day answers can never
 * disagree about which slots are offerable.
 */

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{BusinessId, PractitionerId, SessionId, SlotKey};
use crate::utils::errors::Result;

/// Shared filter over offerable slots. Built once per query from the
/// session's rejected set and the failed-attempt table.
#[derive(Debug, Default, Clone)]
pub struct SlotFilter {
    suppressed: HashSet<String>,
}

impl SlotFilter {
    /// Whether a slot may be offered to the caller
    pub fn allows(&self, key: &SlotKey) -> bool {
        !self.suppressed.contains(&key.encode())
    }

    /// Number of suppressed keys, used for the filtered-vs-empty rationale
    pub fn len(&self) -> usize {
        self.suppressed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppressed.is_empty()
    }

    #[cfg(test)]
    pub fn from_keys(keys: impl IntoIterator<Item = SlotKey>) -> Self {
        Self {
            suppressed: keys.into_iter().map(|k| k.encode()).collect(),
        }
    }
}

/// Session state operations
pub struct SessionService {
    pool: PgPool,
    rejected_slot_ttl: Duration,
    failed_attempt_ttl: Duration,
    lock_ttl: Duration,
}

impl SessionService {
    pub fn new(
        pool: PgPool,
        rejected_slot_ttl: Duration,
        failed_attempt_ttl: Duration,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            rejected_slot_ttl,
            failed_attempt_ttl,
            lock_ttl,
        }
    }

    // ==================== Rejected slots ====================

    /// Record slots the caller declined. A change of criteria (different
    /// practitioner or business) drops the previous rejections; they no
    /// longer describe what the caller is looking at.
    pub async fn record_rejected(&self, session_id: &SessionId, keys: &[SlotKey]) -> Result<usize> {
        if let Some(first) = keys.first() {
            let prefix = format!("{}|{}|", first.practitioner_id, first.business_id);
            let result = sqlx::query(
                r#"
                DELETE FROM session_rejected_slots
                WHERE session_id = $1 AND slot_key NOT LIKE $2 || '%'
                "#,
            )
            .bind(session_id)
            .bind(&prefix)
            .execute(&self.pool)
            .await;

            if let Err(e) = result {
                warn!(error = %e, "Failed to clear rejected slots on criteria change");
            }
        }

        let expires_at = Utc::now() + to_chrono(self.rejected_slot_ttl);
        let mut recorded = 0;

        for key in keys {
            let result = sqlx::query(
                r#"
                INSERT INTO session_rejected_slots (session_id, slot_key, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (session_id, slot_key) DO UPDATE SET expires_at = EXCLUDED.expires_at
                "#,
            )
            .bind(session_id)
            .bind(key.encode())
            .bind(expires_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => recorded += 1,
                Err(e) => warn!(error = %e, "Failed to record rejected slot"),
            }
        }

        debug!(session_id = %session_id, recorded, "Recorded rejected slots");
        Ok(recorded)
    }

    /// Clear the session's rejected set; called on booking and on
    /// criteria change
    pub async fn clear_rejected(&self, session_id: &SessionId) {
        let result = sqlx::query("DELETE FROM session_rejected_slots WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Failed to clear rejected slots");
        }
    }

    // ==================== Failed booking attempts ====================

    /// Suppress a slot after the PMS rejected a booking for it
    pub async fn record_failed_attempt(&self, key: &SlotKey, date: NaiveDate) -> Result<()> {
        let expires_at = Utc::now() + to_chrono(self.failed_attempt_ttl);

        sqlx::query(
            r#"
            INSERT INTO failed_booking_attempts
                (practitioner_id, business_id, date, slot_time, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (practitioner_id, business_id, slot_time)
            DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&key.practitioner_id)
        .bind(&key.business_id)
        .bind(date)
        .bind(key.starts_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Shared filter construction ====================

    /// Build the shared slot filter for one query. Read failures degrade
    /// to an empty filter rather than blocking the request.
    pub async fn build_slot_filter(
        &self,
        session_id: Option<&SessionId>,
        practitioners: &[PractitionerId],
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> SlotFilter {
        let mut suppressed = HashSet::new();

        if let Some(session_id) = session_id {
            let rejected = sqlx::query_scalar::<_, String>(
                r#"
                SELECT slot_key FROM session_rejected_slots
                WHERE session_id = $1 AND expires_at > NOW()
                "#,
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await;

            match rejected {
                Ok(keys) => suppressed.extend(keys),
                Err(e) => warn!(error = %e, "Rejected-slot read failed, filter degraded"),
            }
        }

        let failed = sqlx::query_as::<_, (PractitionerId, BusinessId, DateTime<Utc>)>(
            r#"
            SELECT practitioner_id, business_id, slot_time
            FROM failed_booking_attempts
            WHERE practitioner_id = ANY($1)
              AND date BETWEEN $2 AND $3
              AND expires_at > NOW()
            "#,
        )
        .bind(
            practitioners
                .iter()
                .map(|p| p.as_str().to_string())
                .collect::<Vec<_>>(),
        )
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await;

        match failed {
            Ok(rows) => {
                for (practitioner_id, business_id, slot_time) in rows {
                    suppressed
                        .insert(SlotKey::new(practitioner_id, business_id, slot_time).encode());
                }
            }
            Err(e) => warn!(error = %e, "Failed-attempt read failed, filter degraded"),
        }

        SlotFilter { suppressed }
    }

    // ==================== Booking locks ====================

    /// Try to acquire the booking lock for (practitioner, start). Returns
    /// false when another live session holds it. Re-acquisition by the
    /// same session succeeds and extends the TTL.
    pub async fn acquire_lock(
        &self,
        practitioner_id: &PractitionerId,
        starts_at: DateTime<Utc>,
        session_id: &SessionId,
    ) -> Result<bool> {
        let expires_at = Utc::now() + to_chrono(self.lock_ttl);

        let acquired = sqlx::query_scalar::<_, SessionId>(
            r#"
            INSERT INTO booking_locks (practitioner_id, starts_at, session_id, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (practitioner_id, starts_at)
            DO UPDATE SET
                session_id = EXCLUDED.session_id,
                expires_at = EXCLUDED.expires_at
            WHERE booking_locks.expires_at < NOW()
               OR booking_locks.session_id = EXCLUDED.session_id
            RETURNING session_id
            "#,
        )
        .bind(practitioner_id)
        .bind(starts_at)
        .bind(session_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.is_some())
    }

    /// Release a lock held by this session. Locks also auto-expire, so a
    /// failure here only delays the slot, never strands it.
    pub async fn release_lock(
        &self,
        practitioner_id: &PractitionerId,
        starts_at: DateTime<Utc>,
        session_id: &SessionId,
    ) {
        let result = sqlx::query(
            r#"
            DELETE FROM booking_locks
            WHERE practitioner_id = $1 AND starts_at = $2 AND session_id = $3
            "#,
        )
        .bind(practitioner_id)
        .bind(starts_at)
        .bind(session_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "Booking lock release failed; lock will expire on its own");
        }
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::seconds(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slot_filter_allows_and_suppresses() {
        let start = Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap();
        let rejected = SlotKey::new(PractitionerId::new("p1"), BusinessId::new("b1"), start);
        let other = SlotKey::new(
            PractitionerId::new("p1"),
            BusinessId::new("b1"),
            start + ChronoDuration::hours(1),
        );

        let filter = SlotFilter::from_keys([rejected.clone()]);
        assert!(!filter.allows(&rejected));
        assert!(filter.allows(&other));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        let filter = SlotFilter::default();
        let key = SlotKey::new(
            PractitionerId::new("p1"),
            BusinessId::new("b1"),
            Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap(),
        );
        assert!(filter.allows(&key));
        assert!(filter.is_empty());
    }
}
