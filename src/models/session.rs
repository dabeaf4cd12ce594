/*!
 * Session-Scoped State Models
 *
 * Per-call state that keeps repeated webhook invocations coherent:
 * the caller's booking context, slots they have declined, slots the PMS
 * rejected, and the short-lived booking lock.
 */

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ids::{BusinessId, PractitionerId, ServiceId, SessionId};

/// Per-caller conversational context, keyed by normalized phone.
/// Updated opportunistically during a call; expires after an hour.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_location: Option<BusinessId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_practitioner: Option<PractitionerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_practitioner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_service: Option<ServiceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_service_name: Option<String>,
}

impl BookingContext {
    /// Merge newer fields over this context, keeping existing values
    /// where the update is silent
    pub fn merge(&mut self, update: BookingContext) {
        if update.preferred_location.is_some() {
            self.preferred_location = update.preferred_location;
            self.preferred_location_name = update.preferred_location_name;
        }
        if update.last_practitioner.is_some() {
            self.last_practitioner = update.last_practitioner;
            self.last_practitioner_name = update.last_practitioner_name;
        }
        if update.last_service.is_some() {
            self.last_service = update.last_service;
            self.last_service_name = update.last_service_name;
        }
    }
}

/// Canonical key for a single offerable slot.
///
/// The same key format is used by the session rejected-slot set and the
/// failed-booking-attempts table so one filter predicate serves both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub practitioner_id: PractitionerId,
    pub business_id: BusinessId,
    pub starts_at: DateTime<Utc>,
}

impl SlotKey {
    pub fn new(
        practitioner_id: PractitionerId,
        business_id: BusinessId,
        starts_at: DateTime<Utc>,
    ) -> Self {
        Self {
            practitioner_id,
            business_id,
            starts_at,
        }
    }

    /// Stable string encoding stored in session_rejected_slots
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}",
            self.practitioner_id,
            self.business_id,
            self.starts_at.to_rfc3339()
        )
    }
}

/// A slot the PMS rejected at booking time; suppressed from re-offering
/// until the entry expires
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FailedBookingAttempt {
    pub practitioner_id: PractitionerId,
    pub business_id: BusinessId,
    pub date: NaiveDate,
    pub slot_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Short-lived mutual exclusion record for a booking in flight
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingLock {
    pub practitioner_id: PractitionerId,
    pub starts_at: DateTime<Utc>,
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
}

impl BookingLock {
    /// A lock only excludes others while it has not expired
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_context_merge_keeps_existing_on_silence() {
        let mut ctx = BookingContext {
            preferred_location: Some(BusinessId::new("b1")),
            preferred_location_name: Some("City Clinic".to_string()),
            ..Default::default()
        };

        ctx.merge(BookingContext {
            last_service: Some(ServiceId::new("s1")),
            last_service_name: Some("Massage".to_string()),
            ..Default::default()
        });

        assert_eq!(ctx.preferred_location, Some(BusinessId::new("b1")));
        assert_eq!(ctx.last_service, Some(ServiceId::new("s1")));
    }

    #[test]
    fn test_slot_key_encoding_is_stable() {
        let key = SlotKey::new(
            PractitionerId::new("p1"),
            BusinessId::new("b1"),
            Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap(),
        );
        assert_eq!(key.encode(), "p1|b1|2025-07-16T00:00:00+00:00");
    }
}
