/*!
 * Cache Row Models
 *
 * Rows for the persistent cache tables. The validity predicate for an
 * availability entry is `NOT is_stale AND expires_at > now`.
 */

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::models::ids::{BusinessId, ClinicId, PractitionerId, ServiceId};

/// Cached PMS availability for one (practitioner, business, date)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AvailabilityCacheEntry {
    pub clinic_id: ClinicId,
    pub practitioner_id: PractitionerId,
    pub business_id: BusinessId,
    pub date: NaiveDate,
    /// Ordered UTC slot start times
    pub slots: Json<Vec<DateTime<Utc>>>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_stale: bool,
    pub last_queried_at: DateTime<Utc>,
}

impl AvailabilityCacheEntry {
    /// Canonical validity predicate
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_stale && self.expires_at > now
    }
}

/// Cached PMS patient lookup for a (phone, clinic) pair
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatientLookupEntry {
    pub phone_normalized: String,
    pub clinic_id: ClinicId,
    pub pms_patient_id: String,
    pub profile: Json<serde_json::Value>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Cached fuzzy service resolution for a normalized query
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceMatchEntry {
    pub clinic_id: ClinicId,
    pub normalized_query: String,
    pub service_id: ServiceId,
    pub score: f64,
    pub usage_count: i32,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Cache tier names used by the statistics recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Availability,
    BookingContext,
    PatientLookup,
    ServiceMatch,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::BookingContext => "booking_context",
            Self::PatientLookup => "patient_lookup",
            Self::ServiceMatch => "service_match",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_validity_predicate() {
        let now = Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap();
        let mut entry = AvailabilityCacheEntry {
            clinic_id: ClinicId::new(),
            practitioner_id: PractitionerId::new("p1"),
            business_id: BusinessId::new("b1"),
            date: NaiveDate::from_ymd_opt(2025, 7, 16).unwrap(),
            slots: Json(vec![]),
            cached_at: now,
            expires_at: now + Duration::minutes(15),
            is_stale: false,
            last_queried_at: now,
        };

        assert!(entry.is_valid(now));

        entry.is_stale = true;
        assert!(!entry.is_valid(now));

        entry.is_stale = false;
        assert!(!entry.is_valid(now + Duration::minutes(16)));
    }
}
