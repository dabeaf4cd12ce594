/*!
 * Clinic and Location Models
 *
 * A clinic is identified by its dialed number; every other entity is
 * scoped to a clinic. A location (PMS "business") is a physical site;
 * exactly one location per clinic is primary.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ids::{BusinessId, ClinicId};

/// Clinic record, the tenancy root for all other entities
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Clinic {
    pub clinic_id: ClinicId,
    pub name: String,
    pub dialed_number: String,
    /// HTTP Basic key for the clinic's PMS tenancy; never logged
    #[serde(skip_serializing)]
    pub pms_api_key: String,
    pub pms_shard: String,
    /// IANA timezone name; immutable during a call
    pub timezone: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A physical clinic location (PMS "business")
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub business_id: BusinessId,
    pub clinic_id: ClinicId,
    pub name: String,
    pub is_primary: bool,
    /// Alternative spoken names; extended by onboarding
    pub aliases: Vec<String>,
    /// Deterministic ordering for "location two" style references
    pub sort_order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clinic_api_key_not_serialized() {
        let clinic = Clinic {
            clinic_id: ClinicId::new(),
            name: "City Clinic".to_string(),
            dialed_number: "0478621276".to_string(),
            pms_api_key: "secret".to_string(),
            pms_shard: "au1".to_string(),
            timezone: "Australia/Sydney".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&clinic).unwrap();
        assert!(json.get("pms_api_key").is_none());
    }
}
