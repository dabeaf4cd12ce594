/*!
 * Patient Model
 *
 * Patients are created on first booking and deduplicated by
 * (clinic, normalized phone).
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ids::{ClinicId, PatientId};

/// Patient record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
    pub patient_id: PatientId,
    pub clinic_id: ClinicId,
    pub phone_normalized: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// Identifier of the matching patient record in the PMS
    pub pms_patient_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}
