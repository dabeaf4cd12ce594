/*!
 * Service (Appointment Type) Model
 */

use serde::{Deserialize, Serialize};

use crate::models::ids::{ClinicId, ServiceId};

/// A bookable offering with a fixed duration
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub service_id: ServiceId,
    pub clinic_id: ClinicId,
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: bool,
}
