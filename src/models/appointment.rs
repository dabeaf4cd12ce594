/*!
 * Appointment Model
 *
 * Represents a locally mirrored PMS appointment.
 *
 * Status Workflow:
 * - booked → confirmed → completed
 * - booked and confirmed can go to cancelled
 * - completed and cancelled are final states
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::models::ids::{AppointmentId, BusinessId, ClinicId, PatientId, PractitionerId, ServiceId};

/// Appointment status enum representing the lifecycle of an appointment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Created via the booking coordinator
    Booked,
    /// Confirmed by the patient or clinic staff
    Confirmed,
    /// Cancelled by the caller or the clinic
    Cancelled,
    /// The visit took place
    Completed,
}

impl AppointmentStatus {
    /// Check if transition from current status to new status is valid.
    /// Transitions are monotonic except for cancellation.
    pub fn can_transition_to(&self, new_status: &AppointmentStatus) -> bool {
        match self {
            AppointmentStatus::Booked => matches!(
                new_status,
                AppointmentStatus::Booked
                    | AppointmentStatus::Confirmed
                    | AppointmentStatus::Completed
                    | AppointmentStatus::Cancelled
            ),
            AppointmentStatus::Confirmed => matches!(
                new_status,
                AppointmentStatus::Confirmed
                    | AppointmentStatus::Completed
                    | AppointmentStatus::Cancelled
            ),
            // Final states cannot transition
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => self == new_status,
        }
    }

    /// Check if this is a final state (cannot be changed)
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed
        )
    }
}

/// Main Appointment model representing a database record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    pub clinic_id: ClinicId,
    pub pms_appointment_id: Option<String>,
    pub patient_id: PatientId,
    pub practitioner_id: PractitionerId,
    pub service_id: ServiceId,
    pub business_id: BusinessId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Check if the appointment is in the past relative to `now`
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.starts_at < now
    }

    /// Whether the appointment can still be cancelled
    pub fn can_cancel(&self) -> bool {
        self.status.can_transition_to(&AppointmentStatus::Cancelled)
            && self.status != AppointmentStatus::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(AppointmentStatus::Booked.can_transition_to(&AppointmentStatus::Confirmed));
        assert!(AppointmentStatus::Booked.can_transition_to(&AppointmentStatus::Cancelled));
        assert!(AppointmentStatus::Confirmed.can_transition_to(&AppointmentStatus::Completed));
        assert!(AppointmentStatus::Confirmed.can_transition_to(&AppointmentStatus::Cancelled));

        assert!(!AppointmentStatus::Cancelled.can_transition_to(&AppointmentStatus::Booked));
        assert!(!AppointmentStatus::Completed.can_transition_to(&AppointmentStatus::Confirmed));
        assert!(!AppointmentStatus::Confirmed.can_transition_to(&AppointmentStatus::Booked));
    }

    #[test]
    fn test_final_states() {
        assert!(AppointmentStatus::Cancelled.is_final());
        assert!(AppointmentStatus::Completed.is_final());
        assert!(!AppointmentStatus::Booked.is_final());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&AppointmentStatus::Booked).unwrap();
        assert_eq!(json, "\"booked\"");
    }
}
