/*!
 * PMS Wire Types
 *
 * Deserialization targets for the PMS REST responses. List endpoints are
 * paginated with a `links.next` URL; the client follows links until
 * exhausted.
 */

use serde::{Deserialize, Serialize};

/// Pagination links on list responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsBusiness {
    pub id: String,
    pub business_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusinessesPage {
    #[serde(default)]
    pub businesses: Vec<PmsBusiness>,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsPractitioner {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PractitionersPage {
    #[serde(default)]
    pub practitioners: Vec<PmsPractitioner>,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsAppointmentType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub duration_in_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentTypesPage {
    #[serde(default)]
    pub appointment_types: Vec<PmsAppointmentType>,
    #[serde(default)]
    pub links: PageLinks,
}

/// One offered slot inside an available-times response
#[derive(Debug, Clone, Deserialize)]
pub struct PmsAvailableTime {
    pub appointment_start: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailableTimesPage {
    #[serde(default)]
    pub available_times: Vec<PmsAvailableTime>,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsPatient {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientsPage {
    #[serde(default)]
    pub patients: Vec<PmsPatient>,
    #[serde(default)]
    pub links: PageLinks,
}

/// Body for `POST /patients`
#[derive(Debug, Clone, Serialize)]
pub struct CreatePmsPatient {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

/// Body for `POST /appointments`; times are UTC ISO-8601
#[derive(Debug, Clone, Serialize)]
pub struct CreatePmsAppointment {
    pub patient_id: String,
    pub practitioner_id: String,
    pub appointment_type_id: String,
    pub business_id: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmsAppointment {
    pub id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

fn default_true() -> bool {
    true
}
