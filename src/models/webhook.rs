/*!
 * Webhook Request/Response Schemas
 *
 * Strict payload schemas for the voice-agent surface. Unknown fields are
 * rejected so agent prompt drift fails loudly instead of silently. All
 * responses share the `{success, sessionId, message, error?}` envelope
 * with entity data nested in objects; there are no flat legacy fields.
 */

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::ids::{BusinessId, PractitionerId, ServiceId};
use crate::utils::errors::ErrorCode;

// ==================== Requests ====================

/// POST /location-resolver
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResolveLocationRequest {
    #[validate(length(min = 1, max = 255))]
    pub location_query: String,
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    pub caller_phone: Option<String>,
}

/// POST /location-confirmer
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfirmLocationRequest {
    #[validate(length(min = 1, max = 255))]
    pub user_response: String,
    #[validate(length(min = 1))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
}

/// POST /practitioner-services and /practitioner-info
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PractitionerQueryRequest {
    #[validate(length(min = 1, max = 255))]
    pub practitioner: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
}

/// POST /location-practitioners
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocationPractitionersRequest {
    #[serde(rename = "business_id")]
    pub business_id: BusinessId,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
}

/// POST /available-practitioners
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AvailablePractitionersRequest {
    #[serde(rename = "business_id")]
    pub business_id: BusinessId,
    #[validate(length(min = 1, max = 64))]
    pub date: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    pub session_id: Option<String>,
}

/// POST /availability-checker
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckAvailabilityRequest {
    #[validate(length(min = 1, max = 255))]
    pub practitioner: String,
    /// Spoken date; absent means the caller wants "the next one" and must
    /// be routed to find-next-available
    pub date: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub appointment_type: String,
    #[serde(rename = "business_id")]
    pub business_id: BusinessId,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    pub session_id: Option<String>,
}

/// POST /next-available
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindNextAvailableRequest {
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    pub practitioner: Option<String>,
    pub service: Option<String>,
    pub location_id: Option<BusinessId>,
    pub max_days: Option<u32>,
    pub session_id: Option<String>,
}

/// POST /appointment-handler (book, and reschedule when
/// `rescheduleAppointmentId` is present)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookAppointmentRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    #[validate(length(min = 1, max = 32))]
    pub caller_phone: String,
    #[validate(length(min = 1, max = 255))]
    pub patient_name: String,
    #[validate(length(min = 1, max = 255))]
    pub practitioner: String,
    #[validate(length(min = 1, max = 255))]
    pub appointment_type: String,
    #[serde(rename = "business_id")]
    pub business_id: BusinessId,
    #[validate(length(min = 1, max = 64))]
    pub appointment_date: String,
    #[validate(length(min = 1, max = 32))]
    pub appointment_time: String,
    /// When set, this is a reschedule of the given appointment
    pub reschedule_appointment_id: Option<String>,
}

/// POST /cancellation-handler
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancelAppointmentRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    #[validate(length(min = 1, max = 32))]
    pub caller_phone: String,
    pub appointment_id: Option<String>,
    /// Free-text description ("my massage with Brendan on Wednesday")
    /// used when no id is supplied
    pub description: Option<String>,
}

/// POST /rejected-slots, records slots the caller declined
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RejectSlotsRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(min = 1, max = 32))]
    pub dialed_number: String,
    #[validate(length(min = 1, max = 255))]
    pub practitioner: String,
    #[serde(rename = "business_id")]
    pub business_id: BusinessId,
    #[validate(length(min = 1, max = 64))]
    pub date: String,
    #[validate(length(min = 1))]
    pub times: Vec<String>,
}

// ==================== Nested response objects ====================

/// Location object nested in responses
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub id: BusinessId,
    pub name: String,
    pub is_primary: bool,
}

/// Practitioner object nested in responses
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerInfo {
    pub id: PractitionerId,
    pub name: String,
}

/// Service object nested in responses
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub name: String,
    pub duration_minutes: i32,
}

/// Time slot object nested in responses; all fields are voice-ready
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotInfo {
    /// Clinic-local date, YYYY-MM-DD
    pub date: String,
    /// Clinic-local time, h:mm AM/PM
    pub time: String,
    /// Full TTS phrasing, e.g. "10:00 AM on Wednesday, 16 July"
    pub spoken: String,
}

// ==================== Response payloads ====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveLocationPayload {
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    pub needs_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmLocationPayload {
    pub location_confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerServicesPayload {
    pub practitioner: PractitionerInfo,
    pub services: Vec<ServiceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_service: Option<ServiceInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerInfoPayload {
    pub practitioner: PractitionerInfo,
    pub services: Vec<ServiceInfo>,
    pub locations: Vec<LocationInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPractitionersPayload {
    pub location: LocationInfo,
    pub practitioners: Vec<PractitionerInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePractitionersPayload {
    pub date: String,
    pub location: LocationInfo,
    pub practitioners: Vec<PractitionerInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAvailabilityPayload {
    pub practitioner: PractitionerInfo,
    pub service: ServiceInfo,
    pub date: String,
    /// Voice-ready clinic-local times, e.g. "10:00 AM"
    #[serde(rename = "available_times")]
    pub available_times: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindNextAvailablePayload {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<TimeSlotInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner: Option<PractitionerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub booking_id: String,
    pub confirmation_number: String,
    pub practitioner: PractitionerInfo,
    pub service: ServiceInfo,
    pub location: LocationInfo,
    pub time_slot: TimeSlotInfo,
    pub patient_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationPayload {
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner: Option<PractitionerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_slot: Option<TimeSlotInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectSlotsPayload {
    pub recorded: usize,
}

// ==================== Envelope ====================

/// The response envelope shared by every webhook operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope<T: Serialize> {
    pub success: bool,
    pub session_id: String,
    /// Voice-ready message for the agent to speak
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> WebhookEnvelope<T> {
    pub fn ok(session_id: impl Into<String>, message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            session_id: session_id.into(),
            message: message.into(),
            error: None,
            data: Some(data),
        }
    }

    pub fn err(session_id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: session_id.into(),
            message: message.into(),
            error: Some(code.as_str()),
            data: None,
        }
    }

    /// Error envelope that still carries a payload, e.g. a find-next
    /// miss reporting `found: false` alongside `no_availability`
    pub fn err_with_data(
        session_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        data: T,
    ) -> Self {
        Self {
            success: false,
            session_id: session_id.into(),
            message: message.into(),
            error: Some(code.as_str()),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_unknown_fields() {
        let json = r#"{
            "locationQuery": "main",
            "sessionId": "s1",
            "dialedNumber": "0478621276",
            "legacyField": true
        }"#;
        assert!(serde_json::from_str::<ResolveLocationRequest>(json).is_err());
    }

    #[test]
    fn test_request_camel_case_fields() {
        let json = r#"{
            "locationQuery": "main",
            "sessionId": "s1",
            "dialedNumber": "0478621276"
        }"#;
        let req: ResolveLocationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.location_query, "main");
        assert!(req.caller_phone.is_none());
    }

    #[test]
    fn test_envelope_flattens_payload() {
        let envelope = WebhookEnvelope::ok(
            "s1",
            "We have these times available.",
            CheckAvailabilityPayload {
                practitioner: PractitionerInfo {
                    id: PractitionerId::new("p1"),
                    name: "Brendan Smith".to_string(),
                },
                service: ServiceInfo {
                    id: ServiceId::new("svc1"),
                    name: "Massage".to_string(),
                    duration_minutes: 60,
                },
                date: "2025-07-16".to_string(),
                available_times: vec!["10:00 AM".to_string()],
            },
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["available_times"][0], "10:00 AM");
        assert_eq!(json["practitioner"]["name"], "Brendan Smith");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_envelope_error_shape() {
        let envelope: WebhookEnvelope<CheckAvailabilityPayload> =
            WebhookEnvelope::err("s1", ErrorCode::SlotTaken, "Sorry, that time was just taken.");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "slot_taken");
    }
}
