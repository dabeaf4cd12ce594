/*!
 * Error Handling
 *
 * Defines the application-wide error taxonomy surfaced to the voice agent
 * and conversion implementations for HTTP response mapping.
 *
 * Codes are stable identifiers; voice-friendly text is produced at the
 * handler boundary, never inside the core services.
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Application result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Stable error code identifiers surfaced to the voice agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ClinicNotFound,
    LocationRequired,
    InvalidBusinessId,
    PractitionerNotFound,
    PractitionerClarificationNeeded,
    PractitionerLocationMismatch,
    ServiceNotFound,
    MissingInformation,
    InvalidPhoneNumber,
    InvalidDate,
    InvalidTime,
    NoAvailability,
    TimeNotAvailable,
    SlotTaken,
    OutsideBusinessHours,
    PractitionerNotAvailable,
    AppointmentNotFound,
    DuplicateBooking,
    RateLimited,
    UpstreamError,
    DatabaseError,
    NetworkError,
    /// Routing hint: a dateless query must go through find-next-available
    UseFindNextAvailable,
    Unauthorized,
}

impl ErrorCode {
    /// Stable identifier sent in the `error` field of webhook responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicNotFound => "clinic_not_found",
            Self::LocationRequired => "location_required",
            Self::InvalidBusinessId => "invalid_business_id",
            Self::PractitionerNotFound => "practitioner_not_found",
            Self::PractitionerClarificationNeeded => "practitioner_clarification_needed",
            Self::PractitionerLocationMismatch => "practitioner_location_mismatch",
            Self::ServiceNotFound => "service_not_found",
            Self::MissingInformation => "missing_information",
            Self::InvalidPhoneNumber => "invalid_phone_number",
            Self::InvalidDate => "invalid_date",
            Self::InvalidTime => "invalid_time",
            Self::NoAvailability => "no_availability",
            Self::TimeNotAvailable => "time_not_available",
            Self::SlotTaken => "slot_taken",
            Self::OutsideBusinessHours => "outside_business_hours",
            Self::PractitionerNotAvailable => "practitioner_not_available",
            Self::AppointmentNotFound => "appointment_not_found",
            Self::DuplicateBooking => "duplicate_booking",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::DatabaseError => "database_error",
            Self::NetworkError => "network_error",
            Self::UseFindNextAvailable => "use_find_next_available",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Voice-friendly fallback phrasing for this code, used by handlers
    /// when they have nothing more specific to say
    pub fn voice_message(&self) -> &'static str {
        match self {
            Self::ClinicNotFound => "I couldn't find a clinic for this number.",
            Self::LocationRequired => "Which of our locations would you like?",
            Self::InvalidBusinessId => "I couldn't find that location.",
            Self::PractitionerNotFound => "I couldn't find that practitioner.",
            Self::PractitionerClarificationNeeded => {
                "We have a few practitioners with a similar name. Who would you like to see?"
            }
            Self::PractitionerLocationMismatch => {
                "That practitioner doesn't work at that location."
            }
            Self::ServiceNotFound => "I couldn't find that service.",
            Self::MissingInformation => "I'm missing some details to do that.",
            Self::InvalidPhoneNumber => "That phone number doesn't look right.",
            Self::InvalidDate => "I didn't catch which date you meant.",
            Self::InvalidTime => "That time doesn't exist on that date.",
            Self::NoAvailability => "I couldn't find any available times.",
            Self::TimeNotAvailable => "That time isn't available.",
            Self::SlotTaken => "Sorry, that time was just taken.",
            Self::OutsideBusinessHours => "That time is outside opening hours.",
            Self::PractitionerNotAvailable => "That practitioner isn't available then.",
            Self::AppointmentNotFound => "I couldn't find that appointment.",
            Self::DuplicateBooking => "It looks like that appointment already exists.",
            Self::RateLimited | Self::UpstreamError | Self::NetworkError => {
                "Our booking system is a little slow right now. Please try again in a moment."
            }
            Self::DatabaseError => "Something went wrong on our end. Please try again.",
            Self::UseFindNextAvailable => "Let me look for the next available time instead.",
            Self::Unauthorized => "Unauthorized.",
        }
    }

    /// HTTP status for the boundary response
    fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ClinicNotFound | Self::AppointmentNotFound => StatusCode::NOT_FOUND,
            Self::SlotTaken | Self::DuplicateBooking => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamError | Self::NetworkError => StatusCode::BAD_GATEWAY,
            Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error: a stable code plus internal detail.
///
/// The detail is for logs and operators; handlers decide what the voice
/// agent hears.
#[derive(Debug, Clone, Error)]
#[error("{code}: {detail}")]
pub struct AppError {
    pub code: ErrorCode,
    pub detail: String,
}

impl AppError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// Shorthand for a code with no extra detail
    pub fn code(code: ErrorCode) -> Self {
        Self {
            code,
            detail: code.voice_message().to_string(),
        }
    }
}

/// Convert SQLx errors to AppError
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();

        if status.is_server_error() {
            tracing::error!(code = self.code.as_str(), detail = %self.detail, "Request failed");
        }

        let body = Json(json!({
            "success": false,
            "error": self.code.as_str(),
            "message": self.code.voice_message(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_identifiers_are_stable() {
        assert_eq!(ErrorCode::SlotTaken.as_str(), "slot_taken");
        assert_eq!(
            ErrorCode::UseFindNextAvailable.as_str(),
            "use_find_next_available"
        );
        assert_eq!(ErrorCode::InvalidPhoneNumber.as_str(), "invalid_phone_number");
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::new(ErrorCode::ServiceNotFound, "no service named 'massage'");
        assert_eq!(err.to_string(), "service_not_found: no service named 'massage'");
    }

    #[test]
    fn test_app_error_from_sqlx() {
        let sqlx_err = sqlx::Error::RowNotFound;
        let app_err: AppError = sqlx_err.into();
        assert_eq!(app_err.code, ErrorCode::DatabaseError);
    }
}
