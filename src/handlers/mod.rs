/*!
 * HTTP Request Handlers Module
 *
 * Contains all webhook handlers for the voice-agent surface. Handlers
 * own the error boundary: core services return typed errors, and the
 * voice-friendly phrasing is produced here, never deeper.
 */

pub mod availability;
pub mod bookings;
pub mod locations;
pub mod practitioners;

pub use availability::{check_availability, find_next_available, reject_slots};
pub use bookings::{handle_appointment, handle_cancellation};
pub use locations::{confirm_location, resolve_location};
pub use practitioners::{
    available_practitioners, location_practitioners, practitioner_info, practitioner_services,
};

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

use crate::cache::TieredCache;
use crate::config::Config;
use crate::models::webhook::WebhookEnvelope;
use crate::models::Clinic;
use crate::pms::PmsClientFactory;
use crate::utils::errors::Result;
use crate::utils::time::get_clinic_timezone;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: TieredCache,
    pub pms: Arc<PmsClientFactory>,
    pub config: Arc<Config>,
    pub start_time: std::time::SystemTime,
}

impl AppState {
    /// Clinic timezone with the configured default as fallback
    pub fn clinic_tz(&self, clinic: &Clinic) -> Tz {
        let default_tz = self
            .config
            .server
            .default_timezone
            .parse::<Tz>()
            .unwrap_or(chrono_tz::Australia::Sydney);
        get_clinic_timezone(Some(&clinic.timezone), default_tz)
    }

    /// Wall-clock deadline for the current request's fan-out
    pub fn request_deadline(&self) -> std::time::Instant {
        std::time::Instant::now() + self.config.server.request_deadline
    }
}

/// Convert a handler outcome into the webhook envelope. Business errors
/// come back as HTTP 200 with `success: false`; the voice platform
/// consumes the body either way, and the agent needs the message.
pub(crate) fn respond<T: Serialize>(
    session_id: String,
    result: Result<(String, T)>,
) -> Response {
    match result {
        Ok((message, data)) => {
            Json(WebhookEnvelope::ok(session_id, message, data)).into_response()
        }
        Err(err) => {
            tracing::warn!(
                code = err.code.as_str(),
                detail = %err.detail,
                "Webhook operation failed"
            );
            Json(WebhookEnvelope::<T>::err(
                session_id,
                err.code,
                err.code.voice_message(),
            ))
            .into_response()
        }
    }
}
