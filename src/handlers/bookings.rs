/*!
 * Booking Handlers
 *
 * The book/reschedule webhook and the cancellation webhook. These own all
 * request validation and entity resolution; the booking coordinator only
 * ever sees fully resolved requests.
 */

use axum::{extract::State, response::Response, Json};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{respond, AppState};
use crate::models::{
    AppointmentId, BookAppointmentRequest, BookingPayload, CancelAppointmentRequest,
    CancellationPayload, LocationInfo, PractitionerInfo, ServiceInfo, SessionId, TimeSlotInfo,
};
use crate::services::{
    BookingService, CancelBookingRequest, CatalogService, CreateBookingRequest,
};
use crate::utils::errors::{AppError, ErrorCode, Result};
use crate::utils::time::{
    format_date_for_voice, format_for_voice, format_time_for_voice, parse_spoken_date,
    parse_spoken_time,
};
use crate::utils::{split_patient_name, PhoneValidator};

/// POST /appointment-handler
///
/// Book an appointment, or reschedule when the request names the original
pub async fn handle_appointment(
    State(state): State<AppState>,
    Json(req): Json<BookAppointmentRequest>,
) -> Response {
    let session_id = req.session_id.clone();
    respond(session_id, handle_appointment_inner(&state, req).await)
}

async fn handle_appointment_inner(
    state: &AppState,
    req: BookAppointmentRequest,
) -> Result<(String, BookingPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    // Caller phone must be a valid AU mobile
    if !PhoneValidator::is_au_mobile(&req.caller_phone) {
        return Err(AppError::new(
            ErrorCode::InvalidPhoneNumber,
            format!("'{}' is not an Australian mobile", PhoneValidator::mask(&req.caller_phone)),
        ));
    }
    let caller_phone = PhoneValidator::normalize(&req.caller_phone)
        .expect("is_au_mobile implies normalizable");

    let (first_name, last_name) = split_patient_name(&req.patient_name).ok_or_else(|| {
        AppError::new(ErrorCode::MissingInformation, "patient name is required")
    })?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let tz = state.clinic_tz(&clinic);

    let location = catalog.location(clinic.clinic_id, &req.business_id).await?;
    let practitioner = catalog
        .resolve_practitioner(clinic.clinic_id, &req.practitioner)
        .await?;

    if !catalog
        .practitioner_works_at(&practitioner.practitioner_id, &req.business_id)
        .await?
    {
        return Err(AppError::new(
            ErrorCode::PractitionerLocationMismatch,
            format!("{} does not work at {}", practitioner.full_name(), location.name),
        ));
    }

    // Strict service resolution: a fuzzy near-miss must never book the
    // wrong service
    let service = catalog
        .service_by_exact_name(clinic.clinic_id, &req.appointment_type)
        .await?
        .ok_or_else(|| {
            AppError::new(
                ErrorCode::ServiceNotFound,
                format!("no service named '{}'", req.appointment_type),
            )
        })?;

    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let date = parse_spoken_date(&req.appointment_date, today)?;
    let (hour, minute) = parse_spoken_time(&req.appointment_time)?;

    let booking = BookingService::new(
        state.pool.clone(),
        state.cache.clone(),
        state.config.booking.clone(),
    );
    let pms = state.pms.for_clinic(&clinic);

    let create_request = CreateBookingRequest {
        session_id: SessionId::new(req.session_id.clone()),
        caller_phone,
        first_name,
        last_name,
        practitioner: practitioner.clone(),
        service: service.clone(),
        business_id: req.business_id.clone(),
        date,
        hour,
        minute,
    };

    let confirmation = match &req.reschedule_appointment_id {
        Some(original) => {
            let original_id = AppointmentId(Uuid::parse_str(original).map_err(|_| {
                AppError::new(
                    ErrorCode::AppointmentNotFound,
                    format!("'{}' is not an appointment id", original),
                )
            })?);
            booking
                .reschedule(&clinic, &pms, tz, original_id, create_request)
                .await?
        }
        None => booking.create(&clinic, &pms, tz, create_request).await?,
    };

    let appointment = &confirmation.appointment;
    let local = appointment.starts_at.with_timezone(&tz);
    let booking_id = appointment.appointment_id.to_string();
    let confirmation_number = booking_id[..8].to_uppercase();

    let message = format!(
        "All booked! {} with {} at {}, {}.",
        service.name,
        practitioner.full_name(),
        location.name,
        format_for_voice(appointment.starts_at, tz),
    );

    Ok((
        message,
        BookingPayload {
            booking_id,
            confirmation_number,
            practitioner: PractitionerInfo {
                id: practitioner.practitioner_id.clone(),
                name: practitioner.full_name(),
            },
            service: ServiceInfo {
                id: service.service_id.clone(),
                name: service.name.clone(),
                duration_minutes: service.duration_minutes,
            },
            location: LocationInfo {
                id: location.business_id.clone(),
                name: location.name.clone(),
                is_primary: location.is_primary,
            },
            time_slot: TimeSlotInfo {
                date: local.format("%Y-%m-%d").to_string(),
                time: format_time_for_voice(appointment.starts_at, tz),
                spoken: format_for_voice(appointment.starts_at, tz),
            },
            patient_name: confirmation.patient.full_name(),
        },
    ))
}

/// POST /cancellation-handler
///
/// Cancel an appointment by id or by description
pub async fn handle_cancellation(
    State(state): State<AppState>,
    Json(req): Json<CancelAppointmentRequest>,
) -> Response {
    let session_id = req.session_id.clone();
    respond(session_id, handle_cancellation_inner(&state, req).await)
}

async fn handle_cancellation_inner(
    state: &AppState,
    req: CancelAppointmentRequest,
) -> Result<(String, CancellationPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let caller_phone = PhoneValidator::normalize(&req.caller_phone).ok_or_else(|| {
        AppError::new(
            ErrorCode::InvalidPhoneNumber,
            format!("'{}' is not a valid phone number", PhoneValidator::mask(&req.caller_phone)),
        )
    })?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let tz = state.clinic_tz(&clinic);

    let appointment_id = match &req.appointment_id {
        Some(raw) => Some(AppointmentId(Uuid::parse_str(raw).map_err(|_| {
            AppError::new(
                ErrorCode::AppointmentNotFound,
                format!("'{}' is not an appointment id", raw),
            )
        })?)),
        None => None,
    };

    let booking = BookingService::new(
        state.pool.clone(),
        state.cache.clone(),
        state.config.booking.clone(),
    );
    let pms = state.pms.for_clinic(&clinic);

    let cancelled = booking
        .cancel(
            &clinic,
            &pms,
            CancelBookingRequest {
                session_id: SessionId::new(req.session_id.clone()),
                caller_phone,
                appointment_id,
                description: req.description.clone(),
            },
        )
        .await?;

    let practitioner = catalog.practitioner(&cancelled.practitioner_id).await?;
    let local = cancelled.starts_at.with_timezone(&tz);

    let message = format!(
        "Done. Your appointment with {} on {} has been cancelled.",
        practitioner.full_name(),
        format_date_for_voice(cancelled.starts_at, tz),
    );

    Ok((
        message,
        CancellationPayload {
            cancelled: true,
            practitioner: Some(PractitionerInfo {
                id: practitioner.practitioner_id.clone(),
                name: practitioner.full_name(),
            }),
            time_slot: Some(TimeSlotInfo {
                date: local.format("%Y-%m-%d").to_string(),
                time: format_time_for_voice(cancelled.starts_at, tz),
                spoken: format_for_voice(cancelled.starts_at, tz),
            }),
        },
    ))
}
