/*!
 * Availability Handlers
 *
 * The specific-date availability check, the find-next-available scan, and
 * the rejected-slot recorder.
 */

use axum::{extract::State, response::{IntoResponse, Response}, Json};
use validator::Validate;

use crate::handlers::{respond, AppState};
use crate::models::webhook::WebhookEnvelope;
use crate::models::{
    CheckAvailabilityPayload, CheckAvailabilityRequest, FindNextAvailablePayload,
    FindNextAvailableRequest, LocationInfo, PractitionerInfo, RejectSlotsPayload,
    RejectSlotsRequest, ServiceInfo, SessionId, SlotKey, TimeSlotInfo,
};
use crate::services::{
    AvailabilityService, CatalogService, NextAvailableQuery, SessionService,
};
use crate::utils::errors::{AppError, ErrorCode, Result};
use crate::utils::time::{
    combine_date_time_local, format_date_for_voice, format_for_voice, format_time_for_voice,
    parse_spoken_date, parse_spoken_time,
};

fn session_service(state: &AppState) -> SessionService {
    SessionService::new(
        state.pool.clone(),
        state.config.booking.rejected_slot_ttl,
        state.config.booking.failed_attempt_ttl,
        state.config.booking.lock_ttl,
    )
}

/// POST /availability-checker
///
/// All offerable times on a specific date. Dateless queries are rejected
/// with a routing hint: "the next one" means find-next-available, not
/// "the earliest today".
pub async fn check_availability(
    State(state): State<AppState>,
    Json(req): Json<CheckAvailabilityRequest>,
) -> Response {
    let session_id = req.session_id.clone().unwrap_or_default();
    respond(session_id, check_availability_inner(&state, req).await)
}

async fn check_availability_inner(
    state: &AppState,
    req: CheckAvailabilityRequest,
) -> Result<(String, CheckAvailabilityPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let Some(date_query) = req.date.as_deref().filter(|d| !d.trim().is_empty()) else {
        return Err(AppError::new(
            ErrorCode::UseFindNextAvailable,
            "dateless availability query must go through find-next-available",
        ));
    };

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let tz = state.clinic_tz(&clinic);

    let practitioner = catalog
        .resolve_practitioner(clinic.clinic_id, &req.practitioner)
        .await?;
    let service = catalog
        .resolve_service(clinic.clinic_id, &req.appointment_type, &state.cache.service_match)
        .await?;
    catalog.location(clinic.clinic_id, &req.business_id).await?;

    if !catalog
        .practitioner_works_at(&practitioner.practitioner_id, &req.business_id)
        .await?
    {
        return Err(AppError::new(
            ErrorCode::PractitionerLocationMismatch,
            format!(
                "{} does not work at {}",
                practitioner.full_name(),
                req.business_id
            ),
        ));
    }

    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let date = parse_spoken_date(date_query, today)?;

    let session = session_service(state);
    let session_id = req.session_id.as_deref().map(SessionId::from);
    let filter = session
        .build_slot_filter(
            session_id.as_ref(),
            std::slice::from_ref(&practitioner.practitioner_id),
            date,
            date,
        )
        .await;

    let pms = state.pms.for_clinic(&clinic);
    let engine = AvailabilityService::new(state.pool.clone(), state.cache.clone());

    let day = engine
        .single_day(
            &clinic,
            &pms,
            &practitioner,
            &service,
            &req.business_id,
            date,
            &filter,
        )
        .await?;

    if day.slots.is_empty() {
        return Err(AppError::new(
            ErrorCode::NoAvailability,
            format!(
                "no offerable slots on {} (filtered: {})",
                date, day.filtered
            ),
        ));
    }

    let times: Vec<String> = day
        .slots
        .iter()
        .map(|s| format_time_for_voice(*s, tz))
        .collect();

    let message = format!(
        "{} has {} available on {}.",
        practitioner.full_name(),
        times.join(", "),
        format_date_for_voice(day.slots[0], tz),
    );

    Ok((
        message,
        CheckAvailabilityPayload {
            practitioner: PractitionerInfo {
                id: practitioner.practitioner_id.clone(),
                name: practitioner.full_name(),
            },
            service: ServiceInfo {
                id: service.service_id.clone(),
                name: service.name.clone(),
                duration_minutes: service.duration_minutes,
            },
            date: date.format("%Y-%m-%d").to_string(),
            available_times: times,
        },
    ))
}

/// POST /next-available
///
/// Earliest offerable slot within the horizon, for a practitioner or a
/// service
pub async fn find_next_available(
    State(state): State<AppState>,
    Json(req): Json<FindNextAvailableRequest>,
) -> Response {
    let session_id = req.session_id.clone().unwrap_or_default();

    match find_next_available_inner(&state, req).await {
        Ok((message, payload)) => {
            if payload.found {
                Json(WebhookEnvelope::ok(session_id, message, payload)).into_response()
            } else {
                // The payload still reports found: false so the agent can
                // branch without parsing the error code
                Json(WebhookEnvelope::err_with_data(
                    session_id,
                    ErrorCode::NoAvailability,
                    message,
                    payload,
                ))
                .into_response()
            }
        }
        Err(err) => {
            tracing::warn!(code = err.code.as_str(), detail = %err.detail, "Find-next failed");
            Json(WebhookEnvelope::<FindNextAvailablePayload>::err(
                session_id,
                err.code,
                err.code.voice_message(),
            ))
            .into_response()
        }
    }
}

async fn find_next_available_inner(
    state: &AppState,
    req: FindNextAvailableRequest,
) -> Result<(String, FindNextAvailablePayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    if req.practitioner.is_none() && req.service.is_none() {
        return Err(AppError::new(
            ErrorCode::MissingInformation,
            "find-next needs a practitioner or a service",
        ));
    }

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let tz = state.clinic_tz(&clinic);

    if let Some(business_id) = &req.location_id {
        catalog.location(clinic.clinic_id, business_id).await?;
    }

    let practitioner = match &req.practitioner {
        Some(query) => Some(catalog.resolve_practitioner(clinic.clinic_id, query).await?),
        None => None,
    };

    // Service-first search resolves the service; practitioner-first falls
    // back to the practitioner's default service for the PMS query
    let service = match &req.service {
        Some(query) => {
            catalog
                .resolve_service(clinic.clinic_id, query, &state.cache.service_match)
                .await?
        }
        None => {
            let practitioner = practitioner
                .as_ref()
                .expect("validated: practitioner or service is present");
            catalog
                .services_for_practitioner(&practitioner.practitioner_id)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppError::new(
                        ErrorCode::ServiceNotFound,
                        format!("{} offers no active services", practitioner.full_name()),
                    )
                })?
        }
    };

    let max_days = req
        .max_days
        .unwrap_or(state.config.booking.default_max_days)
        .min(state.config.booking.max_max_days);

    // Candidate practitioners for the filter
    let candidates = match &practitioner {
        Some(p) => vec![p.clone()],
        None => {
            catalog
                .practitioners_for_service(&service.service_id, req.location_id.as_ref())
                .await?
        }
    };
    if candidates.is_empty() {
        return Err(AppError::new(
            ErrorCode::PractitionerNotAvailable,
            format!("nobody offers {} at the requested location", service.name),
        ));
    }

    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let horizon_end = today + chrono::Duration::days(max_days.saturating_sub(1) as i64);
    let practitioner_ids: Vec<_> = candidates
        .iter()
        .map(|p| p.practitioner_id.clone())
        .collect();

    let session = session_service(state);
    let session_id = req.session_id.as_deref().map(SessionId::from);
    let filter = session
        .build_slot_filter(session_id.as_ref(), &practitioner_ids, today, horizon_end)
        .await;

    let pms = state.pms.for_clinic(&clinic);
    let engine = AvailabilityService::new(state.pool.clone(), state.cache.clone());

    let found = engine
        .find_next_available(
            &clinic,
            &pms,
            tz,
            NextAvailableQuery {
                practitioner,
                service: service.clone(),
                business_id: req.location_id.clone(),
                max_days,
            },
            &filter,
            state.request_deadline(),
        )
        .await?;

    match found {
        Some(slot) => {
            let location = catalog
                .location(clinic.clinic_id, &slot.business_id)
                .await?;
            let local = slot.starts_at.with_timezone(&tz);

            let message = format!(
                "The next opening for {} is {} with {} at {}.",
                service.name,
                format_for_voice(slot.starts_at, tz),
                slot.practitioner.full_name(),
                location.name,
            );

            Ok((
                message,
                FindNextAvailablePayload {
                    found: true,
                    slot: Some(TimeSlotInfo {
                        date: local.format("%Y-%m-%d").to_string(),
                        time: format_time_for_voice(slot.starts_at, tz),
                        spoken: format_for_voice(slot.starts_at, tz),
                    }),
                    practitioner: Some(PractitionerInfo {
                        id: slot.practitioner.practitioner_id.clone(),
                        name: slot.practitioner.full_name(),
                    }),
                    service: Some(ServiceInfo {
                        id: service.service_id.clone(),
                        name: service.name.clone(),
                        duration_minutes: service.duration_minutes,
                    }),
                    location: Some(LocationInfo {
                        id: location.business_id.clone(),
                        name: location.name.clone(),
                        is_primary: location.is_primary,
                    }),
                },
            ))
        }
        None => Ok((
            format!(
                "I couldn't find any openings for {} in the next {} days.",
                service.name, max_days
            ),
            FindNextAvailablePayload {
                found: false,
                slot: None,
                practitioner: None,
                service: None,
                location: None,
            },
        )),
    }
}

/// POST /rejected-slots
///
/// Record slots the caller declined so they are never re-offered during
/// this session
pub async fn reject_slots(
    State(state): State<AppState>,
    Json(req): Json<RejectSlotsRequest>,
) -> Response {
    let session_id = req.session_id.clone();
    respond(session_id, reject_slots_inner(&state, req).await)
}

async fn reject_slots_inner(
    state: &AppState,
    req: RejectSlotsRequest,
) -> Result<(String, RejectSlotsPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let tz = state.clinic_tz(&clinic);

    let practitioner = catalog
        .resolve_practitioner(clinic.clinic_id, &req.practitioner)
        .await?;

    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let date = parse_spoken_date(&req.date, today)?;

    let mut keys = Vec::with_capacity(req.times.len());
    for time in &req.times {
        let (hour, minute) = parse_spoken_time(time)?;
        let starts_at = combine_date_time_local(date, hour, minute, tz)?;
        keys.push(SlotKey::new(
            practitioner.practitioner_id.clone(),
            req.business_id.clone(),
            starts_at,
        ));
    }

    let session = session_service(state);
    let session_id = SessionId::new(req.session_id.clone());
    let recorded = session.record_rejected(&session_id, &keys).await?;

    Ok((
        "No problem, I won't offer those times again.".to_string(),
        RejectSlotsPayload { recorded },
    ))
}
