/*!
 * Practitioner Catalog Handlers
 *
 * Enumerates practitioners, their services, and their locations, plus the
 * "who has any slot on this date" roll-up.
 */

use axum::{extract::State, response::Response, Json};
use validator::Validate;

use crate::handlers::{respond, AppState};
use crate::models::{
    AvailablePractitionersPayload, AvailablePractitionersRequest, Location,
    LocationInfo, LocationPractitionersPayload, LocationPractitionersRequest, Practitioner,
    PractitionerInfo, PractitionerInfoPayload, PractitionerQueryRequest,
    PractitionerServicesPayload, Service, ServiceInfo, SessionId,
};
use crate::services::{AvailabilityService, CatalogService, SessionService};
use crate::utils::errors::{AppError, ErrorCode, Result};
use crate::utils::time::parse_spoken_date;

fn practitioner_payload(practitioner: &Practitioner) -> PractitionerInfo {
    PractitionerInfo {
        id: practitioner.practitioner_id.clone(),
        name: practitioner.full_name(),
    }
}

fn service_payload(service: &Service) -> ServiceInfo {
    ServiceInfo {
        id: service.service_id.clone(),
        name: service.name.clone(),
        duration_minutes: service.duration_minutes,
    }
}

fn location_payload(location: &Location) -> LocationInfo {
    LocationInfo {
        id: location.business_id.clone(),
        name: location.name.clone(),
        is_primary: location.is_primary,
    }
}

/// POST /practitioner-services
///
/// List the services a practitioner offers
pub async fn practitioner_services(
    State(state): State<AppState>,
    Json(req): Json<PractitionerQueryRequest>,
) -> Response {
    respond(String::new(), practitioner_services_inner(&state, req).await)
}

async fn practitioner_services_inner(
    state: &AppState,
    req: PractitionerQueryRequest,
) -> Result<(String, PractitionerServicesPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let practitioner = catalog
        .resolve_practitioner(clinic.clinic_id, &req.practitioner)
        .await?;

    let services = catalog
        .services_for_practitioner(&practitioner.practitioner_id)
        .await?;

    let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
    let message = if names.is_empty() {
        format!("{} has no bookable services right now.", practitioner.full_name())
    } else {
        format!("{} offers {}.", practitioner.full_name(), names.join(", "))
    };

    let default_service = services.first().map(service_payload);

    Ok((
        message,
        PractitionerServicesPayload {
            practitioner: practitioner_payload(&practitioner),
            services: services.iter().map(service_payload).collect(),
            default_service,
        },
    ))
}

/// POST /practitioner-info
///
/// Full practitioner summary: services and locations
pub async fn practitioner_info(
    State(state): State<AppState>,
    Json(req): Json<PractitionerQueryRequest>,
) -> Response {
    respond(String::new(), practitioner_info_inner(&state, req).await)
}

async fn practitioner_info_inner(
    state: &AppState,
    req: PractitionerQueryRequest,
) -> Result<(String, PractitionerInfoPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let practitioner = catalog
        .resolve_practitioner(clinic.clinic_id, &req.practitioner)
        .await?;

    let services = catalog
        .services_for_practitioner(&practitioner.practitioner_id)
        .await?;
    let locations = catalog
        .locations_for_practitioner(&practitioner.practitioner_id)
        .await?;

    let location_names: Vec<&str> = locations.iter().map(|l| l.name.as_str()).collect();
    let message = format!(
        "{} works at {}.",
        practitioner.full_name(),
        if location_names.is_empty() {
            "no locations currently".to_string()
        } else {
            location_names.join(" and ")
        }
    );

    Ok((
        message,
        PractitionerInfoPayload {
            practitioner: practitioner_payload(&practitioner),
            services: services.iter().map(service_payload).collect(),
            locations: locations.iter().map(location_payload).collect(),
        },
    ))
}

/// POST /location-practitioners
///
/// All practitioners assigned to a location
pub async fn location_practitioners(
    State(state): State<AppState>,
    Json(req): Json<LocationPractitionersRequest>,
) -> Response {
    respond(String::new(), location_practitioners_inner(&state, req).await)
}

async fn location_practitioners_inner(
    state: &AppState,
    req: LocationPractitionersRequest,
) -> Result<(String, LocationPractitionersPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let location = catalog.location(clinic.clinic_id, &req.business_id).await?;
    let practitioners = catalog.practitioners_at_location(&req.business_id).await?;

    let names: Vec<String> = practitioners.iter().map(|p| p.full_name()).collect();
    let message = if names.is_empty() {
        format!("No practitioners are currently assigned to {}.", location.name)
    } else {
        format!("At {} we have {}.", location.name, names.join(", "))
    };

    Ok((
        message,
        LocationPractitionersPayload {
            location: location_payload(&location),
            practitioners: practitioners.iter().map(practitioner_payload).collect(),
        },
    ))
}

/// POST /available-practitioners
///
/// Which practitioners at a location have any slot on a date
pub async fn available_practitioners(
    State(state): State<AppState>,
    Json(req): Json<AvailablePractitionersRequest>,
) -> Response {
    let session_id = req.session_id.clone().unwrap_or_default();
    respond(session_id, available_practitioners_inner(&state, req).await)
}

async fn available_practitioners_inner(
    state: &AppState,
    req: AvailablePractitionersRequest,
) -> Result<(String, AvailablePractitionersPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let tz = state.clinic_tz(&clinic);
    let location = catalog.location(clinic.clinic_id, &req.business_id).await?;

    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let date = parse_spoken_date(&req.date, today)?;

    let roster = catalog.practitioners_at_location(&req.business_id).await?;
    let practitioner_ids: Vec<_> = roster.iter().map(|p| p.practitioner_id.clone()).collect();

    let session = SessionService::new(
        state.pool.clone(),
        state.config.booking.rejected_slot_ttl,
        state.config.booking.failed_attempt_ttl,
        state.config.booking.lock_ttl,
    );
    let session_id = req.session_id.as_deref().map(SessionId::from);
    let filter = session
        .build_slot_filter(session_id.as_ref(), &practitioner_ids, date, date)
        .await;

    let pms = state.pms.for_clinic(&clinic);
    let engine = AvailabilityService::new(state.pool.clone(), state.cache.clone());

    let available = engine
        .available_practitioners(
            &clinic,
            &pms,
            &req.business_id,
            date,
            &filter,
            state.request_deadline(),
        )
        .await?;

    let names: Vec<String> = available.iter().map(|p| p.full_name()).collect();
    let message = if names.is_empty() {
        format!("Nobody at {} has openings on {}.", location.name, date.format("%A, %-d %B"))
    } else {
        format!(
            "On {} at {}, {} {} available.",
            date.format("%A, %-d %B"),
            location.name,
            names.join(" and "),
            if names.len() == 1 { "is" } else { "are" }
        )
    };

    Ok((
        message,
        AvailablePractitionersPayload {
            date: date.format("%Y-%m-%d").to_string(),
            location: location_payload(&location),
            practitioners: available.iter().map(practitioner_payload).collect(),
        },
    ))
}
