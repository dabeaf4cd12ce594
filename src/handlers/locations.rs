/*!
 * Location Resolution Handlers
 *
 * Resolves ambiguous spoken location references ("the main clinic",
 * "location two") and confirms a choice from previously offered options.
 */

use axum::{extract::State, response::Response, Json};
use validator::Validate;

use crate::handlers::{respond, AppState};
use crate::matcher::Resolution;
use crate::models::{
    BookingContext, BusinessId, ConfirmLocationPayload, ConfirmLocationRequest, Location,
    LocationInfo, ResolveLocationPayload, ResolveLocationRequest,
};
use crate::services::CatalogService;
use crate::utils::errors::{AppError, ErrorCode, Result};
use crate::utils::PhoneValidator;

fn location_info(location: &Location) -> LocationInfo {
    LocationInfo {
        id: location.business_id.clone(),
        name: location.name.clone(),
        is_primary: location.is_primary,
    }
}

/// POST /location-resolver
///
/// Resolve a spoken location query against the clinic's locations
pub async fn resolve_location(
    State(state): State<AppState>,
    Json(req): Json<ResolveLocationRequest>,
) -> Response {
    let session_id = req.session_id.clone();
    respond(session_id, resolve_location_inner(&state, req).await)
}

async fn resolve_location_inner(
    state: &AppState,
    req: ResolveLocationRequest,
) -> Result<(String, ResolveLocationPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;

    let (resolution, locations) = catalog
        .resolve_location(clinic.clinic_id, &req.location_query)
        .await?;

    match resolution {
        Resolution::Resolved(top) => {
            let business_id = BusinessId::new(top.key.clone());
            let location = locations
                .iter()
                .find(|l| l.business_id == business_id)
                .expect("resolved key came from this catalog");

            // Remember the preference for the rest of the call
            if let Some(phone) = req.caller_phone.as_deref().and_then(PhoneValidator::normalize) {
                state
                    .cache
                    .booking_context
                    .update(
                        &phone,
                        clinic.clinic_id,
                        BookingContext {
                            preferred_location: Some(business_id.clone()),
                            preferred_location_name: Some(location.name.clone()),
                            ..Default::default()
                        },
                    )
                    .await;
            }

            Ok((
                format!("Got it, {}.", location.name),
                ResolveLocationPayload {
                    resolved: true,
                    location: Some(location_info(location)),
                    needs_clarification: false,
                    options: None,
                    confidence: top.score,
                },
            ))
        }
        Resolution::Confirm(top) => {
            let business_id = BusinessId::new(top.key.clone());
            let location = locations
                .iter()
                .find(|l| l.business_id == business_id)
                .expect("confirm key came from this catalog");

            Ok((
                format!("Did you mean {}?", location.name),
                ResolveLocationPayload {
                    resolved: false,
                    location: Some(location_info(location)),
                    needs_clarification: true,
                    options: Some(vec![location.name.clone()]),
                    confidence: top.score,
                },
            ))
        }
        Resolution::Clarify(options) => {
            let names: Vec<String> = options.iter().map(|o| o.name.clone()).collect();
            let confidence = options.first().map(|o| o.score).unwrap_or(0.0);

            Ok((
                format!("We have a few locations: {}. Which one suits you?", names.join(", ")),
                ResolveLocationPayload {
                    resolved: false,
                    location: None,
                    needs_clarification: true,
                    options: Some(names),
                    confidence,
                },
            ))
        }
        Resolution::NoMatch => {
            // Offer everything rather than dead-ending the call
            let names: Vec<String> = locations.iter().map(|l| l.name.clone()).collect();

            Ok((
                format!("Our locations are {}. Which one would you like?", names.join(", ")),
                ResolveLocationPayload {
                    resolved: false,
                    location: None,
                    needs_clarification: true,
                    options: Some(names),
                    confidence: 0.0,
                },
            ))
        }
    }
}

/// POST /location-confirmer
///
/// Confirm the caller's pick from previously offered options
pub async fn confirm_location(
    State(state): State<AppState>,
    Json(req): Json<ConfirmLocationRequest>,
) -> Response {
    let session_id = req.session_id.clone();
    respond(session_id, confirm_location_inner(&state, req).await)
}

async fn confirm_location_inner(
    state: &AppState,
    req: ConfirmLocationRequest,
) -> Result<(String, ConfirmLocationPayload)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::MissingInformation, e.to_string()))?;

    let catalog = CatalogService::new(state.pool.clone());
    let clinic = catalog.clinic_by_dialed_number(&req.dialed_number).await?;
    let locations = catalog.locations(clinic.clinic_id).await?;

    // Only the offered options are in play for the confirmation
    let offered: Vec<&Location> = locations
        .iter()
        .filter(|l| req.options.iter().any(|o| o.eq_ignore_ascii_case(&l.name)))
        .collect();

    let candidates: Vec<crate::matcher::Candidate> = offered
        .iter()
        .enumerate()
        .map(|(ordinal, l)| crate::matcher::Candidate {
            key: l.business_id.to_string(),
            name: l.name.clone(),
            aliases: l.aliases.clone(),
            is_primary: l.is_primary,
            ordinal,
        })
        .collect();

    match crate::matcher::resolve(
        crate::matcher::EntityKind::Location,
        &req.user_response,
        &candidates,
    ) {
        Resolution::Resolved(top) | Resolution::Confirm(top) => {
            let business_id = BusinessId::new(top.key);
            let location = offered
                .into_iter()
                .find(|l| l.business_id == business_id)
                .expect("confirmed key came from the offered options");

            Ok((
                format!("Perfect, {} it is.", location.name),
                ConfirmLocationPayload {
                    location_confirmed: true,
                    location: Some(location_info(location)),
                    options: None,
                },
            ))
        }
        _ => Ok((
            format!(
                "Sorry, I didn't catch that. Your options are {}.",
                req.options.join(", ")
            ),
            ConfirmLocationPayload {
                location_confirmed: false,
                location: None,
                options: Some(req.options),
            },
        )),
    }
}
