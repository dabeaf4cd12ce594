/*!
 * Webhook Routes
 *
 * Every operation the voice agent can invoke during a call. All routes
 * are JSON POST behind the static API-key middleware.
 */

use axum::{middleware, routing::post, Router};

use crate::handlers::{
    available_practitioners, check_availability, confirm_location, find_next_available,
    handle_appointment, handle_cancellation, location_practitioners, practitioner_info,
    practitioner_services, reject_slots, resolve_location, AppState,
};
use crate::middleware::api_key_auth_middleware;

/// Create the webhook routes
///
/// # Arguments
///
/// * `state` - Application state containing the pool, caches, and PMS
///   client factory
pub fn create_webhook_routes(state: AppState) -> Router {
    Router::new()
        // Location resolution
        .route("/location-resolver", post(resolve_location))
        .route("/location-confirmer", post(confirm_location))
        // Catalog queries
        .route("/practitioner-services", post(practitioner_services))
        .route("/practitioner-info", post(practitioner_info))
        .route("/location-practitioners", post(location_practitioners))
        .route("/available-practitioners", post(available_practitioners))
        // Availability
        .route("/availability-checker", post(check_availability))
        .route("/next-available", post(find_next_available))
        .route("/rejected-slots", post(reject_slots))
        // Booking lifecycle
        .route("/appointment-handler", post(handle_appointment))
        .route("/cancellation-handler", post(handle_cancellation))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_auth_middleware,
        ))
        .with_state(state)
}
