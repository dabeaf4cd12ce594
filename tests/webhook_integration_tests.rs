/*!
 * Webhook Integration Tests
 *
 * Handler-level tests for the voice-agent surface:
 * - API key enforcement
 * - Location resolution and disambiguation
 * - Catalog queries
 * - Strict request schemas
 * - Dateless availability routing hint
 *
 * All tests require the test database to be running (migrations applied)
 * and are marked #[ignore] accordingly.
 */

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

mod test_utils;
use test_utils::{seed_clinic, teardown_test_db, TestApp, TEST_API_KEY};

/// Helper to read a response body as JSON
async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST a JSON payload to a webhook with the test API key
async fn post_webhook(app: &axum::Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header("x-api-key", TEST_API_KEY)
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let json = body_json(response.into_body()).await;
    (status, json)
}

async fn setup() -> (axum::Router, sqlx::PgPool, test_utils::SeededClinic) {
    let test_app = TestApp::new().await;
    teardown_test_db(&test_app.pool).await;
    let seeded = seed_clinic(&test_app.pool).await;
    (test_app.app, test_app.pool, seeded)
}

// ============================================================================
// Test: API key enforcement
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_missing_api_key_is_rejected() {
    let (app, _pool, seeded) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/location-resolver")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "locationQuery": "main",
                        "sessionId": "s1",
                        "dialedNumber": seeded.dialed_number
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Test: location resolution
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_generic_query_resolves_primary_location() {
    let (app, _pool, seeded) = setup().await;

    let (status, body) = post_webhook(
        &app,
        "/location-resolver",
        json!({
            "locationQuery": "main",
            "sessionId": "s1",
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["resolved"], true);
    assert_eq!(body["location"]["name"], "City Clinic");
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((confidence - 0.9).abs() < 0.01, "confidence was {}", confidence);
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_ambiguous_query_needs_clarification() {
    let (app, _pool, seeded) = setup().await;

    let (status, body) = post_webhook(
        &app,
        "/location-resolver",
        json!({
            "locationQuery": "clinic",
            "sessionId": "s1",
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved"], false);
    assert_eq!(body["needsClarification"], true);
    let options: Vec<&str> = body["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_str().unwrap())
        .collect();
    assert_eq!(options, vec!["City Clinic", "Suburban Clinic"]);
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_confirm_location_picks_from_options() {
    let (app, _pool, seeded) = setup().await;

    let (status, body) = post_webhook(
        &app,
        "/location-confirmer",
        json!({
            "userResponse": "suburban",
            "options": ["City Clinic", "Suburban Clinic"],
            "sessionId": "s1",
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locationConfirmed"], true);
    assert_eq!(body["location"]["name"], "Suburban Clinic");
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_unknown_dialed_number_is_clinic_not_found() {
    let (app, _pool, _seeded) = setup().await;

    let (_status, body) = post_webhook(
        &app,
        "/location-resolver",
        json!({
            "locationQuery": "main",
            "sessionId": "s1",
            "dialedNumber": "0400000000"
        }),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "clinic_not_found");
}

// ============================================================================
// Test: catalog queries
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_practitioner_services_lists_offerings() {
    let (app, _pool, seeded) = setup().await;

    let (status, body) = post_webhook(
        &app,
        "/practitioner-services",
        json!({
            "practitioner": "Brendan Smith",
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["practitioner"]["name"], "Brendan Smith");
    let names: Vec<&str> = body["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Massage"));
    assert!(names.contains(&"Physiotherapy"));
    assert!(body["defaultService"].is_object());
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_practitioner_clarification_for_ambiguous_name() {
    let (app, pool, seeded) = setup().await;

    // A second Smith makes a bare surname ambiguous
    sqlx::query(
        r#"
        INSERT INTO practitioners (practitioner_id, clinic_id, first_name, last_name)
        VALUES ('prac-jane', $1, 'Jane', 'Smith')
        "#,
    )
    .bind(seeded.clinic_id)
    .execute(&pool)
    .await
    .unwrap();

    let (_status, body) = post_webhook(
        &app,
        "/practitioner-services",
        json!({
            "practitioner": "Smith",
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "practitioner_clarification_needed");
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_location_practitioners_roster() {
    let (app, _pool, seeded) = setup().await;

    let (_status, body) = post_webhook(
        &app,
        "/location-practitioners",
        json!({
            "business_id": seeded.city,
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["location"]["name"], "City Clinic");
    assert_eq!(body["practitioners"].as_array().unwrap().len(), 2);
}

// ============================================================================
// Test: strict schemas and routing hints
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_unknown_fields_are_rejected() {
    let (app, _pool, seeded) = setup().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/location-resolver")
                .header("content-type", "application/json")
                .header("x-api-key", TEST_API_KEY)
                .body(Body::from(
                    json!({
                        "locationQuery": "main",
                        "sessionId": "s1",
                        "dialedNumber": seeded.dialed_number,
                        "legacyFlatField": "nope"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_dateless_availability_gets_routing_hint() {
    let (app, _pool, seeded) = setup().await;

    let (_status, body) = post_webhook(
        &app,
        "/availability-checker",
        json!({
            "practitioner": "Brendan Smith",
            "appointmentType": "Massage",
            "business_id": seeded.city,
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "use_find_next_available");
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_invalid_spoken_date_is_rejected() {
    let (app, _pool, seeded) = setup().await;

    let (_status, body) = post_webhook(
        &app,
        "/available-practitioners",
        json!({
            "business_id": seeded.city,
            "date": "whenever suits",
            "dialedNumber": seeded.dialed_number
        }),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "invalid_date");
}
