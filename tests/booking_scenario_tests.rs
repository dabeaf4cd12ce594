/*!
 * Booking Scenario Tests
 *
 * End-to-end scenarios over the availability engine and booking
 * coordinator with a mock PMS upstream:
 * - Happy path booking
 * - Rejected-slot suppression
 * - Concurrent booking race
 * - Reschedule atomicity
 * - Find-next-available across days with schedule pruning
 *
 * All tests require the test database to be running (migrations applied)
 * and are marked #[ignore] accordingly.
 */

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Australia::Sydney;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voicebook_backend::cache::TieredCache;
use voicebook_backend::models::{Clinic, SessionId, SlotKey};
use voicebook_backend::pms::{PmsClient, PmsClientFactory};
use voicebook_backend::services::{
    AvailabilityService, BookingService, CatalogService, CreateBookingRequest,
    NextAvailableQuery, SessionService, SlotFilter,
};
use voicebook_backend::utils::errors::ErrorCode;

mod test_utils;
use test_utils::{clinic_row, seed_clinic, setup_test_db, teardown_test_db, test_config, SeededClinic};

/// The first weekday strictly after today and within the next five days;
/// always lands inside the first seven-day scan window
fn upcoming_weekday() -> NaiveDate {
    let today = Utc::now().with_timezone(&Sydney).date_naive();
    let mut candidate = today + Duration::days(1);
    while matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) {
        candidate += Duration::days(1);
    }
    candidate
}

/// UTC instant for a Sydney civil time
fn sydney_at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Sydney
        .from_local_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

struct Harness {
    pool: sqlx::PgPool,
    cache: TieredCache,
    clinic: Clinic,
    seeded: SeededClinic,
    server: MockServer,
    pms: PmsClient,
}

impl Harness {
    async fn new() -> Harness {
        let config = test_config();
        let pool = setup_test_db(&config.database).await;
        teardown_test_db(&pool).await;

        let seeded = seed_clinic(&pool).await;
        let clinic = clinic_row(&pool, seeded.clinic_id).await;
        let cache = TieredCache::new(pool.clone(), &config.cache);

        let server = MockServer::start().await;
        let factory = PmsClientFactory::new(config.pms).expect("factory");
        let pms = factory.for_clinic_with_base(&clinic, server.uri());

        Harness {
            pool,
            cache,
            clinic,
            seeded,
            server,
            pms,
        }
    }

    fn engine(&self) -> AvailabilityService {
        AvailabilityService::new(self.pool.clone(), self.cache.clone())
    }

    fn booking(&self) -> BookingService {
        BookingService::new(self.pool.clone(), self.cache.clone(), test_config().booking)
    }

    fn session(&self) -> SessionService {
        let config = test_config().booking;
        SessionService::new(
            self.pool.clone(),
            config.rejected_slot_ttl,
            config.failed_attempt_ttl,
            config.lock_ttl,
        )
    }

    fn catalog(&self) -> CatalogService {
        CatalogService::new(self.pool.clone())
    }

    async fn mock_patient_flow(&self) {
        Mock::given(method("GET"))
            .and(path("/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "patients": [],
                "links": {}
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pms-pat-1",
                "first_name": "Test",
                "last_name": "Patient"
            })))
            .mount(&self.server)
            .await;
    }

    async fn mock_availability(&self, slots: Vec<DateTime<Utc>>) {
        let times: Vec<serde_json::Value> = slots
            .iter()
            .map(|s| serde_json::json!({"appointment_start": s.to_rfc3339()}))
            .collect();

        Mock::given(method("GET"))
            .and(path_regex(r"^/businesses/.+/available_times$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "available_times": times,
                "links": {}
            })))
            .mount(&self.server)
            .await;
    }

    fn create_request(
        &self,
        session: &str,
        phone: &str,
        practitioner: &voicebook_backend::models::Practitioner,
        service: &voicebook_backend::models::Service,
        date: NaiveDate,
        hour: u32,
        minute: u32,
    ) -> CreateBookingRequest {
        CreateBookingRequest {
            session_id: SessionId::new(session),
            caller_phone: phone.to_string(),
            first_name: "Test".to_string(),
            last_name: "Patient".to_string(),
            practitioner: practitioner.clone(),
            service: service.clone(),
            business_id: self.seeded.city.clone(),
            date,
            hour,
            minute,
        }
    }
}

// ============================================================================
// Scenario: happy path booking
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_happy_path_booking() {
    let h = Harness::new().await;
    let date = upcoming_weekday();
    let slot = sydney_at(date, 10, 0);

    h.mock_availability(vec![slot, sydney_at(date, 11, 0)]).await;
    h.mock_patient_flow().await;

    Mock::given(method("POST"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pms-appt-1",
            "start_time": slot.to_rfc3339()
        })))
        .mount(&h.server)
        .await;

    let practitioner = h.catalog().practitioner(&h.seeded.brendan).await.unwrap();
    let service = h.catalog().service(&h.seeded.massage).await.unwrap();

    // Availability first, the way a call flows
    let day = h
        .engine()
        .single_day(
            &h.clinic,
            &h.pms,
            &practitioner,
            &service,
            &h.seeded.city,
            date,
            &SlotFilter::default(),
        )
        .await
        .unwrap();

    assert!(day.slots.contains(&slot));
    assert_eq!(
        voicebook_backend::utils::time::format_time_for_voice(slot, Sydney),
        "10:00 AM"
    );

    // Then the booking
    let confirmation = h
        .booking()
        .create(
            &h.clinic,
            &h.pms,
            Sydney,
            h.create_request("session-1", "+61478621276", &practitioner, &service, date, 10, 0),
        )
        .await
        .unwrap();

    assert!(!confirmation.appointment.appointment_id.to_string().is_empty());
    assert_eq!(
        confirmation.appointment.pms_appointment_id.as_deref(),
        Some("pms-appt-1")
    );

    // The availability entry for that day must be stale after the booking
    let cached = h
        .cache
        .availability
        .get(&h.seeded.brendan, &h.seeded.city, date)
        .await;
    assert!(cached.is_none(), "cache entry should be stale after booking");
}

// ============================================================================
// Scenario: rejected-slot suppression
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_rejected_slots_are_never_reoffered() {
    let h = Harness::new().await;
    let date = upcoming_weekday();
    let ten = sydney_at(date, 10, 0);
    let eleven = sydney_at(date, 11, 0);
    let fourteen = sydney_at(date, 14, 0);

    h.mock_availability(vec![ten, eleven, fourteen]).await;

    let practitioner = h.catalog().practitioner(&h.seeded.brendan).await.unwrap();
    let service = h.catalog().service(&h.seeded.massage).await.unwrap();
    let session_id = SessionId::new("session-reject");

    // The caller declines ten and eleven
    h.session()
        .record_rejected(
            &session_id,
            &[
                SlotKey::new(h.seeded.brendan.clone(), h.seeded.city.clone(), ten),
                SlotKey::new(h.seeded.brendan.clone(), h.seeded.city.clone(), eleven),
            ],
        )
        .await
        .unwrap();

    let filter = h
        .session()
        .build_slot_filter(
            Some(&session_id),
            std::slice::from_ref(&h.seeded.brendan),
            date,
            date,
        )
        .await;

    let day = h
        .engine()
        .single_day(
            &h.clinic,
            &h.pms,
            &practitioner,
            &service,
            &h.seeded.city,
            date,
            &filter,
        )
        .await
        .unwrap();

    assert_eq!(day.slots, vec![fourteen]);
    assert_eq!(day.filtered, 2);
    assert!(!day.slots.contains(&ten));
    assert!(!day.slots.contains(&eleven));
}

// ============================================================================
// Scenario: concurrent booking race
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_concurrent_booking_race_yields_one_winner() {
    let h = Harness::new().await;
    let date = upcoming_weekday();
    let slot = sydney_at(date, 10, 0);

    h.mock_availability(vec![slot]).await;
    h.mock_patient_flow().await;

    // First create succeeds; any second attempt conflicts
    Mock::given(method("POST"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pms-appt-race"
        })))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already booked"))
        .mount(&h.server)
        .await;

    let practitioner = h.catalog().practitioner(&h.seeded.brendan).await.unwrap();
    let service = h.catalog().service(&h.seeded.massage).await.unwrap();

    let booking_a = h.booking();
    let booking_b = h.booking();

    let (result_a, result_b) = tokio::join!(
        booking_a.create(
            &h.clinic,
            &h.pms,
            Sydney,
            h.create_request("session-a", "+61478621276", &practitioner, &service, date, 10, 0),
        ),
        booking_b.create(
            &h.clinic,
            &h.pms,
            Sydney,
            h.create_request("session-b", "+61412345678", &practitioner, &service, date, 10, 0),
        ),
    );

    let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one booking must win the race");

    let loser = if result_a.is_err() { result_a } else { result_b };
    assert_eq!(loser.unwrap_err().code, ErrorCode::SlotTaken);

    // Cache for the contested day is stale after both complete
    let cached = h
        .cache
        .availability
        .get(&h.seeded.brendan, &h.seeded.city, date)
        .await;
    assert!(cached.is_none());
}

// ============================================================================
// Scenario: reschedule atomicity
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_reschedule_failure_leaves_original_untouched() {
    let h = Harness::new().await;
    let date = upcoming_weekday();
    let original_slot = sydney_at(date, 10, 0);
    let wanted_slot = sydney_at(date, 14, 0);

    h.mock_availability(vec![original_slot, wanted_slot]).await;
    h.mock_patient_flow().await;

    // Seed the original booking through the coordinator
    Mock::given(method("POST"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pms-appt-original"
        })))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;

    let practitioner = h.catalog().practitioner(&h.seeded.brendan).await.unwrap();
    let service = h.catalog().service(&h.seeded.massage).await.unwrap();

    let original = h
        .booking()
        .create(
            &h.clinic,
            &h.pms,
            Sydney,
            h.create_request("session-r", "+61478621276", &practitioner, &service, date, 10, 0),
        )
        .await
        .unwrap();

    // The new time is in fact already taken upstream
    Mock::given(method("POST"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already booked"))
        .mount(&h.server)
        .await;

    let err = h
        .booking()
        .reschedule(
            &h.clinic,
            &h.pms,
            Sydney,
            original.appointment.appointment_id,
            h.create_request("session-r", "+61478621276", &practitioner, &service, date, 14, 0),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::SlotTaken);

    // The original stands, and nothing new was persisted
    let (status, count): (String, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT status FROM appointments WHERE appointment_id = $1),
            (SELECT COUNT(*) FROM appointments)
        "#,
    )
    .bind(original.appointment.appointment_id)
    .fetch_one(&h.pool)
    .await
    .unwrap();

    assert_eq!(status, "booked");
    assert_eq!(count, 1);
}

// ============================================================================
// Scenario: find-next-available across days
// ============================================================================

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_find_next_available_scans_lazily() {
    let h = Harness::new().await;

    // One slot a few days out at 09:00; earlier days are empty
    let slot_date = upcoming_weekday();
    let slot = sydney_at(slot_date, 9, 0);

    Mock::given(method("GET"))
        .and(path_regex(r"^/businesses/.+/available_times$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "available_times": [{"appointment_start": slot.to_rfc3339()}],
            "links": {}
        })))
        // The slot lands in the first window, so the lazy scan must not
        // spend a second span request
        .expect(1)
        .mount(&h.server)
        .await;

    let practitioner = h.catalog().practitioner(&h.seeded.brendan).await.unwrap();
    let service = h.catalog().service(&h.seeded.massage).await.unwrap();

    let found = h
        .engine()
        .find_next_available(
            &h.clinic,
            &h.pms,
            Sydney,
            NextAvailableQuery {
                practitioner: Some(practitioner),
                service,
                business_id: Some(h.seeded.city.clone()),
                max_days: 14,
            },
            &SlotFilter::default(),
            std::time::Instant::now() + std::time::Duration::from_secs(25),
        )
        .await
        .unwrap()
        .expect("a slot should be found");

    assert_eq!(found.starts_at, slot);
    assert_eq!(found.business_id, h.seeded.city);
}

#[tokio::test]
#[ignore] // Requires database to be running
async fn test_find_next_zero_horizon_makes_no_pms_calls() {
    let h = Harness::new().await;
    // No availability mock mounted: any PMS call would 404 into an error

    let practitioner = h.catalog().practitioner(&h.seeded.brendan).await.unwrap();
    let service = h.catalog().service(&h.seeded.massage).await.unwrap();

    let found = h
        .engine()
        .find_next_available(
            &h.clinic,
            &h.pms,
            Sydney,
            NextAvailableQuery {
                practitioner: Some(practitioner),
                service,
                business_id: Some(h.seeded.city.clone()),
                max_days: 0,
            },
            &SlotFilter::default(),
            std::time::Instant::now() + std::time::Duration::from_secs(25),
        )
        .await
        .unwrap();

    assert!(found.is_none());
}
