/*!
 * PMS HTTP Client
 *
 * Single entry point for all outbound calls to the practice-management
 * system. Handles per-clinic HTTP Basic credentials, link-traversal
 * pagination, rate-limit backoff with jitter, and the per-clinic
 * concurrency cap that keeps the tenancy under its request budget.
 *
 * Booking writes are never retried here; the PMS create endpoint is not
 * idempotent. Reads retry on 429/5xx/network failures up to the configured
 * attempt limit.
 */

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDate;
use rand::Rng;
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::PmsConfig;
use crate::models::{Clinic, ClinicId};
use crate::pms::error::PmsError;
use crate::pms::types::*;
use crate::utils::time::parse_pms_time;

/// Maximum availability window the PMS accepts, in days (inclusive)
pub const MAX_AVAILABILITY_SPAN_DAYS: i64 = 7;

/// Builds per-clinic clients and owns the per-clinic concurrency limits
pub struct PmsClientFactory {
    http: reqwest::Client,
    config: PmsConfig,
    semaphores: Mutex<HashMap<ClinicId, Arc<Semaphore>>>,
}

impl PmsClientFactory {
    pub fn new(config: PmsConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            config,
            semaphores: Mutex::new(HashMap::new()),
        })
    }

    /// Client for a clinic, with credentials from the clinic record.
    /// Credentials are never read from process-wide configuration.
    pub fn for_clinic(&self, clinic: &Clinic) -> PmsClient {
        let base_url = format!("https://api.{}.{}/v1", clinic.pms_shard, self.config.host);
        self.build(clinic, base_url)
    }

    /// Client with an explicit base URL; used by tests against a mock server
    pub fn for_clinic_with_base(&self, clinic: &Clinic, base_url: String) -> PmsClient {
        self.build(clinic, base_url)
    }

    fn build(&self, clinic: &Clinic, base_url: String) -> PmsClient {
        let semaphore = {
            let mut map = self.semaphores.lock().expect("semaphore registry poisoned");
            map.entry(clinic.clinic_id)
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_clinic_concurrency)))
                .clone()
        };

        PmsClient {
            http: self.http.clone(),
            base_url,
            api_key: clinic.pms_api_key.clone(),
            semaphore,
            max_retries: self.config.max_retries,
            backoff_base: self.config.backoff_base,
            backoff_cap: self.config.backoff_cap,
        }
    }
}

/// PMS client scoped to one clinic's credentials and concurrency budget
#[derive(Clone)]
pub struct PmsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl PmsClient {
    fn auth_header(&self) -> String {
        format!("Basic {}", BASE64.encode(format!("{}:", self.api_key)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Execute one HTTP request, classifying failures into the typed
    /// taxonomy. Retries only when `retry` is set and the failure is
    /// retryable.
    async fn execute_value(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
        retry: bool,
    ) -> Result<Option<Value>, PmsError> {
        let mut attempt: u32 = 0;

        loop {
            let (error, retry_after): (PmsError, Option<Duration>) = {
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .map_err(|_| PmsError::Transient("client shut down".to_string()))?;

                debug!(%url, method = %method, attempt, "PMS request");

                let mut request = self
                    .http
                    .request(method.clone(), &url)
                    .header(header::AUTHORIZATION, self.auth_header())
                    .header(header::ACCEPT, "application/json");

                if let Some(ref body) = body {
                    request = request.json(body);
                }

                match request.send().await {
                    Ok(response) => {
                        let status = response.status();
                        if status.is_success() {
                            if status == StatusCode::NO_CONTENT {
                                return Ok(None);
                            }
                            let bytes = response.bytes().await.map_err(PmsError::from)?;
                            if bytes.is_empty() {
                                return Ok(None);
                            }
                            let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
                                PmsError::Upstream(format!("unparseable PMS response: {}", e))
                            })?;
                            return Ok(Some(value));
                        }

                        let retry_after = parse_retry_after(response.headers());
                        let text = response.text().await.unwrap_or_default();
                        (classify_error(status, &text), retry_after)
                    }
                    Err(e) => (PmsError::from(e), None),
                }
            };

            if !retry || !error.is_retryable() || attempt >= self.max_retries {
                return Err(error);
            }

            let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
            warn!(
                %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "PMS request failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
        retry: bool,
    ) -> Result<T, PmsError> {
        let value = self
            .execute_value(method, url, body, retry)
            .await?
            .ok_or_else(|| PmsError::Upstream("empty PMS response body".to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| PmsError::Upstream(format!("unexpected PMS response shape: {}", e)))
    }

    /// Exponential backoff with jitter, capped
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.backoff_cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter_ms)
    }

    /// Follow `links.next` until the listing is exhausted
    async fn paged<P, I>(&self, first_url: String, extract: fn(P) -> (Vec<I>, Option<String>)) -> Result<Vec<I>, PmsError>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: P = self.execute(Method::GET, url, None, true).await?;
            let (page_items, page_next) = extract(page);
            items.extend(page_items);
            next = page_next;
        }

        Ok(items)
    }

    // ==================== Catalog endpoints ====================

    pub async fn get_businesses(&self) -> Result<Vec<PmsBusiness>, PmsError> {
        self.paged(self.url("/businesses"), |p: BusinessesPage| {
            (p.businesses, p.links.next)
        })
        .await
    }

    pub async fn get_practitioners(&self) -> Result<Vec<PmsPractitioner>, PmsError> {
        self.paged(self.url("/practitioners"), |p: PractitionersPage| {
            (p.practitioners, p.links.next)
        })
        .await
    }

    pub async fn get_business_practitioners(
        &self,
        business_id: &str,
    ) -> Result<Vec<PmsPractitioner>, PmsError> {
        self.paged(
            self.url(&format!("/businesses/{}/practitioners", business_id)),
            |p: PractitionersPage| (p.practitioners, p.links.next),
        )
        .await
    }

    pub async fn get_appointment_types(&self) -> Result<Vec<PmsAppointmentType>, PmsError> {
        self.paged(self.url("/appointment_types"), |p: AppointmentTypesPage| {
            (p.appointment_types, p.links.next)
        })
        .await
    }

    pub async fn get_practitioner_appointment_types(
        &self,
        practitioner_id: &str,
    ) -> Result<Vec<PmsAppointmentType>, PmsError> {
        self.paged(
            self.url(&format!(
                "/practitioners/{}/appointment_types",
                practitioner_id
            )),
            |p: AppointmentTypesPage| (p.appointment_types, p.links.next),
        )
        .await
    }

    pub async fn get_practitioner_businesses(
        &self,
        practitioner_id: &str,
    ) -> Result<Vec<PmsBusiness>, PmsError> {
        self.paged(
            self.url(&format!("/practitioners/{}/businesses", practitioner_id)),
            |p: BusinessesPage| (p.businesses, p.links.next),
        )
        .await
    }

    // ==================== Availability ====================

    /// Fetch offered slots for one (business, practitioner, appointment
    /// type) over a date-only window. The window must span at most seven
    /// days inclusive; the PMS rejects anything longer, so it is enforced
    /// here before a request is spent.
    pub async fn get_available_times(
        &self,
        business_id: &str,
        practitioner_id: &str,
        appointment_type_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<chrono::DateTime<chrono::Utc>>, PmsError> {
        if to < from {
            return Err(PmsError::InvalidTimeFrame(format!(
                "from {} is after to {}",
                from, to
            )));
        }
        let span = (to - from).num_days() + 1;
        if span > MAX_AVAILABILITY_SPAN_DAYS {
            return Err(PmsError::InvalidTimeFrame(format!(
                "window of {} days exceeds the {}-day maximum",
                span, MAX_AVAILABILITY_SPAN_DAYS
            )));
        }

        let url = self.url(&format!(
            "/businesses/{}/practitioners/{}/appointment_types/{}/available_times?from={}&to={}",
            business_id,
            practitioner_id,
            appointment_type_id,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        ));

        let raw = self
            .paged(url, |p: AvailableTimesPage| {
                (p.available_times, p.links.next)
            })
            .await?;

        let mut slots = Vec::with_capacity(raw.len());
        for slot in raw {
            let start = parse_pms_time(&slot.appointment_start)
                .map_err(|e| PmsError::Upstream(e.detail))?;
            slots.push(start);
        }
        slots.sort_unstable();
        Ok(slots)
    }

    // ==================== Patients ====================

    pub async fn search_patients(&self, phone: &str) -> Result<Vec<PmsPatient>, PmsError> {
        self.paged(
            self.url(&format!("/patients?search={}", urlencode(phone))),
            |p: PatientsPage| (p.patients, p.links.next),
        )
        .await
    }

    pub async fn create_patient(&self, patient: &CreatePmsPatient) -> Result<PmsPatient, PmsError> {
        let body = serde_json::to_value(patient)
            .map_err(|e| PmsError::Upstream(format!("unserializable patient: {}", e)))?;
        self.execute(Method::POST, self.url("/patients"), Some(body), true)
            .await
    }

    // ==================== Appointments ====================

    /// Create an appointment. This call is NOT idempotent upstream and is
    /// never retried; a transient failure surfaces as-is so the caller can
    /// decide what to tell the user.
    pub async fn create_appointment(
        &self,
        appointment: &CreatePmsAppointment,
    ) -> Result<PmsAppointment, PmsError> {
        let body = serde_json::to_value(appointment)
            .map_err(|e| PmsError::Upstream(format!("unserializable appointment: {}", e)))?;
        self.execute(Method::POST, self.url("/appointments"), Some(body), false)
            .await
    }

    /// Delete an appointment. 404 surfaces as `NotFound`; the coordinator
    /// treats it as an idempotent success.
    pub async fn cancel_appointment(&self, pms_appointment_id: &str) -> Result<(), PmsError> {
        self.execute_value(
            Method::DELETE,
            self.url(&format!("/appointments/{}", pms_appointment_id)),
            None,
            true,
        )
        .await
        .map(|_| ())
    }
}

/// Classify a non-success PMS status into the typed taxonomy
fn classify_error(status: StatusCode, body: &str) -> PmsError {
    let lower = body.to_lowercase();
    match status {
        StatusCode::UNAUTHORIZED => PmsError::Unauthorized,
        StatusCode::FORBIDDEN => PmsError::Forbidden,
        StatusCode::NOT_FOUND => PmsError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => PmsError::RateLimited,
        StatusCode::CONFLICT => PmsError::SlotTaken,
        s if s.is_server_error() => PmsError::Transient(format!("PMS returned {}", s)),
        _ => {
            if lower.contains("already booked")
                || lower.contains("not available")
                || lower.contains("appointment conflicts")
            {
                PmsError::SlotTaken
            } else if lower.contains("business hours") {
                PmsError::OutsideBusinessHours
            } else if lower.contains("time frame") || lower.contains("maximum of 7 days") {
                PmsError::InvalidTimeFrame(body.to_string())
            } else {
                PmsError::Upstream(format!("PMS returned {}: {}", status, body))
            }
        }
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Percent-encode the few characters that appear in phone numbers
fn urlencode(s: &str) -> String {
    s.replace('+', "%2B").replace(' ', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_4xx() {
        assert!(matches!(
            classify_error(StatusCode::UNAUTHORIZED, ""),
            PmsError::Unauthorized
        ));
        assert!(matches!(
            classify_error(StatusCode::CONFLICT, ""),
            PmsError::SlotTaken
        ));
        assert!(matches!(
            classify_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"errors":{"appointment_start":["is already booked"]}}"#
            ),
            PmsError::SlotTaken
        ));
        assert!(matches!(
            classify_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "appointment is outside business hours"
            ),
            PmsError::OutsideBusinessHours
        ));
        assert!(matches!(
            classify_error(
                StatusCode::BAD_REQUEST,
                "time frame must be a maximum of 7 days"
            ),
            PmsError::InvalidTimeFrame(_)
        ));
    }

    #[test]
    fn test_classify_5xx_is_transient() {
        assert!(classify_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_error(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
    }

    #[test]
    fn test_urlencode_phone() {
        assert_eq!(urlencode("+61478621276"), "%2B61478621276");
    }
}
