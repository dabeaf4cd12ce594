/*!
 * Booking Coordinator
 *
 * Create, cancel, and reschedule appointments against the PMS while
 * keeping the local mirror and availability cache coherent.
 *
 * The create protocol: resolve the patient, take the booking lock, confirm
 * the slot (cache first, then one authoritative PMS read), book upstream,
 * then persist locally in the same transaction that marks the availability
 * entry stale and writes the voice-booking log row. The upstream create is
 * not idempotent and is never retried. The lock is released on every exit
 * path and expires on its own if a worker dies mid-protocol.
 *
 * Reschedule is create-then-cancel, never modify-in-place.
 */

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::cache::{AvailabilityCache, TieredCache};
use crate::config::BookingConfig;
use crate::models::{
    Appointment, AppointmentId, AppointmentStatus, BookingContext, BusinessId, Clinic,
    Patient, Practitioner, Service, SessionId, SlotKey,
};
use crate::pms::types::CreatePmsAppointment;
use crate::pms::{PmsClient, PmsError};
use crate::services::patient_service::PatientService;
use crate::services::session_service::SessionService;
use crate::utils::errors::{AppError, ErrorCode, Result};
use crate::utils::time::combine_date_time_local;

/// A fully resolved booking request; entity resolution and validation
/// happen in the request layer before this is constructed
pub struct CreateBookingRequest {
    pub session_id: SessionId,
    /// Normalized caller phone (+61...)
    pub caller_phone: String,
    pub first_name: String,
    pub last_name: String,
    pub practitioner: Practitioner,
    pub service: Service,
    pub business_id: BusinessId,
    /// Clinic-local civil date and time
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

/// Result of a successful booking
#[derive(Debug)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub patient: Patient,
}

/// Identifies the appointment to cancel
pub struct CancelBookingRequest {
    pub session_id: SessionId,
    pub caller_phone: String,
    pub appointment_id: Option<AppointmentId>,
    pub description: Option<String>,
}

pub struct BookingService {
    pool: PgPool,
    cache: TieredCache,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(pool: PgPool, cache: TieredCache, config: BookingConfig) -> Self {
        Self {
            pool,
            cache,
            config,
        }
    }

    fn session(&self) -> SessionService {
        SessionService::new(
            self.pool.clone(),
            self.config.rejected_slot_ttl,
            self.config.failed_attempt_ttl,
            self.config.lock_ttl,
        )
    }

    /// Create an appointment end-to-end
    pub async fn create(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        tz: Tz,
        request: CreateBookingRequest,
    ) -> Result<BookingConfirmation> {
        let starts_at = combine_date_time_local(request.date, request.hour, request.minute, tz)?;
        let ends_at = starts_at + ChronoDuration::minutes(request.service.duration_minutes as i64);

        if starts_at <= Utc::now() {
            return Err(AppError::new(
                ErrorCode::InvalidTime,
                format!("{} is in the past", starts_at),
            ));
        }

        self.reject_duplicate(clinic, &request, starts_at).await?;

        // Patient resolution happens before the lock; it can be slow and
        // has no bearing on slot contention
        let patient = PatientService::new(self.pool.clone())
            .resolve_or_create(
                clinic,
                pms,
                &self.cache.patient_lookup,
                &request.caller_phone,
                &request.first_name,
                &request.last_name,
            )
            .await?;

        let session = self.session();
        let acquired = session
            .acquire_lock(
                &request.practitioner.practitioner_id,
                starts_at,
                &request.session_id,
            )
            .await?;

        if !acquired {
            info!(
                practitioner_id = %request.practitioner.practitioner_id,
                %starts_at,
                "Booking lock held by another session"
            );
            return Err(AppError::code(ErrorCode::SlotTaken));
        }

        let result = self
            .create_locked(clinic, pms, &request, &patient, starts_at, ends_at)
            .await;

        // Release on every exit path; expiry is only the fallback
        session
            .release_lock(
                &request.practitioner.practitioner_id,
                starts_at,
                &request.session_id,
            )
            .await;

        let appointment = result?;

        // Post-commit bookkeeping: the declined-slot list is spent, and the
        // caller's context learns their choices
        session.clear_rejected(&request.session_id).await;
        self.cache
            .booking_context
            .update(
                &request.caller_phone,
                clinic.clinic_id,
                BookingContext {
                    preferred_location: Some(request.business_id.clone()),
                    last_practitioner: Some(request.practitioner.practitioner_id.clone()),
                    last_practitioner_name: Some(request.practitioner.full_name()),
                    last_service: Some(request.service.service_id.clone()),
                    last_service_name: Some(request.service.name.clone()),
                    ..Default::default()
                },
            )
            .await;

        Ok(BookingConfirmation {
            appointment,
            patient,
        })
    }

    /// The portion of the create protocol that runs under the booking lock
    async fn create_locked(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        request: &CreateBookingRequest,
        patient: &Patient,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Appointment> {
        // Re-check the slot. The cache may be stale; the PMS read below is
        // the only authoritative availability read in the protocol.
        let cached = self
            .cache
            .availability
            .get(
                &request.practitioner.practitioner_id,
                &request.business_id,
                request.date,
            )
            .await;

        let confirmed = match cached {
            Some(slots) if slots.contains(&starts_at) => true,
            _ => {
                let slots = pms
                    .get_available_times(
                        request.business_id.as_str(),
                        request.practitioner.practitioner_id.as_str(),
                        request.service.service_id.as_str(),
                        request.date,
                        request.date,
                    )
                    .await
                    .map_err(AppError::from)?;

                self.cache
                    .availability
                    .set(
                        clinic.clinic_id,
                        &request.practitioner.practitioner_id,
                        &request.business_id,
                        request.date,
                        slots.clone(),
                    )
                    .await;

                slots.contains(&starts_at)
            }
        };

        if !confirmed {
            return Err(AppError::new(
                ErrorCode::TimeNotAvailable,
                format!("{} is not offered for this practitioner", starts_at),
            ));
        }

        let pms_patient_id = patient.pms_patient_id.clone().ok_or_else(|| {
            AppError::new(ErrorCode::UpstreamError, "patient has no PMS identifier")
        })?;

        // The one non-idempotent call in the protocol: no retries
        let pms_appointment = pms
            .create_appointment(&CreatePmsAppointment {
                patient_id: pms_patient_id,
                practitioner_id: request.practitioner.practitioner_id.to_string(),
                appointment_type_id: request.service.service_id.to_string(),
                business_id: request.business_id.to_string(),
                start_time: starts_at.to_rfc3339(),
                end_time: ends_at.to_rfc3339(),
            })
            .await;

        let pms_appointment = match pms_appointment {
            Ok(appointment) => appointment,
            Err(e @ (PmsError::SlotTaken | PmsError::OutsideBusinessHours)) => {
                // The cache lied; make sure nobody is offered this slot again
                self.cache
                    .availability
                    .invalidate_key(
                        &request.practitioner.practitioner_id,
                        &request.business_id,
                        request.date,
                    )
                    .await;

                let key = SlotKey::new(
                    request.practitioner.practitioner_id.clone(),
                    request.business_id.clone(),
                    starts_at,
                );
                if let Err(record_err) = self
                    .session()
                    .record_failed_attempt(&key, request.date)
                    .await
                {
                    warn!(error = %record_err, "Could not record failed booking attempt");
                }

                return Err(AppError::from(e));
            }
            Err(e) => return Err(AppError::from(e)),
        };

        // Local persistence, staleness marking, and the booking log share
        // one transaction; a reader who sees the appointment also sees the
        // stale cache entry
        let mut tx = self.pool.begin().await?;

        let appointment = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments
                (clinic_id, pms_appointment_id, patient_id, practitioner_id,
                 service_id, business_id, starts_at, ends_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'booked')
            RETURNING *
            "#,
        )
        .bind(clinic.clinic_id)
        .bind(&pms_appointment.id)
        .bind(patient.patient_id)
        .bind(&request.practitioner.practitioner_id)
        .bind(&request.service.service_id)
        .bind(&request.business_id)
        .bind(starts_at)
        .bind(ends_at)
        .fetch_one(&mut *tx)
        .await?;

        AvailabilityCache::mark_stale(
            &mut *tx,
            &request.practitioner.practitioner_id,
            &request.business_id,
            request.date,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO voice_bookings
                (clinic_id, session_id, caller_phone, appointment_id, action, status)
            VALUES ($1, $2, $3, $4, 'book', 'completed')
            "#,
        )
        .bind(clinic.clinic_id)
        .bind(&request.session_id)
        .bind(&request.caller_phone)
        .bind(appointment.appointment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            appointment_id = %appointment.appointment_id,
            pms_appointment_id = %pms_appointment.id,
            practitioner_id = %request.practitioner.practitioner_id,
            %starts_at,
            "Appointment booked"
        );

        Ok(appointment)
    }

    /// Cancel an appointment. Identifying it by id wins; otherwise the
    /// caller's near-term appointments are searched and disambiguated by
    /// the description. Cancelling an already-cancelled appointment is a
    /// successful no-op.
    pub async fn cancel(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        request: CancelBookingRequest,
    ) -> Result<Appointment> {
        let appointment = self.find_cancel_target(clinic, &request).await?;

        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(appointment);
        }

        if !appointment.can_cancel() {
            return Err(AppError::new(
                ErrorCode::AppointmentNotFound,
                format!(
                    "appointment {} is {:?} and cannot be cancelled",
                    appointment.appointment_id, appointment.status
                ),
            ));
        }

        if let Some(pms_id) = &appointment.pms_appointment_id {
            match pms.cancel_appointment(pms_id).await {
                Ok(()) => {}
                // Already gone upstream; treat as success
                Err(PmsError::NotFound) => {
                    info!(pms_appointment_id = %pms_id, "Appointment already cancelled upstream");
                }
                Err(e) => return Err(AppError::from(e)),
            }
        }

        let date = appointment.starts_at.date_naive();

        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments
            SET status = 'cancelled', updated_at = NOW()
            WHERE appointment_id = $1
            RETURNING *
            "#,
        )
        .bind(appointment.appointment_id)
        .fetch_one(&mut *tx)
        .await?;

        AvailabilityCache::mark_stale(
            &mut *tx,
            &appointment.practitioner_id,
            &appointment.business_id,
            date,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO voice_bookings
                (clinic_id, session_id, caller_phone, appointment_id, action, status)
            VALUES ($1, $2, $3, $4, 'cancel', 'completed')
            "#,
        )
        .bind(clinic.clinic_id)
        .bind(&request.session_id)
        .bind(&request.caller_phone)
        .bind(appointment.appointment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            appointment_id = %cancelled.appointment_id,
            "Appointment cancelled"
        );

        Ok(cancelled)
    }

    /// Reschedule: create the replacement first; only cancel the original
    /// once the new booking exists. A create failure leaves everything
    /// untouched.
    pub async fn reschedule(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        tz: Tz,
        original_id: AppointmentId,
        request: CreateBookingRequest,
    ) -> Result<BookingConfirmation> {
        let session_id = request.session_id.clone();
        let caller_phone = request.caller_phone.clone();

        let confirmation = self.create(clinic, pms, tz, request).await?;

        let cancel_result = self
            .cancel(
                clinic,
                pms,
                CancelBookingRequest {
                    session_id,
                    caller_phone,
                    appointment_id: Some(original_id),
                    description: None,
                },
            )
            .await;

        if let Err(e) = cancel_result {
            // The new booking stands; the caller keeps both until staff
            // resolve it. Surface loudly in logs.
            error!(
                original_id = %original_id,
                new_id = %confirmation.appointment.appointment_id,
                error = %e,
                "Reschedule booked the new time but failed to cancel the original"
            );
        }

        Ok(confirmation)
    }

    /// Refuse a second identical booking for the same patient
    async fn reject_duplicate(
        &self,
        clinic: &Clinic,
        request: &CreateBookingRequest,
        starts_at: DateTime<Utc>,
    ) -> Result<()> {
        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM appointments a
                JOIN patients p ON p.patient_id = a.patient_id
                WHERE a.clinic_id = $1
                  AND p.phone_normalized = $2
                  AND a.practitioner_id = $3
                  AND a.starts_at = $4
                  AND a.status IN ('booked', 'confirmed')
            )
            "#,
        )
        .bind(clinic.clinic_id)
        .bind(&request.caller_phone)
        .bind(&request.practitioner.practitioner_id)
        .bind(starts_at)
        .fetch_one(&self.pool)
        .await?;

        if duplicate {
            return Err(AppError::new(
                ErrorCode::DuplicateBooking,
                format!("caller already holds {} at {}", request.practitioner.full_name(), starts_at),
            ));
        }

        Ok(())
    }

    /// Locate the appointment a cancel request refers to
    async fn find_cancel_target(
        &self,
        clinic: &Clinic,
        request: &CancelBookingRequest,
    ) -> Result<Appointment> {
        if let Some(id) = request.appointment_id {
            let appointment = sqlx::query_as::<_, Appointment>(
                "SELECT * FROM appointments WHERE appointment_id = $1 AND clinic_id = $2",
            )
            .bind(id)
            .bind(clinic.clinic_id)
            .fetch_optional(&self.pool)
            .await?;

            return appointment.ok_or_else(|| {
                AppError::new(
                    ErrorCode::AppointmentNotFound,
                    format!("appointment {} not found", id),
                )
            });
        }

        // Near-term upcoming appointments for the caller, earliest first
        let candidates = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT a.* FROM appointments a
            JOIN patients p ON p.patient_id = a.patient_id
            WHERE a.clinic_id = $1
              AND p.phone_normalized = $2
              AND a.status IN ('booked', 'confirmed')
              AND a.starts_at > NOW() - INTERVAL '1 hour'
            ORDER BY a.starts_at
            "#,
        )
        .bind(clinic.clinic_id)
        .bind(&request.caller_phone)
        .fetch_all(&self.pool)
        .await?;

        if candidates.is_empty() {
            return Err(AppError::new(
                ErrorCode::AppointmentNotFound,
                "caller has no upcoming appointments",
            ));
        }

        match &request.description {
            Some(description) if candidates.len() > 1 => {
                self.disambiguate(candidates, description).await
            }
            _ => Ok(candidates.into_iter().next().expect("non-empty candidates")),
        }
    }

    /// Score candidates against the caller's description by practitioner
    /// name, service name, and weekday tokens; best score wins, earliest
    /// breaks ties (the list is already sorted by start)
    async fn disambiguate(
        &self,
        candidates: Vec<Appointment>,
        description: &str,
    ) -> Result<Appointment> {
        let tokens: Vec<String> = description
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();

        let mut best: Option<(usize, Appointment)> = None;

        for appointment in candidates {
            let names: Option<(String, String)> = sqlx::query_as(
                r#"
                SELECT LOWER(pr.first_name || ' ' || pr.last_name), LOWER(s.name)
                FROM appointments a
                JOIN practitioners pr ON pr.practitioner_id = a.practitioner_id
                JOIN services s ON s.service_id = a.service_id
                WHERE a.appointment_id = $1
                "#,
            )
            .bind(appointment.appointment_id)
            .fetch_optional(&self.pool)
            .await?;

            let weekday = appointment
                .starts_at
                .format("%A")
                .to_string()
                .to_lowercase();

            let mut score = 0;
            if let Some((practitioner_name, service_name)) = names {
                for token in &tokens {
                    if practitioner_name.contains(token.as_str()) {
                        score += 2;
                    }
                    if service_name.contains(token.as_str()) {
                        score += 2;
                    }
                    if weekday == *token {
                        score += 1;
                    }
                }
            }

            let replace = match &best {
                Some((best_score, _)) => score > *best_score,
                None => true,
            };
            if replace {
                best = Some((score, appointment));
            }
        }

        Ok(best.expect("candidates was non-empty").1)
    }
}
