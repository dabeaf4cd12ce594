/*!
 * Patient Service
 *
 * Resolves the caller to a PMS patient: lookup cache first, then a PMS
 * phone search, then patient creation. The local patient row is kept in
 * step so later calls and cancel-by-phone searches stay cheap.
 */

use sqlx::PgPool;
use tracing::{debug, info};

use crate::cache::PatientLookupCache;
use crate::models::{Clinic, Patient};
use crate::pms::types::CreatePmsPatient;
use crate::pms::PmsClient;
use crate::utils::errors::Result;
use crate::utils::PhoneValidator;

pub struct PatientService {
    pool: PgPool,
}

impl PatientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the caller to a patient, creating one in the PMS when this
    /// is their first booking. Returns the local row with its PMS id set.
    pub async fn resolve_or_create(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        cache: &PatientLookupCache,
        phone_normalized: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Patient> {
        // Cache first: one read instead of a PMS round trip
        if let Some(entry) = cache.get(phone_normalized, clinic.clinic_id).await {
            debug!(
                phone = %PhoneValidator::mask(phone_normalized),
                "Patient resolved from lookup cache"
            );
            return self
                .upsert_local(clinic, phone_normalized, first_name, last_name, &entry.pms_patient_id)
                .await;
        }

        // Authoritative PMS search by phone
        let found = pms.search_patients(phone_normalized).await?;
        if let Some(patient) = found.into_iter().next() {
            debug!(
                phone = %PhoneValidator::mask(phone_normalized),
                pms_patient_id = %patient.id,
                "Patient found in PMS"
            );
            cache
                .set(
                    phone_normalized,
                    clinic.clinic_id,
                    &patient.id,
                    serde_json::json!({
                        "first_name": patient.first_name,
                        "last_name": patient.last_name,
                        "email": patient.email,
                    }),
                )
                .await;
            return self
                .upsert_local(clinic, phone_normalized, first_name, last_name, &patient.id)
                .await;
        }

        // First contact: create the patient upstream
        let created = pms
            .create_patient(&CreatePmsPatient {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                phone_number: phone_normalized.to_string(),
            })
            .await?;

        info!(
            phone = %PhoneValidator::mask(phone_normalized),
            pms_patient_id = %created.id,
            "Created new PMS patient"
        );

        cache
            .set(
                phone_normalized,
                clinic.clinic_id,
                &created.id,
                serde_json::json!({
                    "first_name": first_name,
                    "last_name": last_name,
                }),
            )
            .await;

        self.upsert_local(clinic, phone_normalized, first_name, last_name, &created.id)
            .await
    }

    /// Keep the local patient row in step with the PMS record
    async fn upsert_local(
        &self,
        clinic: &Clinic,
        phone_normalized: &str,
        first_name: &str,
        last_name: &str,
        pms_patient_id: &str,
    ) -> Result<Patient> {
        let patient = sqlx::query_as::<_, Patient>(
            r#"
            INSERT INTO patients
                (clinic_id, phone_normalized, first_name, last_name, pms_patient_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (clinic_id, phone_normalized)
            DO UPDATE SET
                pms_patient_id = EXCLUDED.pms_patient_id,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(clinic.clinic_id)
        .bind(phone_normalized)
        .bind(first_name)
        .bind(last_name)
        .bind(pms_patient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(patient)
    }
}
