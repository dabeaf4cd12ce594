/*!
 * Catalog Service
 *
 * Clinic-scoped reads over the locally mirrored PMS catalog: clinics by
 * dialed number, locations, practitioners, services, their links, and the
 * schedule blocks the availability engine prunes with. Also owns the glue
 * between the catalog and the fuzzy matcher.
 */

use sqlx::PgPool;
use tracing::debug;

use crate::cache::ServiceMatchCache;
use crate::matcher::{self, Candidate, EntityKind, Resolution};
use crate::models::{
    BusinessId, Clinic, ClinicId, Location, Practitioner, PractitionerId, ScheduleBlock,
    Service, ServiceId,
};
use crate::utils::errors::{AppError, ErrorCode, Result};
use crate::utils::PhoneValidator;

/// Catalog reads and entity resolution
pub struct CatalogService {
    pool: PgPool,
}

impl CatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up the clinic a call landed on by its dialed number
    pub async fn clinic_by_dialed_number(&self, dialed_number: &str) -> Result<Clinic> {
        let normalized = PhoneValidator::normalize(dialed_number)
            .unwrap_or_else(|| dialed_number.to_string());

        let clinic = sqlx::query_as::<_, Clinic>(
            r#"
            SELECT * FROM clinics
            WHERE (dialed_number = $1 OR dialed_number = $2) AND is_active
            "#,
        )
        .bind(dialed_number)
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await?;

        clinic.ok_or_else(|| {
            AppError::new(
                ErrorCode::ClinicNotFound,
                format!("no active clinic for dialed number {}", dialed_number),
            )
        })
    }

    /// All locations of a clinic in deterministic order
    pub async fn locations(&self, clinic_id: ClinicId) -> Result<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE clinic_id = $1 ORDER BY sort_order, name",
        )
        .bind(clinic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(locations)
    }

    /// A location by id, verifying it belongs to the clinic
    pub async fn location(
        &self,
        clinic_id: ClinicId,
        business_id: &BusinessId,
    ) -> Result<Location> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE business_id = $1 AND clinic_id = $2",
        )
        .bind(business_id)
        .bind(clinic_id)
        .fetch_optional(&self.pool)
        .await?;

        location.ok_or_else(|| {
            AppError::new(
                ErrorCode::InvalidBusinessId,
                format!("location {} does not belong to clinic {}", business_id, clinic_id),
            )
        })
    }

    /// Active practitioners of a clinic
    pub async fn practitioners(&self, clinic_id: ClinicId) -> Result<Vec<Practitioner>> {
        let practitioners = sqlx::query_as::<_, Practitioner>(
            "SELECT * FROM practitioners WHERE clinic_id = $1 AND is_active ORDER BY last_name, first_name",
        )
        .bind(clinic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(practitioners)
    }

    /// Active practitioners assigned to a location
    pub async fn practitioners_at_location(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<Practitioner>> {
        let practitioners = sqlx::query_as::<_, Practitioner>(
            r#"
            SELECT p.* FROM practitioners p
            JOIN practitioner_locations pl ON pl.practitioner_id = p.practitioner_id
            WHERE pl.business_id = $1 AND p.is_active
            ORDER BY p.last_name, p.first_name
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(practitioners)
    }

    /// Whether a practitioner works at a location
    pub async fn practitioner_works_at(
        &self,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM practitioner_locations
                WHERE practitioner_id = $1 AND business_id = $2
            )
            "#,
        )
        .bind(practitioner_id)
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Active services a practitioner offers, ordered by name
    pub async fn services_for_practitioner(
        &self,
        practitioner_id: &PractitionerId,
    ) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT s.* FROM services s
            JOIN practitioner_services ps ON ps.service_id = s.service_id
            WHERE ps.practitioner_id = $1 AND s.is_active
            ORDER BY s.name
            "#,
        )
        .bind(practitioner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(services)
    }

    /// Locations a practitioner is assigned to
    pub async fn locations_for_practitioner(
        &self,
        practitioner_id: &PractitionerId,
    ) -> Result<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>(
            r#"
            SELECT l.* FROM locations l
            JOIN practitioner_locations pl ON pl.business_id = l.business_id
            WHERE pl.practitioner_id = $1
            ORDER BY l.sort_order, l.name
            "#,
        )
        .bind(practitioner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(locations)
    }

    /// Active practitioners offering a service, optionally scoped to a location
    pub async fn practitioners_for_service(
        &self,
        service_id: &ServiceId,
        business_id: Option<&BusinessId>,
    ) -> Result<Vec<Practitioner>> {
        let practitioners = match business_id {
            Some(business_id) => {
                sqlx::query_as::<_, Practitioner>(
                    r#"
                    SELECT p.* FROM practitioners p
                    JOIN practitioner_services ps ON ps.practitioner_id = p.practitioner_id
                    JOIN practitioner_locations pl ON pl.practitioner_id = p.practitioner_id
                    WHERE ps.service_id = $1 AND pl.business_id = $2 AND p.is_active
                    ORDER BY p.last_name, p.first_name
                    "#,
                )
                .bind(service_id)
                .bind(business_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Practitioner>(
                    r#"
                    SELECT p.* FROM practitioners p
                    JOIN practitioner_services ps ON ps.practitioner_id = p.practitioner_id
                    WHERE ps.service_id = $1 AND p.is_active
                    ORDER BY p.last_name, p.first_name
                    "#,
                )
                .bind(service_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(practitioners)
    }

    /// Schedule blocks for a (practitioner, business) pair
    pub async fn schedule_blocks(
        &self,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
    ) -> Result<Vec<ScheduleBlock>> {
        let blocks = sqlx::query_as::<_, ScheduleBlock>(
            r#"
            SELECT practitioner_id, business_id, day_of_week, start_time, end_time,
                   effective_from, effective_to
            FROM practitioner_schedules
            WHERE practitioner_id = $1 AND business_id = $2
            "#,
        )
        .bind(practitioner_id)
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(blocks)
    }

    /// Service by exact case-insensitive name; the strict path used by the
    /// booking coordinator so a fuzzy near-miss can never book the wrong
    /// service
    pub async fn service_by_exact_name(
        &self,
        clinic_id: ClinicId,
        name: &str,
    ) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            SELECT * FROM services
            WHERE clinic_id = $1 AND LOWER(name) = LOWER($2) AND is_active
            "#,
        )
        .bind(clinic_id)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(service)
    }

    /// A service by id
    pub async fn service(&self, service_id: &ServiceId) -> Result<Service> {
        let service = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE service_id = $1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        service.ok_or_else(|| {
            AppError::new(
                ErrorCode::ServiceNotFound,
                format!("service {} not found", service_id),
            )
        })
    }

    /// A practitioner by id
    pub async fn practitioner(&self, practitioner_id: &PractitionerId) -> Result<Practitioner> {
        let practitioner = sqlx::query_as::<_, Practitioner>(
            "SELECT * FROM practitioners WHERE practitioner_id = $1",
        )
        .bind(practitioner_id)
        .fetch_optional(&self.pool)
        .await?;

        practitioner.ok_or_else(|| {
            AppError::new(
                ErrorCode::PractitionerNotFound,
                format!("practitioner {} not found", practitioner_id),
            )
        })
    }

    // ==================== Fuzzy resolution glue ====================

    /// Resolve a spoken location reference against the clinic's locations
    pub async fn resolve_location(
        &self,
        clinic_id: ClinicId,
        query: &str,
    ) -> Result<(Resolution, Vec<Location>)> {
        let locations = self.locations(clinic_id).await?;
        let candidates: Vec<Candidate> = locations
            .iter()
            .enumerate()
            .map(|(ordinal, l)| Candidate {
                key: l.business_id.to_string(),
                name: l.name.clone(),
                aliases: l.aliases.clone(),
                is_primary: l.is_primary,
                ordinal,
            })
            .collect();

        Ok((matcher::resolve(EntityKind::Location, query, &candidates), locations))
    }

    /// Resolve a spoken practitioner name against the clinic's roster
    pub async fn resolve_practitioner(
        &self,
        clinic_id: ClinicId,
        query: &str,
    ) -> Result<Practitioner> {
        let practitioners = self.practitioners(clinic_id).await?;
        let candidates: Vec<Candidate> = practitioners
            .iter()
            .enumerate()
            .map(|(ordinal, p)| Candidate {
                key: p.practitioner_id.to_string(),
                name: p.full_name(),
                aliases: p
                    .title
                    .as_ref()
                    .map(|_| vec![p.display_name()])
                    .unwrap_or_default(),
                is_primary: false,
                ordinal,
            })
            .collect();

        match matcher::resolve(EntityKind::Practitioner, query, &candidates) {
            Resolution::Resolved(top) | Resolution::Confirm(top) => {
                let id = PractitionerId::new(top.key);
                Ok(practitioners
                    .into_iter()
                    .find(|p| p.practitioner_id == id)
                    .expect("ranked key came from this roster"))
            }
            Resolution::Clarify(options) => Err(AppError::new(
                ErrorCode::PractitionerClarificationNeeded,
                format!(
                    "'{}' could be any of: {}",
                    query,
                    options
                        .iter()
                        .map(|o| o.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
            Resolution::NoMatch => Err(AppError::new(
                ErrorCode::PractitionerNotFound,
                format!("no practitioner matching '{}'", query),
            )),
        }
    }

    /// Resolve a spoken service name fuzzily, consulting and feeding the
    /// service-match cache
    pub async fn resolve_service(
        &self,
        clinic_id: ClinicId,
        query: &str,
        cache: &ServiceMatchCache,
    ) -> Result<Service> {
        let normalized = query.trim().to_lowercase();

        if let Some(hit) = cache.get(clinic_id, &normalized).await {
            debug!(query = %normalized, service_id = %hit.service_id, "Service match cache hit");
            return self.service(&hit.service_id).await;
        }

        let services = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE clinic_id = $1 AND is_active ORDER BY name",
        )
        .bind(clinic_id)
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<Candidate> = services
            .iter()
            .enumerate()
            .map(|(ordinal, s)| Candidate {
                key: s.service_id.to_string(),
                name: s.name.clone(),
                aliases: Vec::new(),
                is_primary: false,
                ordinal,
            })
            .collect();

        match matcher::resolve(EntityKind::Service, query, &candidates) {
            Resolution::Resolved(top) | Resolution::Confirm(top) => {
                let id = ServiceId::new(top.key);
                cache.set(clinic_id, &normalized, &id, top.score).await;
                Ok(services
                    .into_iter()
                    .find(|s| s.service_id == id)
                    .expect("ranked key came from this catalog"))
            }
            Resolution::Clarify(options) if !options.is_empty() => {
                // Best-effort: take the top option rather than stall a
                // non-booking flow; booking uses the strict path instead
                let top = options.into_iter().next().expect("non-empty options");
                let id = ServiceId::new(top.key);
                cache.set(clinic_id, &normalized, &id, top.score).await;
                self.service(&id).await
            }
            _ => Err(AppError::new(
                ErrorCode::ServiceNotFound,
                format!("no service matching '{}'", query),
            )),
        }
    }
}
