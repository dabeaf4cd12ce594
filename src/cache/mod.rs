/*!
 * Tiered Cache Module
 *
 * Four persistent caches with independent TTL and invalidation policies:
 * availability, booking context, patient lookup, and service match. All
 * tiers are backed by the database so entries survive restarts and are
 * shared across workers. Components mutate cached state only through
 * this API.
 */

pub mod availability;
pub mod booking_context;
pub mod maintenance;
pub mod patient_lookup;
pub mod service_match;
pub mod stats;

pub use availability::AvailabilityCache;
pub use booking_context::BookingContextCache;
pub use maintenance::spawn_cache_maintenance;
pub use patient_lookup::PatientLookupCache;
pub use service_match::ServiceMatchCache;
pub use stats::CacheStats;

use sqlx::PgPool;

use crate::config::CacheConfig;

/// Handle bundling all cache tiers; cheap to clone
#[derive(Clone)]
pub struct TieredCache {
    pub availability: AvailabilityCache,
    pub booking_context: BookingContextCache,
    pub patient_lookup: PatientLookupCache,
    pub service_match: ServiceMatchCache,
}

impl TieredCache {
    pub fn new(pool: PgPool, config: &CacheConfig) -> Self {
        Self {
            availability: AvailabilityCache::new(pool.clone(), config.availability_ttl),
            booking_context: BookingContextCache::new(pool.clone(), config.booking_context_ttl),
            patient_lookup: PatientLookupCache::new(pool.clone(), config.patient_lookup_ttl),
            service_match: ServiceMatchCache::new(pool, config.service_match_ttl),
        }
    }
}
