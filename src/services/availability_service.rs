/*!
 * Availability Engine
 *
 * Answers the three availability questions: all slots on a date, the
 * earliest slot within a horizon, and which practitioners have any slot
 * on a date.
 *
 * Order of operations for every query: prune dates with the locally
 * stored schedules (the PMS does not expose working hours, so this is the
 * only thing keeping latency bounded), read the availability cache for
 * the surviving triples, fan out to the PMS for the misses under the
 * per-clinic concurrency cap, then merge and filter through the shared
 * slot predicate. Timed-out branches degrade to partial results rather
 * than failures.
 */

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::TieredCache;
use crate::models::{
    BusinessId, Clinic, Practitioner, PractitionerId, ScheduleBlock, Service, SlotKey,
};
use crate::pms::{PmsClient, MAX_AVAILABILITY_SPAN_DAYS};
use crate::services::catalog_service::CatalogService;
use crate::services::session_service::SlotFilter;
use crate::utils::errors::Result;

/// Concurrent PMS fetches dispatched per scan; the per-clinic semaphore
/// inside the client is the hard limit, this just bounds queued futures
const FANOUT_WIDTH: usize = 6;

/// Slots for one day, with the rationale needed to tell "truly empty"
/// from "everything was filtered"
#[derive(Debug, Clone, Default)]
pub struct DayAvailability {
    /// Offerable UTC slot starts, ascending
    pub slots: Vec<DateTime<Utc>>,
    /// Slots elided by the rejected/failed filter
    pub filtered: usize,
    /// True when a PMS branch timed out and the answer may be incomplete
    pub partial: bool,
}

/// The winning slot of a find-next-available scan
#[derive(Debug, Clone)]
pub struct FoundSlot {
    pub practitioner: Practitioner,
    pub business_id: BusinessId,
    pub starts_at: DateTime<Utc>,
}

/// Criteria for a find-next-available scan
pub struct NextAvailableQuery {
    /// Fixed practitioner; when absent the scan fans out across every
    /// practitioner offering the service
    pub practitioner: Option<Practitioner>,
    pub service: Service,
    /// Optional location scope
    pub business_id: Option<BusinessId>,
    /// Horizon in days, already clamped by the caller
    pub max_days: u32,
}

pub struct AvailabilityService {
    pool: PgPool,
    cache: TieredCache,
}

impl AvailabilityService {
    pub fn new(pool: PgPool, cache: TieredCache) -> Self {
        Self { pool, cache }
    }

    fn catalog(&self) -> CatalogService {
        CatalogService::new(self.pool.clone())
    }

    /// Question A: all offerable slots on `date` for a practitioner and
    /// service at a business.
    pub async fn single_day(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        practitioner: &Practitioner,
        service: &Service,
        business_id: &BusinessId,
        date: NaiveDate,
        filter: &SlotFilter,
    ) -> Result<DayAvailability> {
        let blocks = self
            .catalog()
            .schedule_blocks(&practitioner.practitioner_id, business_id)
            .await?;

        if !works_on(&blocks, date) {
            debug!(
                practitioner_id = %practitioner.practitioner_id,
                %date,
                "Schedule pruning: practitioner does not work this date, no PMS call"
            );
            return Ok(DayAvailability::default());
        }

        let slots = match self
            .cache
            .availability
            .get(&practitioner.practitioner_id, business_id, date)
            .await
        {
            Some(slots) => slots,
            None => {
                let fetched = pms
                    .get_available_times(
                        business_id.as_str(),
                        practitioner.practitioner_id.as_str(),
                        service.service_id.as_str(),
                        date,
                        date,
                    )
                    .await?;

                self.cache
                    .availability
                    .set(
                        clinic.clinic_id,
                        &practitioner.practitioner_id,
                        business_id,
                        date,
                        fetched.clone(),
                    )
                    .await;
                fetched
            }
        };

        Ok(self.apply_filter(
            slots,
            &practitioner.practitioner_id,
            business_id,
            filter,
            Utc::now(),
        ))
    }

    /// Question B: the earliest offerable slot within the horizon. Walks
    /// every candidate (practitioner, business) pair; dates the schedules
    /// rule out cost nothing, cache hits cost one read, and only the
    /// remainder reaches the PMS, in windows of at most seven days.
    pub async fn find_next_available(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        tz: Tz,
        query: NextAvailableQuery,
        filter: &SlotFilter,
        deadline: Instant,
    ) -> Result<Option<FoundSlot>> {
        if query.max_days == 0 {
            return Ok(None);
        }

        let catalog = self.catalog();
        let practitioners = match &query.practitioner {
            Some(p) => vec![p.clone()],
            None => {
                catalog
                    .practitioners_for_service(
                        &query.service.service_id,
                        query.business_id.as_ref(),
                    )
                    .await?
            }
        };

        let today = Utc::now().with_timezone(&tz).date_naive();
        let horizon_end = today + ChronoDuration::days(query.max_days as i64 - 1);

        // Resolve candidate (practitioner, business) pairs and their
        // schedule-pruned candidate dates
        let mut work_items: Vec<(Practitioner, BusinessId, Vec<NaiveDate>)> = Vec::new();
        for practitioner in practitioners {
            let businesses: Vec<BusinessId> = match &query.business_id {
                Some(business_id) => {
                    if catalog
                        .practitioner_works_at(&practitioner.practitioner_id, business_id)
                        .await?
                    {
                        vec![business_id.clone()]
                    } else {
                        Vec::new()
                    }
                }
                None => catalog
                    .locations_for_practitioner(&practitioner.practitioner_id)
                    .await?
                    .into_iter()
                    .map(|l| l.business_id)
                    .collect(),
            };

            for business_id in businesses {
                let blocks = catalog
                    .schedule_blocks(&practitioner.practitioner_id, &business_id)
                    .await?;
                let dates: Vec<NaiveDate> = date_range(today, horizon_end)
                    .filter(|d| works_on(&blocks, *d))
                    .collect();

                if !dates.is_empty() {
                    work_items.push((practitioner.clone(), business_id, dates));
                }
            }
        }

        if work_items.is_empty() {
            debug!("Find-next: schedule pruning left no candidate dates");
            return Ok(None);
        }

        // Walk the horizon one PMS-sized window at a time, earliest first.
        // Within a window every (practitioner, business) branch runs
        // concurrently; across windows the scan is lazy, so a hit in the
        // first week never spends requests on the second.
        let service_id = query.service.service_id.clone();
        let mut partial = false;
        let mut window_start = today;

        while window_start <= horizon_end {
            let window_end =
                (window_start + ChronoDuration::days(MAX_AVAILABILITY_SPAN_DAYS - 1)).min(horizon_end);

            let found = self
                .scan_window(
                    clinic,
                    pms,
                    tz,
                    &service_id,
                    &work_items,
                    window_start,
                    window_end,
                    filter,
                    deadline,
                    &mut partial,
                )
                .await;

            if found.is_some() {
                return Ok(found);
            }

            window_start = window_end + ChronoDuration::days(1);
        }

        if partial {
            debug!("Find-next returned empty with timed-out branches; result is partial");
        }

        Ok(None)
    }

    /// One window of the find-next scan: cache pass, concurrent PMS
    /// fetches for the misses, merge, filter, pick the earliest.
    async fn scan_window(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        tz: Tz,
        service_id: &crate::models::ServiceId,
        work_items: &[(Practitioner, BusinessId, Vec<NaiveDate>)],
        window_start: NaiveDate,
        window_end: NaiveDate,
        filter: &SlotFilter,
        deadline: Instant,
        partial: &mut bool,
    ) -> Option<FoundSlot> {
        let mut best: Option<FoundSlot> = None;
        let now = Utc::now();
        let mut fetches = Vec::new();

        for (practitioner, business_id, dates) in work_items {
            let window_dates: Vec<NaiveDate> = dates
                .iter()
                .copied()
                .filter(|d| *d >= window_start && *d <= window_end)
                .collect();

            if window_dates.is_empty() {
                continue;
            }

            let cached = self
                .cache
                .availability
                .get_range(
                    &practitioner.practitioner_id,
                    business_id,
                    window_dates[0],
                    window_dates[window_dates.len() - 1],
                )
                .await;

            let missing: Vec<NaiveDate> = window_dates
                .iter()
                .copied()
                .filter(|d| !cached.contains_key(d))
                .collect();

            for slots in cached.values() {
                consider(&mut best, practitioner, business_id, slots, filter, now);
            }

            for (from, to) in chunk_spans(&missing) {
                fetches.push((practitioner.clone(), business_id.clone(), from, to));
            }
        }

        let results: Vec<(Practitioner, BusinessId, NaiveDate, NaiveDate, Option<Vec<DateTime<Utc>>>)> =
            stream::iter(fetches.into_iter().map(|(practitioner, business_id, from, to)| {
                let pms = pms.clone();
                let service_id = service_id.clone();
                async move {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let fetched = tokio::time::timeout(
                        remaining,
                        pms.get_available_times(
                            business_id.as_str(),
                            practitioner.practitioner_id.as_str(),
                            service_id.as_str(),
                            from,
                            to,
                        ),
                    )
                    .await;

                    let slots = match fetched {
                        Ok(Ok(slots)) => Some(slots),
                        Ok(Err(e)) => {
                            warn!(
                                practitioner_id = %practitioner.practitioner_id,
                                %from, %to, error = %e,
                                "Find-next branch failed"
                            );
                            None
                        }
                        Err(_) => {
                            warn!(
                                practitioner_id = %practitioner.practitioner_id,
                                %from, %to,
                                "Find-next branch hit the scan deadline, reporting partial"
                            );
                            None
                        }
                    };
                    (practitioner, business_id, from, to, slots)
                }
            }))
            .buffered(FANOUT_WIDTH)
            .collect()
            .await;

        for (practitioner, business_id, from, to, slots) in results {
            let Some(slots) = slots else {
                *partial = true;
                continue;
            };

            // Write back every fetched date, empty ones included; a cached
            // empty day is as cheap to serve as a cached busy one
            let mut buckets = bucket_by_local_date(&slots, tz);
            for date in date_range(from, to) {
                let day_slots = buckets.remove(&date).unwrap_or_default();
                self.cache
                    .availability
                    .set(
                        clinic.clinic_id,
                        &practitioner.practitioner_id,
                        &business_id,
                        date,
                        day_slots,
                    )
                    .await;
            }

            consider(&mut best, &practitioner, &business_id, &slots, filter, now);
        }

        best
    }

    /// Question C: which practitioners at a business have any offerable
    /// slot on a date.
    pub async fn available_practitioners(
        &self,
        clinic: &Clinic,
        pms: &PmsClient,
        business_id: &BusinessId,
        date: NaiveDate,
        filter: &SlotFilter,
        deadline: Instant,
    ) -> Result<Vec<Practitioner>> {
        let catalog = self.catalog();
        let practitioners = catalog.practitioners_at_location(business_id).await?;

        let mut candidates = Vec::new();
        for practitioner in practitioners {
            let blocks = catalog
                .schedule_blocks(&practitioner.practitioner_id, business_id)
                .await?;
            if !works_on(&blocks, date) {
                continue;
            }
            let services = catalog
                .services_for_practitioner(&practitioner.practitioner_id)
                .await?;
            if let Some(service) = services.into_iter().next() {
                candidates.push((practitioner, service));
            }
        }

        let checks: Vec<(Practitioner, bool)> = stream::iter(candidates.into_iter().map(
            |(practitioner, service)| {
                let filter = filter.clone();
                async move {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let result = tokio::time::timeout(
                        remaining,
                        self.single_day(
                            clinic,
                            pms,
                            &practitioner,
                            &service,
                            business_id,
                            date,
                            &filter,
                        ),
                    )
                    .await;

                    let has_slots = match result {
                        Ok(Ok(day)) => !day.slots.is_empty(),
                        Ok(Err(e)) => {
                            warn!(
                                practitioner_id = %practitioner.practitioner_id,
                                error = %e,
                                "Availability check failed for practitioner"
                            );
                            false
                        }
                        Err(_) => false,
                    };
                    (practitioner, has_slots)
                }
            },
        ))
        .buffered(FANOUT_WIDTH)
        .collect()
        .await;

        Ok(checks
            .into_iter()
            .filter_map(|(p, available)| available.then_some(p))
            .collect())
    }

    /// Apply the shared predicate plus the not-in-the-past rule
    fn apply_filter(
        &self,
        slots: Vec<DateTime<Utc>>,
        practitioner_id: &PractitionerId,
        business_id: &BusinessId,
        filter: &SlotFilter,
        now: DateTime<Utc>,
    ) -> DayAvailability {
        let upcoming: Vec<DateTime<Utc>> =
            slots.into_iter().filter(|s| *s > now).collect();
        let before = upcoming.len();

        let allowed: Vec<DateTime<Utc>> = upcoming
            .into_iter()
            .filter(|s| {
                filter.allows(&SlotKey::new(
                    practitioner_id.clone(),
                    business_id.clone(),
                    *s,
                ))
            })
            .collect();

        let filtered = before - allowed.len();
        if filtered > 0 && allowed.is_empty() {
            debug!(
                practitioner_id = %practitioner_id,
                filtered,
                "All slots elided by rejected/failed filter, not truly empty"
            );
        }

        DayAvailability {
            slots: allowed,
            filtered,
            partial: false,
        }
    }
}

/// Whether any schedule block covers the date
fn works_on(blocks: &[ScheduleBlock], date: NaiveDate) -> bool {
    blocks.iter().any(|b| b.covers(date))
}

/// Inclusive date range iterator
fn date_range(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

/// Compare a triple's slots against the current best, keeping the
/// earliest allowed slot. Earlier submissions win ties, which keeps the
/// scan deterministic.
fn consider(
    best: &mut Option<FoundSlot>,
    practitioner: &Practitioner,
    business_id: &BusinessId,
    slots: &[DateTime<Utc>],
    filter: &SlotFilter,
    now: DateTime<Utc>,
) {
    for slot in slots {
        if *slot <= now {
            continue;
        }
        if !filter.allows(&SlotKey::new(
            practitioner.practitioner_id.clone(),
            business_id.clone(),
            *slot,
        )) {
            continue;
        }
        let is_better = match best {
            Some(current) => *slot < current.starts_at,
            None => true,
        };
        if is_better {
            *best = Some(FoundSlot {
                practitioner: practitioner.clone(),
                business_id: business_id.clone(),
                starts_at: *slot,
            });
        }
    }
}

/// Pack sorted missing dates into contiguous windows no wider than the
/// PMS limit. A 14-day horizon therefore costs at most two calls per
/// (practitioner, business) pair.
fn chunk_spans(dates: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut spans = Vec::new();
    let mut iter = dates.iter().copied();

    let Some(mut start) = iter.next() else {
        return spans;
    };
    let mut end = start;

    for date in iter {
        if (date - start).num_days() < MAX_AVAILABILITY_SPAN_DAYS {
            end = date;
        } else {
            spans.push((start, end));
            start = date;
            end = date;
        }
    }
    spans.push((start, end));
    spans
}

/// Bucket UTC slots by their clinic-local date
fn bucket_by_local_date(
    slots: &[DateTime<Utc>],
    tz: Tz,
) -> HashMap<NaiveDate, Vec<DateTime<Utc>>> {
    let mut buckets: HashMap<NaiveDate, Vec<DateTime<Utc>>> = HashMap::new();
    for slot in slots {
        buckets
            .entry(slot.with_timezone(&tz).date_naive())
            .or_default()
            .push(*slot);
    }
    for day in buckets.values_mut() {
        day.sort_unstable();
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Australia::Sydney;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_chunk_spans_within_limit() {
        // Six consecutive days fit one span
        let dates: Vec<NaiveDate> = (16..22).map(|d| date(2025, 7, d)).collect();
        assert_eq!(chunk_spans(&dates), vec![(date(2025, 7, 16), date(2025, 7, 21))]);
    }

    #[test]
    fn test_chunk_spans_splits_fourteen_days() {
        let dates: Vec<NaiveDate> = (0..14)
            .map(|i| date(2025, 7, 16) + ChronoDuration::days(i))
            .collect();
        let spans = chunk_spans(&dates);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], (date(2025, 7, 16), date(2025, 7, 22)));
        assert_eq!(spans[1], (date(2025, 7, 23), date(2025, 7, 29)));
    }

    #[test]
    fn test_chunk_spans_sparse_dates() {
        // Pruned gaps collapse into a single window when close enough
        let dates = vec![date(2025, 7, 16), date(2025, 7, 18), date(2025, 7, 25)];
        let spans = chunk_spans(&dates);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], (date(2025, 7, 16), date(2025, 7, 18)));
        assert_eq!(spans[1], (date(2025, 7, 25), date(2025, 7, 25)));
    }

    #[test]
    fn test_chunk_spans_empty() {
        assert!(chunk_spans(&[]).is_empty());
    }

    #[test]
    fn test_bucket_by_local_date_crosses_midnight() {
        // 23:30 UTC on the 15th is 09:30 on the 16th in Sydney (UTC+10)
        let slots = vec![
            Utc.with_ymd_and_hms(2025, 7, 15, 23, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 16, 1, 0, 0).unwrap(),
        ];
        let buckets = bucket_by_local_date(&slots, Sydney);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&date(2025, 7, 16)].len(), 2);
    }

    #[test]
    fn test_consider_keeps_earliest() {
        let practitioner = Practitioner {
            practitioner_id: PractitionerId::new("p1"),
            clinic_id: crate::models::ClinicId::new(),
            first_name: "Brendan".into(),
            last_name: "Smith".into(),
            title: None,
            is_active: true,
        };
        let business = BusinessId::new("b1");
        let now = Utc.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).unwrap();
        let filter = SlotFilter::default();

        let mut best = None;
        consider(
            &mut best,
            &practitioner,
            &business,
            &[
                Utc.with_ymd_and_hms(2025, 7, 16, 2, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap(),
            ],
            &filter,
            now,
        );

        assert_eq!(
            best.unwrap().starts_at,
            Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_consider_respects_filter_and_past() {
        let practitioner = Practitioner {
            practitioner_id: PractitionerId::new("p1"),
            clinic_id: crate::models::ClinicId::new(),
            first_name: "Brendan".into(),
            last_name: "Smith".into(),
            title: None,
            is_active: true,
        };
        let business = BusinessId::new("b1");
        let now = Utc.with_ymd_and_hms(2025, 7, 16, 1, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap();
        let rejected = Utc.with_ymd_and_hms(2025, 7, 16, 2, 0, 0).unwrap();

        let filter = SlotFilter::from_keys([SlotKey::new(
            PractitionerId::new("p1"),
            BusinessId::new("b1"),
            rejected,
        )]);

        let mut best = None;
        consider(&mut best, &practitioner, &business, &[past, rejected], &filter, now);
        assert!(best.is_none());
    }
}
