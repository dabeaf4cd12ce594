/*!
 * Practitioner and Schedule Models
 *
 * Practitioners deliver services at one or more locations. Working hours
 * are stored locally per (practitioner, business, weekday); the PMS does
 * not expose them, and the availability engine relies on this table to
 * prune dates before any upstream call.
 */

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::ids::{BusinessId, ClinicId, PractitionerId};

/// Practitioner record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Practitioner {
    pub practitioner_id: PractitionerId,
    pub clinic_id: ClinicId,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub is_active: bool,
}

impl Practitioner {
    /// Full display name, with the title when present ("Dr Jane Doe")
    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => {
                format!("{} {} {}", title, self.first_name, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }

    /// Name without the title, the form used for fuzzy matching
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One weekly working-hours block for a practitioner at a location
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleBlock {
    pub practitioner_id: PractitionerId,
    pub business_id: BusinessId,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl ScheduleBlock {
    /// Whether this block covers the given clinic-local date
    pub fn covers(&self, date: NaiveDate) -> bool {
        if self.day_of_week != weekday_index(date.weekday()) {
            return false;
        }
        if let Some(from) = self.effective_from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = self.effective_to {
            if date > to {
                return false;
            }
        }
        true
    }
}

/// Monday-zero weekday index matching the schedules table
pub fn weekday_index(weekday: Weekday) -> i16 {
    weekday.num_days_from_monday() as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn block(day: i16, from: Option<NaiveDate>, to: Option<NaiveDate>) -> ScheduleBlock {
        ScheduleBlock {
            practitioner_id: PractitionerId::new("p1"),
            business_id: BusinessId::new("b1"),
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            effective_from: from,
            effective_to: to,
        }
    }

    #[test]
    fn test_display_name_with_title() {
        let p = Practitioner {
            practitioner_id: PractitionerId::new("p1"),
            clinic_id: ClinicId::new(),
            first_name: "Brendan".to_string(),
            last_name: "Smith".to_string(),
            title: Some("Dr".to_string()),
            is_active: true,
        };
        assert_eq!(p.display_name(), "Dr Brendan Smith");
        assert_eq!(p.full_name(), "Brendan Smith");
    }

    #[test]
    fn test_schedule_block_covers_weekday() {
        // 2025-07-16 is a Wednesday (index 2)
        let date = NaiveDate::from_ymd_opt(2025, 7, 16).unwrap();
        assert!(block(2, None, None).covers(date));
        assert!(!block(3, None, None).covers(date));
    }

    #[test]
    fn test_schedule_block_effective_range() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 16).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let before = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();

        assert!(block(2, Some(before), Some(after)).covers(date));
        assert!(!block(2, Some(after), None).covers(date));
        assert!(!block(2, None, Some(before)).covers(date));
    }
}
