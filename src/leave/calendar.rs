use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DateRange;

/// Worked weekdays and standard hours, either company-wide or per employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub break_minutes: u32,
}

impl WorkSchedule {
    pub fn works_on(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// Paid hours of a full working day, never negative.
    pub fn daily_hours(&self) -> f64 {
        let minutes = (self.end_time - self.start_time).num_minutes() - i64::from(self.break_minutes);
        minutes.max(0) as f64 / 60.0
    }

    pub fn has_working_days(&self) -> bool {
        self.monday || self.tuesday || self.wednesday || self.thursday || self.friday || self.saturday || self.sunday
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
    Employee,
    Company,
}

/// The employee's own schedule wins entirely over the company-wide one.
pub fn resolve_schedule(employee: Option<WorkSchedule>, company: &WorkSchedule) -> (WorkSchedule, ScheduleSource) {
    match employee {
        Some(schedule) => (schedule, ScheduleSource::Employee),
        None => (company.clone(), ScheduleSource::Company),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Uuid,
    pub date: NaiveDate,
    pub name: String,
    /// Recurs on the same month/day every year.
    pub is_recurring: bool,
}

impl Holiday {
    pub fn matches(&self, date: NaiveDate) -> bool {
        if self.is_recurring {
            self.date.month() == date.month() && self.date.day() == date.day()
        } else {
            self.date == date
        }
    }
}

/// Effective calendar of one employee: schedule plus holidays.
#[derive(Debug, Clone)]
pub struct WorkCalendar {
    schedule: WorkSchedule,
    fixed: HashSet<NaiveDate>,
    recurring: HashSet<(u32, u32)>,
}

impl WorkCalendar {
    pub fn new(schedule: WorkSchedule, holidays: &[Holiday]) -> Self {
        let mut fixed = HashSet::new();
        let mut recurring = HashSet::new();
        for h in holidays {
            if h.is_recurring {
                recurring.insert((h.date.month(), h.date.day()));
            } else {
                fixed.insert(h.date);
            }
        }
        Self { schedule, fixed, recurring }
    }

    pub fn schedule(&self) -> &WorkSchedule {
        &self.schedule
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.fixed.contains(&date) || self.recurring.contains(&(date.month(), date.day()))
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.schedule.works_on(date.weekday()) && !self.is_holiday(date)
    }

    pub fn working_days(&self, range: &DateRange) -> Vec<NaiveDate> {
        range.days().filter(|d| self.is_working_day(*d)).collect()
    }

    /// Holidays that fall on a scheduled weekday, i.e. the ones that are not counted.
    pub fn holidays_in(&self, range: &DateRange) -> Vec<NaiveDate> {
        range
            .days()
            .filter(|d| self.schedule.works_on(d.weekday()) && self.is_holiday(*d))
            .collect()
    }
}
