//! Vacation/permission usage and the per-year balance arithmetic.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;
use uuid::Uuid;

use super::calendar::WorkCalendar;
use super::{DateRange, LeaveKind, LeaveStatus, TimeWindow};

/// Amount consumed by one request inside one calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearUsage {
    pub year: i32,
    pub vacation_days: f64,
    pub permission_hours: f64,
}

impl YearUsage {
    fn zero(year: i32) -> Self {
        Self { year, vacation_days: 0.0, permission_hours: 0.0 }
    }

    pub fn is_zero(&self) -> bool {
        self.vacation_days == 0.0 && self.permission_hours == 0.0
    }
}

/// Walks the range day by day; every working day is charged to its own year.
/// Hourly permissions charge the window, full-day ones the schedule's daily hours.
pub fn usage_for(
    kind: LeaveKind,
    range: &DateRange,
    window: Option<&TimeWindow>,
    calendar: &WorkCalendar,
) -> Vec<YearUsage> {
    let mut per_year: BTreeMap<i32, YearUsage> = BTreeMap::new();
    for day in calendar.working_days(range) {
        let usage = per_year.entry(day.year()).or_insert_with(|| YearUsage::zero(day.year()));
        match kind {
            LeaveKind::Vacation => usage.vacation_days += 1.0,
            LeaveKind::Permission => {
                usage.permission_hours += window.map(|w| w.hours()).unwrap_or_else(|| calendar.schedule().daily_hours())
            }
        }
    }
    per_year
        .into_values()
        .map(|u| YearUsage { permission_hours: round2(u.permission_hours), ..u })
        .collect()
}

/// Direction in which a status change moves the used amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceAdjustment {
    Consume,
    Release,
}

impl BalanceAdjustment {
    /// `Consume` when entering `approved`, `Release` when leaving it, nothing otherwise.
    pub fn for_transition(old: LeaveStatus, new: LeaveStatus) -> Option<Self> {
        match (old == LeaveStatus::Approved, new == LeaveStatus::Approved) {
            (false, true) => Some(BalanceAdjustment::Consume),
            (true, false) => Some(BalanceAdjustment::Release),
            _ => None,
        }
    }

    fn sign(&self) -> f64 {
        match self {
            BalanceAdjustment::Consume => 1.0,
            BalanceAdjustment::Release => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveBalance {
    pub employee_id: Uuid,
    pub year: i32,
    pub vacation_days_total: f64,
    pub vacation_days_used: f64,
    pub permission_hours_total: f64,
    pub permission_hours_used: f64,
}

impl LeaveBalance {
    pub fn new(employee_id: Uuid, year: i32, vacation_days_total: f64, permission_hours_total: f64) -> Self {
        Self {
            employee_id,
            year,
            vacation_days_total,
            vacation_days_used: 0.0,
            permission_hours_total,
            permission_hours_used: 0.0,
        }
    }

    /// Used amounts never drop below zero.
    pub fn apply(&mut self, usage: &YearUsage, adjustment: BalanceAdjustment) {
        debug_assert_eq!(usage.year, self.year);
        let sign = adjustment.sign();
        self.vacation_days_used = round2((self.vacation_days_used + sign * usage.vacation_days).max(0.0));
        self.permission_hours_used = round2((self.permission_hours_used + sign * usage.permission_hours).max(0.0));
    }

    /// Replaces the used amounts with the sum of `usages` falling in this year.
    pub fn recompute<'a>(&mut self, usages: impl IntoIterator<Item = &'a YearUsage>) {
        let (days, hours) = usages
            .into_iter()
            .filter(|u| u.year == self.year)
            .fold((0.0, 0.0), |(d, h), u| (d + u.vacation_days, h + u.permission_hours));
        self.vacation_days_used = round2(days);
        self.permission_hours_used = round2(hours);
    }

    pub fn vacation_days_remaining(&self) -> f64 {
        round2(self.vacation_days_total - self.vacation_days_used)
    }

    pub fn permission_hours_remaining(&self) -> f64 {
        round2(self.permission_hours_total - self.permission_hours_used)
    }
}

/// Balance as returned by the API, with the derived remaining amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    #[serde(flatten)]
    pub balance: LeaveBalance,
    pub vacation_days_remaining: f64,
    pub permission_hours_remaining: f64,
}

impl From<LeaveBalance> for BalanceReport {
    fn from(balance: LeaveBalance) -> Self {
        Self {
            vacation_days_remaining: balance.vacation_days_remaining(),
            permission_hours_remaining: balance.permission_hours_remaining(),
            balance,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave::calendar::tests::office_week;
    use crate::leave::calendar::Holiday;
    use chrono::{NaiveDate, NaiveTime};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::new(d(a), d(b)).unwrap()
    }

    fn calendar_with(holidays: &[(&str, bool)]) -> WorkCalendar {
        let holidays: Vec<Holiday> = holidays
            .iter()
            .map(|(date, rec)| Holiday { id: Uuid::new_v4(), date: d(date), name: "h".into(), is_recurring: *rec })
            .collect();
        WorkCalendar::new(office_week(), &holidays)
    }

    #[test]
    fn vacation_counts_working_days_only() {
        let cal = calendar_with(&[("2025-08-15", true)]);
        // Mon 11 .. Sun 24 August: 10 weekdays, one of them Ferragosto
        let usage = usage_for(LeaveKind::Vacation, &range("2025-08-11", "2025-08-24"), None, &cal);
        assert_eq!(usage, vec![YearUsage { year: 2025, vacation_days: 9.0, permission_hours: 0.0 }]);
    }

    #[test]
    fn usage_is_split_across_years() {
        let cal = calendar_with(&[("2000-12-25", true), ("2000-12-26", true), ("2000-01-01", true)]);
        let usage = usage_for(LeaveKind::Vacation, &range("2025-12-22", "2026-01-09"), None, &cal);
        assert_eq!(usage.len(), 2);
        // 22,23,24,29,30,31 December
        assert_eq!(usage[0], YearUsage { year: 2025, vacation_days: 6.0, permission_hours: 0.0 });
        // 2,5,6,7,8,9 January
        assert_eq!(usage[1], YearUsage { year: 2026, vacation_days: 6.0, permission_hours: 0.0 });
    }

    #[test]
    fn permission_hours_from_window_or_schedule() {
        let cal = calendar_with(&[]);
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
        )
        .unwrap();
        let hourly = usage_for(LeaveKind::Permission, &range("2025-03-12", "2025-03-12"), Some(&window), &cal);
        assert_eq!(hourly[0].permission_hours, 2.5);

        let full = usage_for(LeaveKind::Permission, &range("2025-03-12", "2025-03-14"), None, &cal);
        assert_eq!(full[0].permission_hours, 24.0);
        assert_eq!(full[0].vacation_days, 0.0);
    }

    #[test]
    fn weekend_only_request_uses_nothing() {
        let usage = usage_for(LeaveKind::Vacation, &range("2025-03-15", "2025-03-16"), None, &calendar_with(&[]));
        assert!(usage.is_empty());
    }

    #[test]
    fn transitions_move_balance_in_and_out_of_approved() {
        use LeaveStatus::*;
        assert_eq!(BalanceAdjustment::for_transition(Pending, Approved), Some(BalanceAdjustment::Consume));
        assert_eq!(BalanceAdjustment::for_transition(Rejected, Approved), Some(BalanceAdjustment::Consume));
        assert_eq!(BalanceAdjustment::for_transition(Approved, Rejected), Some(BalanceAdjustment::Release));
        assert_eq!(BalanceAdjustment::for_transition(Approved, Pending), Some(BalanceAdjustment::Release));
        assert_eq!(BalanceAdjustment::for_transition(Pending, Rejected), None);
    }

    #[test]
    fn release_never_goes_negative() {
        let mut b = LeaveBalance::new(Uuid::new_v4(), 2025, 26.0, 32.0);
        let usage = YearUsage { year: 2025, vacation_days: 3.0, permission_hours: 2.5 };
        b.apply(&usage, BalanceAdjustment::Consume);
        assert_eq!(b.vacation_days_used, 3.0);
        assert_eq!(b.vacation_days_remaining(), 23.0);
        assert_eq!(b.permission_hours_remaining(), 29.5);

        b.apply(&usage, BalanceAdjustment::Release);
        b.apply(&usage, BalanceAdjustment::Release);
        assert_eq!(b.vacation_days_used, 0.0);
        assert_eq!(b.permission_hours_used, 0.0);
    }

    #[test]
    fn recompute_only_takes_own_year() {
        let mut b = LeaveBalance::new(Uuid::new_v4(), 2025, 26.0, 32.0);
        b.vacation_days_used = 40.0;
        let usages = [
            YearUsage { year: 2025, vacation_days: 5.0, permission_hours: 0.0 },
            YearUsage { year: 2026, vacation_days: 4.0, permission_hours: 0.0 },
            YearUsage { year: 2025, vacation_days: 0.0, permission_hours: 3.0 },
        ];
        b.recompute(&usages);
        assert_eq!(b.vacation_days_used, 5.0);
        assert_eq!(b.permission_hours_used, 3.0);
    }
}
