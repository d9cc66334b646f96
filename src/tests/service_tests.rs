#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Datelike, NaiveTime, Utc};
    use sqlx::SqlitePool;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::super::{d, memory_pool};
    use crate::config::AppConfig;
    use crate::db;
    use crate::leave::service::{NewBusinessTrip, NewEmployee, NewLeaveRequest, NewSickLeave};
    use crate::leave::store::AttendanceUpsert;
    use crate::leave::{
        run_reconciler, ConflictKind, DateRange, EntryKind, LeaveError, LeaveKind, LeaveService, LeaveStatus,
        ScheduleSource, Severity, TimeWindow, WorkSchedule,
    };
    use crate::metrics::Metrics;
    use crate::notify::{BroadcastNotifier, LeaveEvent};
    use crate::types::EmployeeRole;

    struct Fixture {
        service: LeaveService,
        pool: SqlitePool,
        events: Arc<BroadcastNotifier>,
        metrics: Metrics,
    }

    async fn setup() -> Fixture {
        fixture(memory_pool().await)
    }

    /// File-backed database with several connections, like production.
    async fn setup_on_disk(dir: &tempfile::TempDir) -> Fixture {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("presenze.db").display());
        let pool = db::connect_pool(&url, 4).await.unwrap();
        db::init_db(&pool).await.unwrap();
        fixture(pool)
    }

    fn fixture(pool: SqlitePool) -> Fixture {
        let cfg = AppConfig::default();
        let events = Arc::new(BroadcastNotifier::new());
        let metrics = Metrics::new();
        let service = LeaveService::new(
            pool.clone(),
            cfg.leave_policy.clone(),
            cfg.work_schedule.clone(),
            events.clone(),
            metrics.clone(),
        );
        Fixture { service, pool, events, metrics }
    }

    async fn hire(service: &LeaveService, email: &str) -> Uuid {
        service
            .create_employee(NewEmployee {
                first_name: "Giulia".into(),
                last_name: "Bianchi".into(),
                email: email.into(),
                role: EmployeeRole::Employee,
            })
            .await
            .unwrap()
            .id
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(d(from), d(to)).unwrap()
    }

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn vacation(employee_id: Uuid, from: &str, to: &str) -> NewLeaveRequest {
        NewLeaveRequest { employee_id, kind: LeaveKind::Vacation, range: range(from, to), window: None, note: None }
    }

    fn permission(employee_id: Uuid, day: &str, from: u32, to: u32) -> NewLeaveRequest {
        NewLeaveRequest {
            employee_id,
            kind: LeaveKind::Permission,
            range: range(day, day),
            window: Some(TimeWindow::new(t(from), t(to)).unwrap()),
            note: None,
        }
    }

    async fn approved(service: &LeaveService, req: NewLeaveRequest) -> Uuid {
        let (created, _) = service.create_leave_request(req).await.unwrap();
        service.change_leave_status(created.id, LeaveStatus::Approved, None).await.unwrap();
        created.id
    }

    #[tokio::test]
    async fn approval_consumes_and_rejection_restores_vacation_days() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;

        // Monday to Sunday: five working days
        let (req, report) = fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-09")).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(req.status, LeaveStatus::Pending);

        fx.service.change_leave_status(req.id, LeaveStatus::Approved, Some("ok")).await.unwrap();
        let balance = fx.service.balance(emp, 2025).await.unwrap();
        assert_eq!(balance.balance.vacation_days_used, 5.0);
        assert_eq!(balance.vacation_days_remaining, 21.0);

        let (rejected, _) = fx.service.change_leave_status(req.id, LeaveStatus::Rejected, None).await.unwrap();
        assert_eq!(rejected.status, LeaveStatus::Rejected);
        let balance = fx.service.balance(emp, 2025).await.unwrap();
        assert_eq!(balance.balance.vacation_days_used, 0.0);
        assert_eq!(balance.vacation_days_remaining, 26.0);

        let snap = fx.metrics.get_snapshot();
        assert_eq!(snap.requests_created, 1);
        assert_eq!(snap.requests_approved, 1);
        assert_eq!(snap.requests_rejected, 1);
        assert_eq!(snap.balance_adjustments, 2);
    }

    #[tokio::test]
    async fn approved_vacation_blocks_overlapping_request() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let first = approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-07")).await;

        let err = fx.service.create_leave_request(vacation(emp, "2025-03-06", "2025-03-10")).await.unwrap_err();
        match err {
            LeaveError::Conflicts(report) => {
                assert!(report.has_critical());
                let c = &report.conflicts[0];
                assert_eq!(c.severity, Severity::Critical);
                assert_eq!(c.kind, ConflictKind::Vacation);
                assert_eq!(c.source_id, Some(first));
                assert_eq!(c.range, range("2025-03-06", "2025-03-07"));
            }
            other => panic!("expected conflicts, got {:?}", other),
        }
        assert_eq!(fx.metrics.get_snapshot().critical_conflicts, 1);

        // nothing was written
        let all = fx.service.leave_requests(&Default::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn pending_overlap_is_only_a_warning() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-07")).await.unwrap();

        let (_, report) = fx.service.create_leave_request(vacation(emp, "2025-03-05", "2025-03-05")).await.unwrap();
        assert!(!report.has_critical());
        assert_eq!(report.max_severity(), Some(Severity::Warning));
    }

    #[tokio::test]
    async fn approval_revalidates_against_newly_approved_entries() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let (a, _) = fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-07")).await.unwrap();
        let (b, _) = fx.service.create_leave_request(vacation(emp, "2025-03-07", "2025-03-11")).await.unwrap();

        fx.service.change_leave_status(a.id, LeaveStatus::Approved, None).await.unwrap();
        let err = fx.service.change_leave_status(b.id, LeaveStatus::Approved, None).await.unwrap_err();
        assert!(matches!(err, LeaveError::Conflicts(_)));

        // the refused approval left status and balance untouched
        assert_eq!(fx.service.leave_request(b.id).await.unwrap().status, LeaveStatus::Pending);
        assert_eq!(fx.service.balance(emp, 2025).await.unwrap().balance.vacation_days_used, 5.0);
    }

    #[tokio::test]
    async fn hourly_permissions_conflict_only_when_windows_overlap() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        approved(&fx.service, permission(emp, "2025-03-04", 9, 11)).await;

        let (afternoon, report) = fx.service.create_leave_request(permission(emp, "2025-03-04", 14, 16)).await.unwrap();
        assert_eq!(report.max_severity(), Some(Severity::Warning));
        fx.service.change_leave_status(afternoon.id, LeaveStatus::Approved, None).await.unwrap();

        let balance = fx.service.balance(emp, 2025).await.unwrap();
        assert_eq!(balance.balance.permission_hours_used, 4.0);
        assert_eq!(balance.permission_hours_remaining, 28.0);

        let err = fx.service.create_leave_request(permission(emp, "2025-03-04", 10, 12)).await.unwrap_err();
        assert!(matches!(err, LeaveError::Conflicts(_)));
    }

    #[tokio::test]
    async fn full_day_permission_charges_schedule_hours() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let req = NewLeaveRequest {
            employee_id: emp,
            kind: LeaveKind::Permission,
            range: range("2025-03-05", "2025-03-05"),
            window: None,
            note: None,
        };
        approved(&fx.service, req).await;

        // 09:00-18:00 minus a 60 minute break
        assert_eq!(fx.service.balance(emp, 2025).await.unwrap().balance.permission_hours_used, 8.0);
    }

    #[tokio::test]
    async fn cross_year_vacation_splits_usage_and_skips_holidays() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        fx.service.create_holiday(d("2020-01-01"), "Capodanno".into(), true).await.unwrap();

        let (req, report) = fx.service.create_leave_request(vacation(emp, "2025-12-29", "2026-01-02")).await.unwrap();
        let holiday = report.conflicts.iter().find(|c| c.kind == ConflictKind::Holiday).unwrap();
        assert_eq!(holiday.severity, Severity::Info);
        assert_eq!(holiday.range, range("2026-01-01", "2026-01-01"));

        fx.service.change_leave_status(req.id, LeaveStatus::Approved, None).await.unwrap();
        assert_eq!(fx.service.balance(emp, 2025).await.unwrap().balance.vacation_days_used, 3.0);
        assert_eq!(fx.service.balance(emp, 2026).await.unwrap().balance.vacation_days_used, 1.0);
        assert_eq!(fx.metrics.get_snapshot().balance_adjustments, 2);

        let years: Vec<i32> = fx.service.balances(emp).await.unwrap().iter().map(|b| b.balance.year).collect();
        assert_eq!(years, vec![2026, 2025]);
    }

    #[tokio::test]
    async fn weekend_only_request_is_refused() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let err = fx.service.create_leave_request(vacation(emp, "2025-03-08", "2025-03-09")).await.unwrap_err();
        assert!(matches!(err, LeaveError::NoWorkingDays(_)));
    }

    #[tokio::test]
    async fn same_status_is_rejected() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let (req, _) = fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-03")).await.unwrap();
        let err = fx.service.change_leave_status(req.id, LeaveStatus::Pending, None).await.unwrap_err();
        assert!(matches!(err, LeaveError::UnchangedStatus(LeaveStatus::Pending)));
    }

    #[tokio::test]
    async fn deleting_approved_request_releases_balance() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let id = approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-04")).await;
        assert_eq!(fx.service.balance(emp, 2025).await.unwrap().balance.vacation_days_used, 2.0);

        fx.service.delete_leave_request(id).await.unwrap();
        assert_eq!(fx.service.balance(emp, 2025).await.unwrap().balance.vacation_days_used, 0.0);
        assert!(matches!(fx.service.leave_request(id).await, Err(LeaveError::NotFound { .. })));
    }

    #[tokio::test]
    async fn approved_trip_generates_and_rejection_removes_attendance() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let (trip, _) = fx
            .service
            .create_trip(NewBusinessTrip {
                employee_id: emp,
                destination: "Milano".into(),
                purpose: None,
                range: range("2025-03-10", "2025-03-16"),
            })
            .await
            .unwrap();
        let week = range("2025-03-10", "2025-03-16");
        assert!(fx.service.attendance(emp, week).await.unwrap().is_empty());

        fx.service.change_trip_status(trip.id, LeaveStatus::Approved).await.unwrap();
        let rows = fx.service.attendance(emp, week).await.unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.is_business_trip && r.business_trip_id == Some(trip.id)));

        // a check-in during the trip is allowed and keeps the flag
        let (row, report) = fx
            .service
            .upsert_attendance(AttendanceUpsert {
                employee_id: emp,
                date: d("2025-03-11"),
                check_in_time: Some(t(9)),
                check_out_time: Some(t(17)),
                note: None,
            })
            .await
            .unwrap();
        assert!(row.is_business_trip);
        assert_eq!(report.max_severity(), Some(Severity::Info));

        fx.service.change_trip_status(trip.id, LeaveStatus::Rejected).await.unwrap();
        let rows = fx.service.attendance(emp, week).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_business_trip);
        assert_eq!(rows[0].check_in_time, Some(t(9)));
        assert_eq!(fx.metrics.get_snapshot().trips_approved, 1);
    }

    #[tokio::test]
    async fn trip_is_blocked_by_approved_vacation() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-07")).await;

        let err = fx
            .service
            .create_trip(NewBusinessTrip {
                employee_id: emp,
                destination: "Roma".into(),
                purpose: Some("fiera".into()),
                range: range("2025-03-07", "2025-03-08"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::Conflicts(_)));
    }

    #[tokio::test]
    async fn sick_leave_flags_attendance_and_blocks_vacation() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let (sick, _) = fx
            .service
            .record_sick_leave(NewSickLeave {
                employee_id: emp,
                range: range("2025-03-17", "2025-03-18"),
                certificate_code: Some("INPS-123".into()),
                note: None,
            })
            .await
            .unwrap();
        let rows = fx.service.attendance(emp, range("2025-03-17", "2025-03-18")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_sick_leave && r.sick_leave_id == Some(sick.id)));

        let err = fx.service.create_leave_request(vacation(emp, "2025-03-18", "2025-03-18")).await.unwrap_err();
        assert!(matches!(err, LeaveError::Conflicts(_)));

        fx.service.delete_sick_leave(sick.id).await.unwrap();
        assert!(fx.service.attendance(emp, range("2025-03-17", "2025-03-18")).await.unwrap().is_empty());
        fx.service.create_leave_request(vacation(emp, "2025-03-18", "2025-03-18")).await.unwrap();
    }

    #[tokio::test]
    async fn check_in_conflicts_with_vacation_both_ways() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        fx.service
            .upsert_attendance(AttendanceUpsert {
                employee_id: emp,
                date: d("2025-03-20"),
                check_in_time: Some(t(9)),
                check_out_time: None,
                note: None,
            })
            .await
            .unwrap();
        let err = fx.service.create_leave_request(vacation(emp, "2025-03-20", "2025-03-20")).await.unwrap_err();
        assert!(matches!(err, LeaveError::Conflicts(_)));

        approved(&fx.service, vacation(emp, "2025-03-24", "2025-03-24")).await;
        let err = fx
            .service
            .upsert_attendance(AttendanceUpsert {
                employee_id: emp,
                date: d("2025-03-24"),
                check_in_time: Some(t(9)),
                check_out_time: None,
                note: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::Conflicts(_)));
    }

    #[tokio::test]
    async fn check_out_must_follow_check_in() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let err = fx
            .service
            .upsert_attendance(AttendanceUpsert {
                employee_id: emp,
                date: d("2025-03-20"),
                check_in_time: Some(t(17)),
                check_out_time: Some(t(9)),
                note: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::InvalidTimeWindow(_)));
    }

    #[tokio::test]
    async fn recalculation_repairs_drift() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-07")).await;

        sqlx::query("UPDATE leave_balances SET vacation_days_used = 42 WHERE employee_id = ?1")
            .bind(emp.to_string())
            .execute(&fx.pool)
            .await
            .unwrap();

        let repaired = fx.service.recalculate_balance(emp, 2025).await.unwrap();
        assert_eq!(repaired.balance.vacation_days_used, 5.0);
        assert_eq!(fx.service.recalculate_all(2025).await.unwrap(), 1);
        assert_eq!(fx.metrics.get_snapshot().recalculations, 2);
    }

    #[tokio::test]
    async fn entitlements_can_be_overridden_per_year() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-03")).await;

        let report = fx.service.set_entitlements(emp, 2025, 30.0, 40.0).await.unwrap();
        assert_eq!(report.balance.vacation_days_total, 30.0);
        assert_eq!(report.balance.vacation_days_used, 1.0);
        assert_eq!(report.vacation_days_remaining, 29.0);
        assert_eq!(report.permission_hours_remaining, 40.0);
    }

    #[tokio::test]
    async fn employee_schedule_overrides_company_and_invalidates_cache() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let (_, source) = fx.service.employee_work_schedule(emp).await.unwrap();
        assert_eq!(source, ScheduleSource::Company);

        let part_time = WorkSchedule {
            monday: true,
            tuesday: true,
            wednesday: false,
            thursday: false,
            friday: false,
            saturday: false,
            sunday: false,
            start_time: t(9),
            end_time: t(13),
            break_minutes: 0,
        };
        fx.service.set_employee_work_schedule(emp, &part_time).await.unwrap();
        let (schedule, source) = fx.service.employee_work_schedule(emp).await.unwrap();
        assert_eq!(source, ScheduleSource::Employee);
        assert_eq!(schedule, part_time);

        approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-09")).await;
        assert_eq!(fx.service.balance(emp, 2025).await.unwrap().balance.vacation_days_used, 2.0);

        assert!(fx.service.clear_employee_work_schedule(emp).await.unwrap());
        assert!(!fx.service.clear_employee_work_schedule(emp).await.unwrap());
        let (_, source) = fx.service.employee_work_schedule(emp).await.unwrap();
        assert_eq!(source, ScheduleSource::Company);
    }

    #[tokio::test]
    async fn conflict_dates_lists_blocked_days() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        approved(&fx.service, vacation(emp, "2025-03-03", "2025-03-05")).await;

        let dates = fx.service.conflict_dates(emp, EntryKind::Vacation, range("2025-03-01", "2025-03-10")).await.unwrap();
        assert_eq!(dates, vec![d("2025-03-03"), d("2025-03-04"), d("2025-03-05")]);

        let err = fx
            .service
            .conflict_dates(emp, EntryKind::Vacation, range("2025-01-01", "2026-12-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::WindowTooLarge { max: 366, .. }));
    }

    #[tokio::test]
    async fn unknown_employee_is_not_found() {
        let fx = setup().await;
        let err = fx.service.create_leave_request(vacation(Uuid::new_v4(), "2025-03-03", "2025-03-03")).await.unwrap_err();
        assert!(matches!(err, LeaveError::NotFound { entity: "employee", .. }));
    }

    #[tokio::test]
    async fn events_are_published_after_commit() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let mut rx = fx.events.subscribe();

        let (req, _) = fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-03")).await.unwrap();
        match rx.try_recv().unwrap() {
            LeaveEvent::RequestCreated { id, employee_id, kind } => {
                assert_eq!(id, req.id);
                assert_eq!(employee_id, emp);
                assert_eq!(kind, LeaveKind::Vacation);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // refused writes publish nothing
        fx.service.change_leave_status(req.id, LeaveStatus::Approved, None).await.unwrap();
        let _ = rx.try_recv().unwrap();
        assert!(fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-03")).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn check_out_requires_check_in() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let err = fx
            .service
            .upsert_attendance(AttendanceUpsert {
                employee_id: emp,
                date: d("2025-03-20"),
                check_in_time: None,
                check_out_time: Some(t(17)),
                note: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::InvalidTimeWindow(_)));
        assert!(fx.service.attendance(emp, range("2025-03-20", "2025-03-20")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflict_dates_window_is_bounded() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;

        // 2024 is a leap year: exactly 366 days
        let full_year = fx.service.conflict_dates(emp, EntryKind::Vacation, range("2024-01-01", "2024-12-31")).await;
        assert!(full_year.unwrap().is_empty());

        let err = fx
            .service
            .conflict_dates(emp, EntryKind::Vacation, range("2024-01-01", "2025-01-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::WindowTooLarge { days: 367, max: 366 }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_for_different_employees_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let fx = setup_on_disk(&dir).await;

        for round in 0..10 {
            let a = hire(&fx.service, &format!("a{}@example.com", round)).await;
            let b = hire(&fx.service, &format!("b{}@example.com", round)).await;
            let (ra, _) = fx.service.create_leave_request(vacation(a, "2025-03-03", "2025-03-07")).await.unwrap();
            let (rb, _) = fx.service.create_leave_request(vacation(b, "2025-03-03", "2025-03-07")).await.unwrap();

            let (first, second) = tokio::join!(
                fx.service.change_leave_status(ra.id, LeaveStatus::Approved, None),
                fx.service.change_leave_status(rb.id, LeaveStatus::Approved, None),
            );
            assert!(first.is_ok(), "round {}: {:?}", round, first.err());
            assert!(second.is_ok(), "round {}: {:?}", round, second.err());
            assert_eq!(fx.service.balance(a, 2025).await.unwrap().balance.vacation_days_used, 5.0);
            assert_eq!(fx.service.balance(b, 2025).await.unwrap().balance.vacation_days_used, 5.0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_overlapping_approvals_let_exactly_one_through() {
        let dir = tempfile::tempdir().unwrap();
        let fx = setup_on_disk(&dir).await;

        for round in 0..10 {
            let emp = hire(&fx.service, &format!("c{}@example.com", round)).await;
            let (r1, _) = fx.service.create_leave_request(vacation(emp, "2025-03-03", "2025-03-07")).await.unwrap();
            let (r2, _) = fx.service.create_leave_request(vacation(emp, "2025-03-05", "2025-03-11")).await.unwrap();

            let (first, second) = tokio::join!(
                fx.service.change_leave_status(r1.id, LeaveStatus::Approved, None),
                fx.service.change_leave_status(r2.id, LeaveStatus::Approved, None),
            );
            let outcomes = [first, second];
            assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1, "round {}", round);
            for outcome in &outcomes {
                if let Err(err) = outcome {
                    assert!(matches!(err, LeaveError::Conflicts(_)), "round {}: {:?}", round, err);
                }
            }
        }
    }

    #[tokio::test]
    async fn reconciler_repairs_drift_periodically_and_stops_on_shutdown() {
        let fx = setup().await;
        let emp = hire(&fx.service, "a@example.com").await;
        let year = Utc::now().year();
        let (from, to) = (format!("{}-03-02", year), format!("{}-03-08", year));
        // any seven consecutive days hold five working days
        approved(&fx.service, vacation(emp, &from, &to)).await;

        sqlx::query("UPDATE leave_balances SET vacation_days_used = 42 WHERE employee_id = ?1")
            .bind(emp.to_string())
            .execute(&fx.pool)
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_reconciler(fx.service.clone(), Duration::from_millis(20), shutdown.clone()));

        let mut used = 42.0;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            used = fx.service.balance(emp, year).await.unwrap().balance.vacation_days_used;
            if used == 5.0 {
                break;
            }
        }
        assert_eq!(used, 5.0);
        assert!(fx.metrics.get_snapshot().recalculations >= 1);

        shutdown.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }
}
