// ==========================================
// Repository 层集成测试
// ==========================================
// 测试目标: 考勤记录对账写入 / 范围查询 / 过账 / 员工目录 / 批次台账
// ==========================================


use attendance_engine::engine::{BatchReport, RunKind, UnitOutcome};
use attendance_engine::repository::{AttendanceStore, EmployeeDirectory, WriteOutcome};
use attendance_engine::{AttendanceQuery, AttendanceRecord, AttendanceSource, PostingStatus};
use chrono::NaiveTime;
use test_helpers::{date, employee, setup_app};

fn record(employee_id: i64, day: u32) -> AttendanceRecord {
    let mut r = AttendanceRecord::new(employee_id, date(2026, 3, day), AttendanceSource::Biometric);
    r.time_in = NaiveTime::from_hms_opt(8, 0, 0);
    r.time_out = NaiveTime::from_hms_opt(17, 0, 0);
    r.hours_worked = 9.0;
    r
}

fn keys(rows: &[attendance_engine::repository::StoredRow]) -> Vec<(i64, u32)> {
    use chrono::Datelike;
    rows.iter()
        .filter_map(|row| row.key)
        .map(|k| (k.employee_id, k.attendance_date.day()))
        .collect()
}

// ==========================================
// 对账写入
// ==========================================

#[test]
fn test_reconcile_day_reports_changed_fields() {
    let (_tmp, state) = setup_app();
    let repo = &state.attendance_repo;

    assert_eq!(repo.reconcile_day(&record(1, 2)).expect("写入失败"), WriteOutcome::Created);

    let mut changed = record(1, 2);
    changed.time_out = NaiveTime::from_hms_opt(18, 0, 0);
    changed.hours_worked = 10.0;
    changed.source = AttendanceSource::Manual;

    match repo.reconcile_day(&changed).expect("写入失败") {
        WriteOutcome::Updated { changed_fields } => {
            assert!(changed_fields.contains(&"time_out"));
            assert!(changed_fields.contains(&"hours_worked"));
            assert!(changed_fields.contains(&"source"));
            assert!(!changed_fields.contains(&"time_in"));
        }
        other => panic!("应为 Updated, 实际: {:?}", other),
    }

    let stored = repo
        .find_by_key(changed.key())
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(stored, changed);
    assert_eq!(repo.reconcile_day(&changed).expect("写入失败"), WriteOutcome::Unchanged);
}

#[test]
fn test_one_record_per_employee_day() {
    let (_tmp, state) = setup_app();
    let repo = &state.attendance_repo;

    for _ in 0..3 {
        repo.reconcile_day(&record(1, 2)).expect("写入失败");
    }
    repo.reconcile_day(&record(1, 3)).expect("写入失败");
    repo.reconcile_day(&record(2, 2)).expect("写入失败");

    assert_eq!(repo.count().expect("计数失败"), 3);
}

// ==========================================
// 过账
// ==========================================

#[test]
fn test_mark_posted_scopes_by_employee_and_range() {
    let (_tmp, state) = setup_app();
    let repo = &state.attendance_repo;

    for day in 1..=5 {
        repo.reconcile_day(&record(1, day)).expect("写入失败");
        repo.reconcile_day(&record(2, day)).expect("写入失败");
    }

    let posted = repo
        .mark_posted(1, date(2026, 3, 2), date(2026, 3, 4))
        .expect("过账失败");
    assert_eq!(posted, 3);

    // 重复过账不再计数
    let again = repo
        .mark_posted(1, date(2026, 3, 2), date(2026, 3, 4))
        .expect("过账失败");
    assert_eq!(again, 0);

    let posted_rows = repo
        .find_by_query(&AttendanceQuery::default().with_posting_status(PostingStatus::Posted))
        .expect("查询失败");
    assert_eq!(keys(&posted_rows), vec![(1, 2), (1, 3), (1, 4)]);

    let mut edit = record(1, 3);
    edit.late_minutes = 30.0;
    assert_eq!(repo.reconcile_day(&edit).expect("写入失败"), WriteOutcome::SkippedPosted);
    let stored = repo
        .find_by_key(edit.key())
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(stored.late_minutes, 0.0);
    assert_eq!(stored.posting_status, PostingStatus::Posted);
}

#[test]
fn test_recompute_day_reads_current_row() {
    let (_tmp, state) = setup_app();
    let repo = &state.attendance_repo;
    let key = record(1, 2).key();

    // 不存在的记录不调用重算
    let missing = repo
        .recompute_day(key, &|_: &AttendanceRecord| -> AttendanceRecord { panic!("不应调用重算") })
        .expect("重算失败");
    assert!(missing.is_none());

    let mut current = record(1, 2);
    current.missing_punch = true;
    repo.reconcile_day(&current).expect("写入失败");

    let result = repo
        .recompute_day(key, &|existing: &AttendanceRecord| {
            assert!(existing.missing_punch);
            let mut draft = existing.clone();
            draft.undertime_minutes = 60.0;
            draft
        })
        .expect("重算失败")
        .expect("记录应存在");
    assert!(matches!(result.outcome, WriteOutcome::Updated { .. }));
    assert!(result.missing_punch);

    let stored = repo.find_by_key(key).expect("查询失败").expect("记录应存在");
    assert_eq!(stored.undertime_minutes, 60.0);

    // 已过账: 跳过且不调用重算
    repo.mark_posted(1, date(2026, 3, 1), date(2026, 3, 31))
        .expect("过账失败");
    let posted = repo
        .recompute_day(key, &|_: &AttendanceRecord| -> AttendanceRecord { panic!("不应调用重算") })
        .expect("重算失败")
        .expect("记录应存在");
    assert_eq!(posted.outcome, WriteOutcome::SkippedPosted);
}

// ==========================================
// 范围查询
// ==========================================

#[test]
fn test_find_by_query_filters_and_orders() {
    let (_tmp, state) = setup_app();
    let repo = &state.attendance_repo;

    for day in [5, 1, 3] {
        repo.reconcile_day(&record(2, day)).expect("写入失败");
        repo.reconcile_day(&record(1, day)).expect("写入失败");
    }

    let all = repo.find_by_query(&AttendanceQuery::default()).expect("查询失败");
    assert_eq!(
        keys(&all),
        vec![(1, 1), (1, 3), (1, 5), (2, 1), (2, 3), (2, 5)]
    );

    let ranged = repo
        .find_by_query(&AttendanceQuery::date_range(date(2026, 3, 2), date(2026, 3, 5)))
        .expect("查询失败");
    assert_eq!(keys(&ranged), vec![(1, 3), (1, 5), (2, 3), (2, 5)]);

    let finance = repo
        .find_by_query(&AttendanceQuery::default().with_department("Finance"))
        .expect("查询失败");
    assert_eq!(keys(&finance), vec![(2, 1), (2, 3), (2, 5)]);

    let single = repo
        .find_by_query(&AttendanceQuery::default().with_employee(1).with_department("Finance"))
        .expect("查询失败");
    assert!(single.is_empty());

    assert!(all.iter().all(|row| row.record.is_ok()));
}

// ==========================================
// 员工目录
// ==========================================

#[test]
fn test_employee_upsert_and_resolve() {
    let (_tmp, state) = setup_app();
    let repo = &state.employee_repo;

    assert_eq!(repo.resolve(" E002 ").expect("查询失败"), Some(2));
    assert_eq!(repo.resolve("E404").expect("查询失败"), None);

    // 重复导入只更新, 不新增
    let id = repo.upsert(&employee("E002", "Logistics")).expect("写入失败");
    assert_eq!(id, 2);
    let e = repo
        .find_by_external_id("E002")
        .expect("查询失败")
        .expect("员工应存在");
    assert_eq!(e.department.as_deref(), Some("Logistics"));
    assert!(e.active);

    repo.upsert(&employee("E003", "Ops")).expect("写入失败");
    let all = repo.list_all().expect("查询失败");
    assert_eq!(
        all.iter().map(|e| e.external_id.as_str()).collect::<Vec<_>>(),
        vec!["E001", "E002", "E003"]
    );
}

// ==========================================
// 批次台账
// ==========================================

#[test]
fn test_run_ledger_round_trip() {
    let (_tmp, state) = setup_app();

    let mut first = BatchReport::new(RunKind::Punches);
    first.record_outcome(UnitOutcome::Created, true);
    first.finish(12);
    state.run_repo.insert(&first, Some("{}")).expect("写入台账失败");

    let mut second = BatchReport::new(RunKind::Recalc);
    second.record_outcome(UnitOutcome::Unchanged, false);
    second.finish(3);
    state.run_repo.insert(&second, None).expect("写入台账失败");

    let entry = state
        .run_repo
        .find_by_id(&first.run_id)
        .expect("查询台账失败")
        .expect("台账应存在");
    assert_eq!(entry.run_kind, "punches");
    assert_eq!(entry.config_snapshot_json.as_deref(), Some("{}"));

    let report = entry.report().expect("报告反序列化失败");
    assert_eq!(report.created, 1);
    assert_eq!(report.missing_punch_flagged, 1);
    assert_eq!(report.elapsed_ms, 12);

    let recent = state.run_repo.list_recent(10).expect("查询台账失败");
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().any(|e| e.run_id == second.run_id && e.run_kind == "recalc"));
}
