// ==========================================
// 对账编排器集成测试
// ==========================================
// 测试范围:
// 1. 打卡 → 记录 端到端 (SQLite)
// 2. 幂等: 重复执行零变更
// 3. 已过账记录只读
// 4. 单元失败计数 (解析/员工解析/存储)
// 5. 存储不可用终止批次
// 6. 取消 / 并发
// 7. 夜班顺延 / 范围重算
// ==========================================


use attendance_engine::config::config_keys;
use attendance_engine::logging;
use attendance_engine::repository::{
    AttendanceRepository, AttendanceStore, EmployeeDirectory, RecomputedDay, RepositoryError,
    RepositoryResult, StoredRow, WriteOutcome,
};
use attendance_engine::{
    AttendanceConfig, AttendanceQuery, AttendanceRecord, AttendanceSource, CancelFlag,
    DayRecordBuilder, PostingStatus, PunchReject, ReconcileError, ReconcileOrchestrator, RecordKey,
};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use test_helpers::{date, punch, setup_app};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("时间无效")
}

fn key(employee_id: i64, day: u32) -> RecordKey {
    RecordKey {
        employee_id,
        attendance_date: date(2026, 3, day),
    }
}

// ==========================================
// 内存实现 (并发/故障注入)
// ==========================================

#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<RecordKey, AttendanceRecord>>,
    unavailable: bool,
}

fn apply_draft(
    records: &mut HashMap<RecordKey, AttendanceRecord>,
    draft: &AttendanceRecord,
) -> WriteOutcome {
    let outcome = match records.get(&draft.key()) {
        Some(existing) if existing.posting_status.is_posted() => WriteOutcome::SkippedPosted,
        Some(existing) => {
            let changed_fields = existing.changed_fields(draft);
            if changed_fields.is_empty() {
                WriteOutcome::Unchanged
            } else {
                WriteOutcome::Updated { changed_fields }
            }
        }
        None => WriteOutcome::Created,
    };
    if matches!(outcome, WriteOutcome::Created | WriteOutcome::Updated { .. }) {
        records.insert(draft.key(), draft.clone());
    }
    outcome
}

impl MemoryStore {
    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, HashMap<RecordKey, AttendanceRecord>>> {
        if self.unavailable {
            return Err(RepositoryError::LockError("poisoned".to_string()));
        }
        self.records
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl AttendanceStore for MemoryStore {
    fn reconcile_day(&self, draft: &AttendanceRecord) -> RepositoryResult<WriteOutcome> {
        let mut records = self.lock()?;
        Ok(apply_draft(&mut records, draft))
    }

    fn recompute_day(
        &self,
        key: RecordKey,
        recompute: &dyn Fn(&AttendanceRecord) -> AttendanceRecord,
    ) -> RepositoryResult<Option<RecomputedDay>> {
        let mut records = self.lock()?;
        let Some(existing) = records.get(&key) else {
            return Ok(None);
        };
        if existing.posting_status.is_posted() {
            return Ok(Some(RecomputedDay {
                outcome: WriteOutcome::SkippedPosted,
                missing_punch: existing.missing_punch,
            }));
        }
        let draft = recompute(existing);
        Ok(Some(RecomputedDay {
            outcome: apply_draft(&mut records, &draft),
            missing_punch: draft.missing_punch,
        }))
    }

    fn find_by_key(&self, key: RecordKey) -> RepositoryResult<Option<AttendanceRecord>> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn find_by_query(&self, _query: &AttendanceQuery) -> RepositoryResult<Vec<StoredRow>> {
        let records = self.lock()?;
        Ok(records
            .values()
            .map(|r| StoredRow {
                key: Some(r.key()),
                record: Ok(r.clone()),
            })
            .collect())
    }
}

/// 范围查询返回后, 同一记录被一次导入改写
struct ImportAfterQueryStore {
    inner: Arc<AttendanceRepository>,
    import: AttendanceRecord,
}

impl AttendanceStore for ImportAfterQueryStore {
    fn reconcile_day(&self, draft: &AttendanceRecord) -> RepositoryResult<WriteOutcome> {
        self.inner.reconcile_day(draft)
    }

    fn recompute_day(
        &self,
        key: RecordKey,
        recompute: &dyn Fn(&AttendanceRecord) -> AttendanceRecord,
    ) -> RepositoryResult<Option<RecomputedDay>> {
        self.inner.recompute_day(key, recompute)
    }

    fn find_by_key(&self, key: RecordKey) -> RepositoryResult<Option<AttendanceRecord>> {
        self.inner.find_by_key(key)
    }

    fn find_by_query(&self, query: &AttendanceQuery) -> RepositoryResult<Vec<StoredRow>> {
        let rows = self.inner.find_by_query(query)?;
        self.inner.reconcile_day(&self.import)?;
        Ok(rows)
    }
}

/// "E{n}" → n
struct NumericDirectory;

impl EmployeeDirectory for NumericDirectory {
    fn resolve(&self, external_id: &str) -> RepositoryResult<Option<i64>> {
        Ok(external_id
            .strip_prefix('E')
            .and_then(|n| n.parse::<i64>().ok()))
    }
}

fn memory_orchestrator(
    store: Arc<MemoryStore>,
    max_workers: usize,
) -> ReconcileOrchestrator<MemoryStore, NumericDirectory> {
    let mut config = AttendanceConfig::default();
    config.reconcile.max_workers = max_workers;
    ReconcileOrchestrator::new(store, Arc::new(NumericDirectory), Arc::new(config))
}

// ==========================================
// SQLite 端到端
// ==========================================

#[tokio::test]
async fn test_two_punch_day_end_to_end() {
    logging::init_test();
    let (_tmp, state) = setup_app();
    let orchestrator = state.orchestrator().expect("构建编排器失败");

    let report = orchestrator
        .reconcile_punches(
            vec![punch("E001", 2, 17, 16), punch("E001", 2, 8, 5)],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");

    assert_eq!(report.processed, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.failure_count(), 0);

    let record = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(record.time_in, Some(t(8, 5)));
    assert_eq!(record.time_out, Some(t(17, 16)));
    assert_eq!(record.hours_worked, 8.92);
    assert_eq!(record.late_minutes, 5.0);
    assert_eq!(record.undertime_minutes, 0.0);
    assert_eq!(record.source, AttendanceSource::Biometric);
    assert_eq!(record.posting_status, PostingStatus::NotPosted);
    assert!(!record.missing_punch);

    // 台账
    let runs = state.run_repo.list_recent(5).expect("查询台账失败");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, report.run_id);
    assert!(runs[0].config_snapshot_json.is_some());
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let (_tmp, state) = setup_app();
    let punches = vec![
        punch("E001", 2, 8, 0),
        punch("E001", 2, 12, 0),
        punch("E001", 2, 13, 0),
        punch("E001", 2, 17, 5),
        punch("E002", 2, 8, 20),
        punch("E002", 3, 8, 0),
    ];

    let first = state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(punches.clone(), Vec::new(), AttendanceSource::Biometric, &CancelFlag::new())
        .await
        .expect("第一次批处理失败");
    assert_eq!(first.created, 3);

    let second = state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(punches, Vec::new(), AttendanceSource::Biometric, &CancelFlag::new())
        .await
        .expect("第二次批处理失败");

    assert_eq!(second.processed, 3);
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.changed_count(), 0);
}

#[tokio::test]
async fn test_posted_record_is_never_touched() {
    let (_tmp, state) = setup_app();
    let cancel = CancelFlag::new();

    state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![punch("E001", 2, 8, 5), punch("E001", 2, 17, 16)],
            Vec::new(),
            AttendanceSource::Biometric,
            &cancel,
        )
        .await
        .expect("批处理失败");
    let before = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");

    state
        .attendance_repo
        .mark_posted(1, date(2026, 3, 1), date(2026, 3, 31))
        .expect("过账失败");

    // 不同打卡 + 重算都不能修改已过账记录
    let report = state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![punch("E001", 2, 9, 30), punch("E001", 2, 18, 0)],
            Vec::new(),
            AttendanceSource::Manual,
            &cancel,
        )
        .await
        .expect("批处理失败");
    assert_eq!(report.skipped_posted, 1);

    let recalc = state
        .recalculate(AttendanceQuery::date_range(date(2026, 3, 1), date(2026, 3, 31)), &cancel)
        .await
        .expect("重算失败");
    assert_eq!(recalc.skipped_posted, 1);
    assert_eq!(recalc.changed_count(), 0);

    let after = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(after.posting_status, PostingStatus::Posted);
    assert!(before.changed_fields(&after).is_empty());
}

#[tokio::test]
async fn test_unit_failures_do_not_abort_batch() {
    let (_tmp, state) = setup_app();

    let report = state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![
                punch("E999", 2, 8, 0),
                punch("E999", 2, 17, 0),
                punch("E001", 2, 8, 0),
                punch("E001", 2, 17, 0),
            ],
            vec![PunchReject {
                row: 7,
                reason: "时间格式错误".to_string(),
            }],
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");

    assert_eq!(report.parse_failures, 1);
    assert_eq!(report.lookup_failures, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.processed, 2);
    assert_eq!(state.attendance_repo.count().expect("计数失败"), 1);
}

#[tokio::test]
async fn test_single_punch_is_halfday_without_penalties() {
    let (_tmp, state) = setup_app();

    let report = state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![punch("E001", 2, 9, 45)],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");
    assert_eq!(report.missing_punch_flagged, 1);

    let record = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(record.hours_worked, 0.0);
    assert!(record.is_halfday());
    assert_eq!(record.late_minutes, 0.0);
    assert_eq!(record.undertime_minutes, 0.0);
    assert!(record.missing_punch);
    assert!(record
        .remarks
        .as_deref()
        .map_or(false, |r| r.contains("STILL_CLOCKED_IN")));
}

#[tokio::test]
async fn test_undertime_grace_band() {
    let (_tmp, state) = setup_app();

    state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![
                punch("E001", 3, 8, 0),
                punch("E001", 3, 15, 20),
                punch("E002", 3, 8, 25),
                punch("E002", 3, 17, 25),
            ],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");

    let short_day = state
        .attendance_repo
        .find_by_key(key(1, 3))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(short_day.hours_worked, 7.0);
    assert_eq!(short_day.undertime_minutes, 120.0);

    let near_full = state
        .attendance_repo
        .find_by_key(key(2, 3))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(near_full.undertime_minutes, 0.0);
    assert_eq!(near_full.late_minutes, 25.0);
}

#[tokio::test]
async fn test_night_shift_is_one_record() {
    let (_tmp, state) = setup_app();

    let report = state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![punch("E001", 2, 22, 5), punch("E001", 3, 7, 10)],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");
    assert_eq!(report.created, 1);

    let record = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert!(record.is_nightshift);
    assert_eq!(record.time_out, None);
    assert_eq!(record.next_day_timeout, Some(t(7, 10)));
    assert_eq!(record.hours_worked, 8.92);
    assert_eq!(record.late_minutes, 5.0);

    assert!(state
        .attendance_repo
        .find_by_key(key(1, 3))
        .expect("查询失败")
        .is_none());
}

#[tokio::test]
async fn test_recalculate_range_applies_new_config() {
    let (_tmp, state) = setup_app();
    let cancel = CancelFlag::new();

    state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![
                punch("E001", 2, 8, 0),
                punch("E001", 2, 17, 20),
                punch("E002", 2, 8, 0),
                punch("E002", 2, 17, 20),
            ],
            Vec::new(),
            AttendanceSource::Biometric,
            &cancel,
        )
        .await
        .expect("批处理失败");

    state
        .config_manager
        .set_global_config_value(config_keys::MINIMUM_WORKDAY_MINUTES, "600")
        .expect("写入配置失败");

    // 只重算 Ops 部门
    let query = AttendanceQuery::date_range(date(2026, 3, 1), date(2026, 3, 31)).with_department("Ops");
    let report = state.recalculate(query.clone(), &cancel).await.expect("重算失败");
    assert_eq!(report.processed, 1);
    assert_eq!(report.updated, 1);

    let ops = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(ops.undertime_minutes, 60.0);

    let finance = state
        .attendance_repo
        .find_by_key(key(2, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(finance.undertime_minutes, 0.0);

    let again = state.recalculate(query, &cancel).await.expect("重算失败");
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.changed_count(), 0);
}

#[tokio::test]
async fn test_recalculate_keeps_import_written_after_query() {
    let (_tmp, state) = setup_app();
    let config = AttendanceConfig::default();

    state
        .orchestrator()
        .expect("构建编排器失败")
        .reconcile_punches(
            vec![punch("E001", 2, 8, 0), punch("E001", 2, 12, 0)],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");
    let before = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(before.hours_worked, 4.0);

    // 重算读取范围之后, 导入补齐了下班卡
    let import = DayRecordBuilder::new()
        .from_punches(
            1,
            date(2026, 3, 2),
            vec![punch("E001", 2, 8, 0), punch("E001", 2, 18, 10)],
            AttendanceSource::Import,
            &config,
        )
        .record;
    let store = Arc::new(ImportAfterQueryStore {
        inner: state.attendance_repo.clone(),
        import,
    });
    let orchestrator =
        ReconcileOrchestrator::new(store, state.employee_repo.clone(), Arc::new(config));

    let report = orchestrator
        .recalculate_range(
            AttendanceQuery::date_range(date(2026, 3, 1), date(2026, 3, 31)),
            &CancelFlag::new(),
        )
        .await
        .expect("重算失败");
    assert_eq!(report.processed, 1);
    assert_eq!(report.failure_count(), 0);

    let after = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(after.time_out, Some(t(18, 10)));
    assert_eq!(after.source, AttendanceSource::Import);
    assert_eq!(after.hours_worked, 10.0);
}

#[tokio::test]
async fn test_recalculate_range_on_memory_store() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = memory_orchestrator(store.clone(), 4);
    orchestrator
        .reconcile_punches(
            vec![punch("E1", 2, 8, 0), punch("E1", 2, 17, 0), punch("E2", 2, 8, 0)],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await
        .expect("批处理失败");

    let report = orchestrator
        .recalculate_range(
            AttendanceQuery::date_range(date(2026, 3, 1), date(2026, 3, 31)),
            &CancelFlag::new(),
        )
        .await
        .expect("重算失败");
    assert_eq!(report.processed, 2);
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.missing_punch_flagged, 1);
}

#[tokio::test]
async fn test_reconcile_file_with_range() {
    let (_tmp, state) = setup_app();
    let file = test_helpers::write_csv(
        "employee_id,timestamp\n\
         E001,2026-03-01 08:00:00\n\
         E001,2026-03-01 17:00:00\n\
         E001,2026-03-02 08:05:00\n\
         E001,2026-03-02 17:16:00\n\
         E002,2026-03-02 not-a-time\n",
    );

    let report = state
        .reconcile_file(
            file.path(),
            Some((date(2026, 3, 2), date(2026, 3, 2))),
            AttendanceSource::Import,
            &CancelFlag::new(),
        )
        .await
        .expect("文件对账失败");

    assert_eq!(report.created, 1);
    assert_eq!(report.parse_failures, 1);
    let record = state
        .attendance_repo
        .find_by_key(key(1, 2))
        .expect("查询失败")
        .expect("记录应存在");
    assert_eq!(record.source, AttendanceSource::Import);
}

// ==========================================
// 内存实现: 并发 / 取消 / 故障
// ==========================================

#[tokio::test]
async fn test_parallel_workers_are_deterministic() {
    let punches: Vec<_> = (1..=40)
        .flat_map(|e| {
            let id = format!("E{}", e);
            (2..=6).flat_map(move |day| {
                vec![
                    punch(&id, day, 8, (e % 20) as u32),
                    punch(&id, day, 12, 0),
                    punch(&id, day, 13, 0),
                    punch(&id, day, 17, 30),
                ]
            })
        })
        .collect();

    let store = Arc::new(MemoryStore::default());
    let orchestrator = memory_orchestrator(store.clone(), 8);

    let first = orchestrator
        .reconcile_punches(punches.clone(), Vec::new(), AttendanceSource::Biometric, &CancelFlag::new())
        .await
        .expect("批处理失败");
    assert_eq!(first.created, 200);

    let snapshot = store.records.lock().expect("锁失败").clone();

    let sequential = Arc::new(MemoryStore::default());
    memory_orchestrator(sequential.clone(), 1)
        .reconcile_punches(punches.clone(), Vec::new(), AttendanceSource::Biometric, &CancelFlag::new())
        .await
        .expect("批处理失败");
    assert_eq!(*sequential.records.lock().expect("锁失败"), snapshot);

    let second = orchestrator
        .reconcile_punches(punches, Vec::new(), AttendanceSource::Biometric, &CancelFlag::new())
        .await
        .expect("批处理失败");
    assert_eq!(second.unchanged, 200);
}

#[tokio::test]
async fn test_cancelled_batch_starts_no_units() {
    let store = Arc::new(MemoryStore::default());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = memory_orchestrator(store.clone(), 2)
        .reconcile_punches(
            vec![punch("E1", 2, 8, 0), punch("E1", 2, 17, 0)],
            Vec::new(),
            AttendanceSource::Biometric,
            &cancel,
        )
        .await
        .expect("批处理失败");

    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert!(store.records.lock().expect("锁失败").is_empty());
}

#[tokio::test]
async fn test_storage_unavailable_fails_batch() {
    let store = Arc::new(MemoryStore {
        unavailable: true,
        ..Default::default()
    });

    let result = memory_orchestrator(store, 2)
        .reconcile_punches(
            vec![punch("E1", 2, 8, 0), punch("E1", 2, 17, 0)],
            Vec::new(),
            AttendanceSource::Biometric,
            &CancelFlag::new(),
        )
        .await;

    assert!(matches!(result, Err(ReconcileError::StorageUnavailable(_))));
}
