// ==========================================
// 考勤核算引擎 - 对账编排器
// ==========================================
// 用途: 分组 → 员工解析 → 并行计算 → 逐条对账写入 → 批次报告
// 入口:
//   - reconcile_punches: 原始打卡批处理
//   - recalculate_range: 已有记录按范围重算
// 红线: 单元失败不中断批次; 存储不可用立即终止
// 红线: 已过账记录不写; 无变化不写 (重复执行零变更)
// ==========================================

use crate::config::{AttendanceConfig, ReconcileConfig};
use crate::domain::attendance::{AttendanceQuery, AttendanceRecord, RecordKey};
use crate::domain::punch::{PunchReject, RawPunch};
use crate::domain::types::AttendanceSource;
use crate::engine::day_builder::DayRecordBuilder;
use crate::engine::report::{BatchReport, RunKind, UnitFailure, UnitOutcome};
use crate::repository::error::RepositoryError;
use crate::repository::store::{AttendanceStore, EmployeeDirectory, RunLedger, WriteOutcome};
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

// ==========================================
// CancelFlag - 协作式取消
// ==========================================
/// 已开始的单元会完成, 未开始的单元不再执行
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// ReconcileError - 批次级错误
// ==========================================
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("存储不可用, 批次终止: {0}")]
    StorageUnavailable(#[source] RepositoryError),

    #[error("存储查询失败: {0}")]
    Storage(#[source] RepositoryError),

    #[error("工作线程失败: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for ReconcileError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReconcileError::Worker(err.to_string())
    }
}

// ==========================================
// 分组 (员工 × 考勤日)
// ==========================================

/// 单个处理单元
#[derive(Debug, Clone, PartialEq)]
pub struct PunchGroup {
    pub external_id: String,
    pub attendance_date: NaiveDate,
    pub punches: Vec<RawPunch>,
}

/// 按 (员工编号, 日历日) 分组, 并做夜班顺延
///
/// 顺延规则: D 日打卡数为奇数且最后一次不早于 night_carryover_from,
/// 则 D+1 日早于 night_carryover_until 的打卡归入 D 日
///
/// 同一员工完全相同时刻的重复打卡只保留一次
pub fn group_punches(punches: Vec<RawPunch>, config: &ReconcileConfig) -> Vec<PunchGroup> {
    let mut by_employee: BTreeMap<String, BTreeMap<NaiveDate, Vec<RawPunch>>> = BTreeMap::new();
    let mut seen = BTreeSet::new();

    for mut punch in punches {
        punch.employee_external_id = punch.employee_external_id.trim().to_string();
        if !seen.insert((punch.employee_external_id.clone(), punch.timestamp)) {
            continue;
        }
        by_employee
            .entry(punch.employee_external_id.clone())
            .or_default()
            .entry(punch.date())
            .or_default()
            .push(punch);
    }

    let mut groups = Vec::new();
    for (external_id, mut days) in by_employee {
        for punches in days.values_mut() {
            punches.sort_by_key(|p| p.timestamp);
        }

        let dates: Vec<NaiveDate> = days.keys().copied().collect();
        for date in dates {
            let carries = days.get(&date).map_or(false, |list| {
                list.len() % 2 == 1
                    && list
                        .last()
                        .map_or(false, |p| p.time() >= config.night_carryover_from)
            });
            if !carries {
                continue;
            }

            let next = date + Duration::days(1);
            let moved: Vec<RawPunch> = match days.get_mut(&next) {
                Some(next_list) => {
                    let split = next_list
                        .iter()
                        .position(|p| p.time() >= config.night_carryover_until)
                        .unwrap_or(next_list.len());
                    next_list.drain(..split).collect()
                }
                None => Vec::new(),
            };

            if !moved.is_empty() {
                debug!(
                    external_id = %external_id,
                    attendance_date = %date,
                    moved = moved.len(),
                    "夜班次日打卡归入前一日"
                );
                if let Some(list) = days.get_mut(&date) {
                    list.extend(moved);
                }
            }
        }

        for (attendance_date, punches) in days {
            if punches.is_empty() {
                continue;
            }
            groups.push(PunchGroup {
                external_id: external_id.clone(),
                attendance_date,
                punches,
            });
        }
    }

    groups
}

/// 单元执行结果
enum UnitResult {
    Done { outcome: UnitOutcome, missing_punch: bool },
    Failed(UnitFailure),
    Fatal(RepositoryError),
    NotStarted,
}

fn to_unit_outcome(outcome: &WriteOutcome) -> UnitOutcome {
    match outcome {
        WriteOutcome::Created => UnitOutcome::Created,
        WriteOutcome::Updated { .. } => UnitOutcome::Updated,
        WriteOutcome::Unchanged => UnitOutcome::Unchanged,
        WriteOutcome::SkippedPosted => UnitOutcome::SkippedPosted,
    }
}

fn storage_failure(key: RecordKey, e: RepositoryError) -> UnitResult {
    if e.is_unavailable() {
        UnitResult::Fatal(e)
    } else {
        UnitResult::Failed(UnitFailure::Storage {
            key: Some(key),
            message: e.to_string(),
        })
    }
}

fn write_result<S: AttendanceStore>(store: &S, draft: &AttendanceRecord) -> UnitResult {
    match store.reconcile_day(draft) {
        Ok(outcome) => {
            if let WriteOutcome::Updated { changed_fields } = &outcome {
                debug!(
                    employee_id = draft.employee_id,
                    attendance_date = %draft.attendance_date,
                    changed = ?changed_fields,
                    "考勤记录已更新"
                );
            }
            UnitResult::Done {
                outcome: to_unit_outcome(&outcome),
                missing_punch: draft.missing_punch,
            }
        }
        Err(e) => storage_failure(draft.key(), e),
    }
}

/// 读取与写入在同一事务内, 草稿总是基于最新行
fn recompute_result<S: AttendanceStore>(
    store: &S,
    key: RecordKey,
    builder: DayRecordBuilder,
    config: &AttendanceConfig,
) -> UnitResult {
    let recompute = |existing: &AttendanceRecord| builder.recompute(existing, config).record;
    match store.recompute_day(key, &recompute) {
        Ok(Some(day)) => {
            if let WriteOutcome::Updated { changed_fields } = &day.outcome {
                debug!(
                    employee_id = key.employee_id,
                    attendance_date = %key.attendance_date,
                    changed = ?changed_fields,
                    "考勤记录已重算"
                );
            }
            UnitResult::Done {
                outcome: to_unit_outcome(&day.outcome),
                missing_punch: day.missing_punch,
            }
        }
        Ok(None) => UnitResult::Failed(UnitFailure::Storage {
            key: Some(key),
            message: "记录在重算前已被删除".to_string(),
        }),
        Err(e) => storage_failure(key, e),
    }
}

// ==========================================
// ReconcileOrchestrator - 对账编排器
// ==========================================
pub struct ReconcileOrchestrator<S, D>
where
    S: AttendanceStore + 'static,
    D: EmployeeDirectory + 'static,
{
    store: Arc<S>,
    directory: Arc<D>,
    config: Arc<AttendanceConfig>,
    ledger: Option<Arc<dyn RunLedger>>,
    builder: DayRecordBuilder,
}

impl<S, D> ReconcileOrchestrator<S, D>
where
    S: AttendanceStore + 'static,
    D: EmployeeDirectory + 'static,
{
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - store: 考勤记录存储
    /// - directory: 员工目录
    /// - config: 核算参数 (单批次内不变)
    pub fn new(store: Arc<S>, directory: Arc<D>, config: Arc<AttendanceConfig>) -> Self {
        Self {
            store,
            directory,
            config,
            ledger: None,
            builder: DayRecordBuilder::new(),
        }
    }

    /// 每个批次结束后写入台账
    pub fn with_ledger(mut self, ledger: Arc<dyn RunLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &AttendanceConfig {
        &self.config
    }

    fn workers(&self) -> usize {
        self.config.reconcile.max_workers.max(1)
    }

    /// 原始打卡批处理
    ///
    /// # 参数
    /// - punches: 已解析的原始打卡 (任意顺序, 可含多人多日)
    /// - rejects: 适配器无法解析的行, 计入报告
    /// - source: 本批数据来源
    /// - cancel: 取消标志
    ///
    /// # 返回
    /// - Ok(BatchReport): 批次完成 (含单元失败计数)
    /// - Err(StorageUnavailable): 存储整体不可用
    #[instrument(skip(self, punches, rejects, cancel), fields(punch_count = punches.len(), source = %source))]
    pub async fn reconcile_punches(
        &self,
        punches: Vec<RawPunch>,
        rejects: Vec<PunchReject>,
        source: AttendanceSource,
        cancel: &CancelFlag,
    ) -> Result<BatchReport, ReconcileError> {
        let started = Instant::now();
        let mut report = BatchReport::new(RunKind::Punches);

        for reject in rejects {
            report.record_failure(UnitFailure::Parse {
                row: reject.row,
                reason: reject.reason,
            });
        }

        let groups = group_punches(punches, &self.config.reconcile);
        info!(run_id = %report.run_id, units = groups.len(), "开始打卡对账");

        // 员工解析 (每个编号只查一次)
        let external_ids: Vec<String> = groups
            .iter()
            .map(|g| g.external_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let directory = self.directory.clone();
        let resolved: Vec<(String, Result<Option<i64>, RepositoryError>)> =
            tokio::task::spawn_blocking(move || {
                external_ids
                    .into_iter()
                    .map(|id| {
                        let result = directory.resolve(&id);
                        (id, result)
                    })
                    .collect()
            })
            .await?;

        let mut lookups: HashMap<String, Result<Option<i64>, String>> = HashMap::new();
        for (external_id, result) in resolved {
            match result {
                Err(e) if e.is_unavailable() => return Err(ReconcileError::StorageUnavailable(e)),
                other => {
                    lookups.insert(external_id, other.map_err(|e| e.to_string()));
                }
            }
        }

        let mut units = Vec::with_capacity(groups.len());
        for group in groups {
            match lookups.get(&group.external_id) {
                Some(Ok(Some(employee_id))) => units.push((*employee_id, group)),
                Some(Ok(None)) | None => report.record_failure(UnitFailure::Lookup {
                    external_id: group.external_id,
                }),
                Some(Err(message)) => report.record_failure(UnitFailure::Storage {
                    key: None,
                    message: format!("{}: {}", group.external_id, message),
                }),
            }
        }

        let tasks = units.into_iter().map(|(employee_id, group)| {
            let store = self.store.clone();
            let config = self.config.clone();
            let builder = self.builder;
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return Ok(UnitResult::NotStarted);
                }
                tokio::task::spawn_blocking(move || {
                    let eval = builder.from_punches(
                        employee_id,
                        group.attendance_date,
                        group.punches,
                        source,
                        &config,
                    );
                    debug!(
                        employee_id,
                        attendance_date = %group.attendance_date,
                        expected_time_in = %eval.shift.expected_time_in,
                        hours_worked = eval.record.hours_worked,
                        "单日计算完成"
                    );
                    write_result(store.as_ref(), &eval.record)
                })
                .await
            }
        });

        self.drain(tasks, &mut report).await?;
        self.finish(report, started, cancel)
    }

    /// 已有记录按范围重算
    ///
    /// 页面加载/手工触发/假期同步后的重算统一走此入口
    #[instrument(skip(self, cancel))]
    pub async fn recalculate_range(
        &self,
        query: AttendanceQuery,
        cancel: &CancelFlag,
    ) -> Result<BatchReport, ReconcileError> {
        let started = Instant::now();
        let mut report = BatchReport::new(RunKind::Recalc);

        let store = self.store.clone();
        let rows = tokio::task::spawn_blocking(move || store.find_by_query(&query))
            .await?
            .map_err(|e| {
                if e.is_unavailable() {
                    ReconcileError::StorageUnavailable(e)
                } else {
                    ReconcileError::Storage(e)
                }
            })?;
        info!(run_id = %report.run_id, units = rows.len(), "开始范围重算");

        // 查询结果只用于确定范围; 每条记录在写事务内重新读取
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            match row.record {
                Ok(record) if record.posting_status.is_posted() => {
                    report.record_outcome(UnitOutcome::SkippedPosted, record.missing_punch);
                }
                Ok(record) => keys.push(record.key()),
                Err(e) => report.record_failure(UnitFailure::Storage {
                    key: row.key,
                    message: e.to_string(),
                }),
            }
        }

        let tasks = keys.into_iter().map(|key| {
            let store = self.store.clone();
            let config = self.config.clone();
            let builder = self.builder;
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return Ok(UnitResult::NotStarted);
                }
                tokio::task::spawn_blocking(move || {
                    recompute_result(store.as_ref(), key, builder, &config)
                })
                .await
            }
        });

        self.drain(tasks, &mut report).await?;
        self.finish(report, started, cancel)
    }

    /// 以 max_workers 并发执行单元并汇总
    async fn drain<I, F>(&self, tasks: I, report: &mut BatchReport) -> Result<(), ReconcileError>
    where
        I: Iterator<Item = F>,
        F: std::future::Future<Output = Result<UnitResult, tokio::task::JoinError>>,
    {
        let mut results = stream::iter(tasks).buffer_unordered(self.workers());

        while let Some(result) = results.next().await {
            match result? {
                UnitResult::Done {
                    outcome,
                    missing_punch,
                } => report.record_outcome(outcome, missing_punch),
                UnitResult::Failed(failure) => report.record_failure(failure),
                UnitResult::Fatal(e) => {
                    warn!(run_id = %report.run_id, error = %e, "存储不可用, 终止批次");
                    return Err(ReconcileError::StorageUnavailable(e));
                }
                UnitResult::NotStarted => report.cancelled = true,
            }
        }

        Ok(())
    }

    fn finish(
        &self,
        mut report: BatchReport,
        started: Instant,
        cancel: &CancelFlag,
    ) -> Result<BatchReport, ReconcileError> {
        report.cancelled |= cancel.is_cancelled();
        report.finish(started.elapsed().as_millis() as u64);

        if let Some(ledger) = &self.ledger {
            let snapshot = serde_json::to_string(self.config.as_ref()).ok();
            if let Err(e) = ledger.record_run(&report, snapshot.as_deref()) {
                warn!(run_id = %report.run_id, error = %e, "批次台账写入失败");
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn punch(id: &str, day: u32, h: u32, m: u32) -> RawPunch {
        RawPunch::new(
            id,
            NaiveDate::from_ymd_opt(2026, 3, day)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_group_by_employee_and_day() {
        let groups = group_punches(
            vec![
                punch("E2", 2, 8, 0),
                punch("E1", 2, 17, 0),
                punch("E1", 2, 8, 0),
                punch("E1", 3, 8, 0),
                punch(" E1 ", 3, 8, 0),
            ],
            &ReconcileConfig::default(),
        );

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].external_id, "E1");
        assert_eq!(groups[0].punches.len(), 2);
        assert_eq!(groups[1].punches.len(), 1, "重复打卡只保留一次");
        assert_eq!(groups[2].external_id, "E2");
    }

    #[test]
    fn test_night_carry_over() {
        let groups = group_punches(
            vec![
                punch("E1", 2, 22, 5),
                punch("E1", 3, 7, 10),
                punch("E1", 3, 21, 58),
                punch("E1", 4, 6, 3),
            ],
            &ReconcileConfig::default(),
        );

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].attendance_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(groups[0].punches.len(), 2);
        assert_eq!(groups[0].punches[1].time(), NaiveTime::from_hms_opt(7, 10, 0).unwrap());
        assert_eq!(groups[1].attendance_date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(groups[1].punches.len(), 2);
    }

    #[test]
    fn test_even_day_does_not_carry() {
        let groups = group_punches(
            vec![
                punch("E1", 2, 8, 0),
                punch("E1", 2, 17, 30),
                punch("E1", 3, 7, 55),
            ],
            &ReconcileConfig::default(),
        );
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
