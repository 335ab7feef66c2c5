// ==========================================
// 考勤核算引擎 - 批处理报告
// ==========================================
// 职责: 单元结果分类 + 批次计数汇总
// 红线: 单元失败只计数, 不中断批次; 报告可序列化落库
// ==========================================

use crate::domain::attendance::RecordKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// 批次类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Punches,
    Recalc,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Punches => "punches",
            RunKind::Recalc => "recalc",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单元 (员工 × 考勤日) 成功结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Created,
    Updated,
    Unchanged,
    SkippedPosted,
}

/// 单元失败 (计数, 不中断批次)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitFailure {
    /// 原始打卡无法解析
    Parse { row: usize, reason: String },
    /// 员工编号无法解析为内部员工
    Lookup { external_id: String },
    /// 单条记录读写失败
    Storage {
        key: Option<RecordKey>,
        message: String,
    },
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFailure::Parse { row, reason } => write!(f, "PARSE row={}: {}", row, reason),
            UnitFailure::Lookup { external_id } => {
                write!(f, "LOOKUP external_id={}: no such employee", external_id)
            }
            UnitFailure::Storage {
                key: Some(key),
                message,
            } => write!(
                f,
                "STORAGE employee_id={} date={}: {}",
                key.employee_id, key.attendance_date, message
            ),
            UnitFailure::Storage { key: None, message } => write!(f, "STORAGE: {}", message),
        }
    }
}

// ==========================================
// BatchReport - 批次报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub run_kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    // ===== 计数 =====
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_posted: usize,
    pub missing_punch_flagged: usize,
    pub parse_failures: usize,
    pub lookup_failures: usize,
    pub storage_failures: usize,

    pub cancelled: bool,
    pub elapsed_ms: u64,

    /// 失败明细 (最多保留前若干条)
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    /// 保留失败明细的上限
    pub const MAX_FAILURE_DETAILS: usize = 100;

    pub fn new(run_kind: RunKind) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            run_kind,
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped_posted: 0,
            missing_punch_flagged: 0,
            parse_failures: 0,
            lookup_failures: 0,
            storage_failures: 0,
            cancelled: false,
            elapsed_ms: 0,
            failures: Vec::new(),
        }
    }

    /// 记录一个单元的成功结果
    pub fn record_outcome(&mut self, outcome: UnitOutcome, missing_punch: bool) {
        self.processed += 1;
        match outcome {
            UnitOutcome::Created => self.created += 1,
            UnitOutcome::Updated => self.updated += 1,
            UnitOutcome::Unchanged => self.unchanged += 1,
            UnitOutcome::SkippedPosted => self.skipped_posted += 1,
        }
        if missing_punch && outcome != UnitOutcome::SkippedPosted {
            self.missing_punch_flagged += 1;
        }
    }

    /// 记录一个失败
    ///
    /// 解析失败发生在分组前, 不计入 processed
    pub fn record_failure(&mut self, failure: UnitFailure) {
        match &failure {
            UnitFailure::Parse { .. } => self.parse_failures += 1,
            UnitFailure::Lookup { .. } => {
                self.processed += 1;
                self.lookup_failures += 1;
            }
            UnitFailure::Storage { .. } => {
                self.processed += 1;
                self.storage_failures += 1;
            }
        }
        warn!(failure = %failure, "单元处理失败");
        if self.failures.len() < Self::MAX_FAILURE_DETAILS {
            self.failures.push(failure);
        }
    }

    pub fn failure_count(&self) -> usize {
        self.parse_failures + self.lookup_failures + self.storage_failures
    }

    pub fn changed_count(&self) -> usize {
        self.created + self.updated
    }

    /// 结束计时并输出一条结构化日志
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.finished_at = Some(Utc::now());
        self.elapsed_ms = elapsed_ms;

        info!(
            run_id = %self.run_id,
            run_kind = %self.run_kind,
            processed = self.processed,
            created = self.created,
            updated = self.updated,
            unchanged = self.unchanged,
            skipped_posted = self.skipped_posted,
            missing_punch_flagged = self.missing_punch_flagged,
            parse_failures = self.parse_failures,
            lookup_failures = self.lookup_failures,
            storage_failures = self.storage_failures,
            cancelled = self.cancelled,
            elapsed_ms = self.elapsed_ms,
            "考勤批处理完成"
        );
    }
}
