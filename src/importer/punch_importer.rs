// ==========================================
// 考勤核算引擎 - 打卡导入
// ==========================================
// 职责: 考勤机导出文件 (CSV/Excel) → RawPunch
// 列别名: 员工编号 employee_id|emp_code|external_id
//         时间     timestamp|punch_time|datetime, 或 date + time 两列
//         状态     state|punch_state (可选, 仅留痕)
// 红线: 单行解析失败 → PunchReject, 不中断整个文件
// ==========================================

use crate::domain::punch::{PunchReject, RawPunch};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{FileParser, SourceRow, UniversalFileParser};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const EMPLOYEE_ALIASES: &[&str] = &["employee_id", "emp_code", "external_id"];
const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "punch_time", "datetime"];
const DATE_ALIASES: &[&str] = &["date", "punch_date"];
const TIME_ALIASES: &[&str] = &["time", "clock_time"];
const STATE_ALIASES: &[&str] = &["state", "punch_state"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// 解析打卡时间 (本地时间)
///
/// 依次尝试固定格式, 最后尝试 RFC 3339 (丢弃时区, 取本地时刻)
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

/// 导入结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PunchImport {
    pub punches: Vec<RawPunch>,
    pub rejects: Vec<PunchReject>,
}

impl PunchImport {
    /// 仅保留 [start, end] 内的打卡
    ///
    /// 结束日次日早于 carry_until 的打卡一并保留, 供夜班顺延使用
    pub fn retain_range(&mut self, start: NaiveDate, end: NaiveDate, carry_until: NaiveTime) {
        let carry_day = end.succ_opt();
        self.punches.retain(|p| {
            let d = p.date();
            (d >= start && d <= end) || (Some(d) == carry_day && p.time() < carry_until)
        });
    }
}

// ==========================================
// PunchFileImporter - 打卡文件导入器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct PunchFileImporter;

impl PunchFileImporter {
    pub fn new() -> Self {
        Self
    }

    /// 读取文件并映射为打卡
    ///
    /// # 返回
    /// - Ok(PunchImport): 文件可读 (行级错误在 rejects 中)
    /// - Err: 文件不存在/格式不支持/缺少必需列
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ImportResult<PunchImport> {
        let rows = UniversalFileParser.parse_to_rows(path.as_ref())?;
        let result = self.map_rows(rows)?;

        info!(
            punches = result.punches.len(),
            rejects = result.rejects.len(),
            "打卡文件解析完成"
        );
        Ok(result)
    }

    /// 行 → 打卡
    pub fn map_rows(&self, rows: Vec<SourceRow>) -> ImportResult<PunchImport> {
        if let Some(first) = rows.first() {
            let has = |aliases: &[&str]| {
                first
                    .fields
                    .keys()
                    .any(|k| aliases.iter().any(|a| k.eq_ignore_ascii_case(a)))
            };
            if !has(EMPLOYEE_ALIASES) {
                return Err(ImportError::MissingColumn(EMPLOYEE_ALIASES.join("|")));
            }
            if !has(TIMESTAMP_ALIASES) && !(has(DATE_ALIASES) && has(TIME_ALIASES)) {
                return Err(ImportError::MissingColumn(format!(
                    "{} or date + time",
                    TIMESTAMP_ALIASES.join("|")
                )));
            }
        }

        let mut result = PunchImport::default();
        for row in rows {
            match map_row(&row) {
                Ok(punch) => result.punches.push(punch),
                Err(e) => {
                    warn!(row = row.row, error = %e, "打卡行解析失败");
                    result.rejects.push(PunchReject {
                        row: row.row,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }
}

fn map_row(row: &SourceRow) -> ImportResult<RawPunch> {
    let external_id = row
        .get_any(EMPLOYEE_ALIASES)
        .ok_or_else(|| ImportError::EmptyField {
            row: row.row,
            field: "员工编号",
        })?;

    let raw_ts = match row.get_any(TIMESTAMP_ALIASES) {
        Some(ts) => ts.to_string(),
        None => match (row.get_any(DATE_ALIASES), row.get_any(TIME_ALIASES)) {
            (Some(d), Some(t)) => format!("{} {}", d, t),
            _ => {
                return Err(ImportError::EmptyField {
                    row: row.row,
                    field: "打卡时间",
                })
            }
        },
    };

    let timestamp = parse_timestamp(&raw_ts).ok_or_else(|| ImportError::TimestampParse {
        row: row.row,
        value: raw_ts.clone(),
    })?;

    let mut punch = RawPunch::new(external_id, timestamp);
    punch.device_reported_state = row.get_any(STATE_ALIASES).and_then(|s| s.parse().ok());
    Ok(punch)
}

// ==========================================
// PunchSource - 打卡来源
// ==========================================
/// "给出 [start, end] 内的全部打卡"
#[async_trait]
pub trait PunchSource: Send + Sync {
    async fn fetch_punches(&self, start: NaiveDate, end: NaiveDate) -> ImportResult<PunchImport>;
}

/// 基于导出文件的打卡来源
pub struct FilePunchSource {
    path: PathBuf,
    carry_until: NaiveTime,
    importer: PunchFileImporter,
}

impl FilePunchSource {
    /// # 参数
    /// - path: 导出文件
    /// - carry_until: 夜班顺延截止时刻 (与 reconcile.night_carryover_until 一致)
    pub fn new(path: impl Into<PathBuf>, carry_until: NaiveTime) -> Self {
        Self {
            path: path.into(),
            carry_until,
            importer: PunchFileImporter::new(),
        }
    }
}

#[async_trait]
impl PunchSource for FilePunchSource {
    async fn fetch_punches(&self, start: NaiveDate, end: NaiveDate) -> ImportResult<PunchImport> {
        let path = self.path.clone();
        let importer = self.importer;
        let mut result = tokio::task::spawn_blocking(move || importer.load(path)).await??;

        result.retain_range(start, end, self.carry_until);
        Ok(result)
    }
}
