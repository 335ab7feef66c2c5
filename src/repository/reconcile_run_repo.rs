// ==========================================
// 考勤核算引擎 - 批次台账仓储
// ==========================================
// 表: reconcile_run
// 职责: 每个批次一行 (报告 JSON + 生效配置快照), 仅供追溯
// ==========================================

use crate::engine::report::BatchReport;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::store::RunLedger;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 台账行
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileRunEntry {
    pub run_id: String,
    pub run_kind: String,
    pub started_at: String,
    pub finished_at: String,
    pub report_json: String,
    pub config_snapshot_json: Option<String>,
}

impl ReconcileRunEntry {
    /// 解析回报告对象
    pub fn report(&self) -> RepositoryResult<BatchReport> {
        Ok(serde_json::from_str(&self.report_json)?)
    }
}

pub struct ReconcileRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReconcileRunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入批次台账
    ///
    /// # 参数
    /// - report: 已 finish 的批次报告
    /// - config_snapshot_json: 生效配置快照
    pub fn insert(&self, report: &BatchReport, config_snapshot_json: Option<&str>) -> RepositoryResult<()> {
        let report_json = serde_json::to_string(report)?;
        let finished_at = report.finished_at.unwrap_or(report.started_at);

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO reconcile_run (
                run_id, run_kind, started_at, finished_at, report_json, config_snapshot_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                report.run_id,
                report.run_kind.as_str(),
                report.started_at.to_rfc3339(),
                finished_at.to_rfc3339(),
                report_json,
                config_snapshot_json,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<ReconcileRunEntry>> {
        let conn = self.get_conn()?;
        let entry = conn
            .query_row(
                r#"
                SELECT run_id, run_kind, started_at, finished_at, report_json, config_snapshot_json
                FROM reconcile_run WHERE run_id = ?1
                "#,
                params![run_id],
                |row| {
                    Ok(ReconcileRunEntry {
                        run_id: row.get(0)?,
                        run_kind: row.get(1)?,
                        started_at: row.get(2)?,
                        finished_at: row.get(3)?,
                        report_json: row.get(4)?,
                        config_snapshot_json: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// 最近的批次 (按开始时间倒序)
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ReconcileRunEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, run_kind, started_at, finished_at, report_json, config_snapshot_json
            FROM reconcile_run ORDER BY started_at DESC LIMIT ?1
            "#,
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ReconcileRunEntry {
                    run_id: row.get(0)?,
                    run_kind: row.get(1)?,
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    report_json: row.get(4)?,
                    config_snapshot_json: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl RunLedger for ReconcileRunRepository {
    fn record_run(&self, report: &BatchReport, config_snapshot_json: Option<&str>) -> RepositoryResult<()> {
        self.insert(report, config_snapshot_json)
    }
}
