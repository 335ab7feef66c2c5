// ==========================================
// 考勤核算引擎 - 考勤记录仓储
// ==========================================
// 表: attendance_record, 主键 (employee_id, attendance_date)
// 红线: Repository 不做业务逻辑, 只做数据映射
// 红线: 已过账记录只读, 读-比较-写在同一事务内完成
// ==========================================

use crate::domain::attendance::{AttendanceQuery, AttendanceRecord, RecordKey};
use crate::domain::types::{AttendanceSource, PostingStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::store::{AttendanceStore, RecomputedDay, StoredRow, WriteOutcome};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

const SELECT_COLUMNS: &str = r#"
    ar.employee_id, ar.attendance_date, ar.time_in, ar.time_out, ar.break_in,
    ar.break_out, ar.next_day_timeout, ar.is_nightshift, ar.hours_worked,
    ar.late_minutes, ar.undertime_minutes, ar.missing_punch, ar.remarks,
    ar.source, ar.posting_status
"#;

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn fmt_time(t: Option<NaiveTime>) -> Option<String> {
    t.map(|t| t.format(TIME_FORMAT).to_string())
}

fn parse_date(field: &'static str, raw: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| RepositoryError::field(field, format!("{}: {}", raw, e)))
}

fn parse_time(field: &'static str, raw: Option<String>) -> RepositoryResult<Option<NaiveTime>> {
    raw.map(|s| {
        NaiveTime::parse_from_str(&s, TIME_FORMAT)
            .map_err(|e| RepositoryError::field(field, format!("{}: {}", s, e)))
    })
    .transpose()
}

/// 行中的原始值 (先整体取出, 再逐字段解码)
struct RawRow {
    employee_id: i64,
    attendance_date: String,
    time_in: Option<String>,
    time_out: Option<String>,
    break_in: Option<String>,
    break_out: Option<String>,
    next_day_timeout: Option<String>,
    is_nightshift: bool,
    hours_worked: f64,
    late_minutes: f64,
    undertime_minutes: f64,
    missing_punch: bool,
    remarks: Option<String>,
    source: String,
    posting_status: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            employee_id: row.get(0)?,
            attendance_date: row.get(1)?,
            time_in: row.get(2)?,
            time_out: row.get(3)?,
            break_in: row.get(4)?,
            break_out: row.get(5)?,
            next_day_timeout: row.get(6)?,
            is_nightshift: row.get(7)?,
            hours_worked: row.get(8)?,
            late_minutes: row.get(9)?,
            undertime_minutes: row.get(10)?,
            missing_punch: row.get(11)?,
            remarks: row.get(12)?,
            source: row.get(13)?,
            posting_status: row.get(14)?,
        })
    }

    fn key(&self) -> Option<RecordKey> {
        NaiveDate::parse_from_str(&self.attendance_date, DATE_FORMAT)
            .ok()
            .map(|attendance_date| RecordKey {
                employee_id: self.employee_id,
                attendance_date,
            })
    }

    fn decode(self) -> RepositoryResult<AttendanceRecord> {
        let source = self
            .source
            .parse::<AttendanceSource>()
            .map_err(|e| RepositoryError::field("source", e))?;
        let posting_status = self
            .posting_status
            .parse::<PostingStatus>()
            .map_err(|e| RepositoryError::field("posting_status", e))?;

        Ok(AttendanceRecord {
            employee_id: self.employee_id,
            attendance_date: parse_date("attendance_date", &self.attendance_date)?,
            time_in: parse_time("time_in", self.time_in)?,
            time_out: parse_time("time_out", self.time_out)?,
            break_in: parse_time("break_in", self.break_in)?,
            break_out: parse_time("break_out", self.break_out)?,
            next_day_timeout: parse_time("next_day_timeout", self.next_day_timeout)?,
            is_nightshift: self.is_nightshift,
            hours_worked: self.hours_worked,
            late_minutes: self.late_minutes,
            undertime_minutes: self.undertime_minutes,
            missing_punch: self.missing_punch,
            remarks: self.remarks,
            source,
            posting_status,
        })
    }
}

// ==========================================
// AttendanceRepository - 考勤记录仓储
// ==========================================
pub struct AttendanceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AttendanceRepository {
    /// 创建新的考勤记录仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    fn select_one(conn: &Connection, key: RecordKey) -> RepositoryResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_record ar WHERE ar.employee_id = ?1 AND ar.attendance_date = ?2",
            SELECT_COLUMNS
        );
        let raw = conn
            .query_row(
                &sql,
                params![key.employee_id, fmt_date(key.attendance_date)],
                RawRow::read,
            )
            .optional()?;

        raw.map(RawRow::decode).transpose()
    }

    fn insert(conn: &Connection, r: &AttendanceRecord) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO attendance_record (
                employee_id, attendance_date, time_in, time_out, break_in,
                break_out, next_day_timeout, is_nightshift, hours_worked,
                late_minutes, undertime_minutes, missing_punch, remarks,
                source, posting_status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                r.employee_id,
                fmt_date(r.attendance_date),
                fmt_time(r.time_in),
                fmt_time(r.time_out),
                fmt_time(r.break_in),
                fmt_time(r.break_out),
                fmt_time(r.next_day_timeout),
                r.is_nightshift,
                r.hours_worked,
                r.late_minutes,
                r.undertime_minutes,
                r.missing_punch,
                r.remarks,
                r.source.as_str(),
                r.posting_status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// 更新时间/计算/标注字段; 过账状态不经此路径修改
    fn update(conn: &Connection, r: &AttendanceRecord) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE attendance_record SET
                time_in = ?3, time_out = ?4, break_in = ?5, break_out = ?6,
                next_day_timeout = ?7, is_nightshift = ?8, hours_worked = ?9,
                late_minutes = ?10, undertime_minutes = ?11, missing_punch = ?12,
                remarks = ?13, source = ?14, updated_at = datetime('now')
            WHERE employee_id = ?1 AND attendance_date = ?2 AND posting_status = 'not_posted'
            "#,
            params![
                r.employee_id,
                fmt_date(r.attendance_date),
                fmt_time(r.time_in),
                fmt_time(r.time_out),
                fmt_time(r.break_in),
                fmt_time(r.break_out),
                fmt_time(r.next_day_timeout),
                r.is_nightshift,
                r.hours_worked,
                r.late_minutes,
                r.undertime_minutes,
                r.missing_punch,
                r.remarks,
                r.source.as_str(),
            ],
        )?;
        Ok(())
    }

    /// 事务内: 与当前行比较后写入
    fn apply_draft(
        conn: &Connection,
        existing: Option<AttendanceRecord>,
        draft: &AttendanceRecord,
    ) -> RepositoryResult<WriteOutcome> {
        match existing {
            Some(existing) if existing.posting_status.is_posted() => Ok(WriteOutcome::SkippedPosted),
            Some(existing) => {
                let changed_fields = existing.changed_fields(draft);
                if changed_fields.is_empty() {
                    Ok(WriteOutcome::Unchanged)
                } else {
                    Self::update(conn, draft)?;
                    Ok(WriteOutcome::Updated { changed_fields })
                }
            }
            None => {
                Self::insert(conn, draft)?;
                Ok(WriteOutcome::Created)
            }
        }
    }

    /// 过账 (not_posted → posted)
    ///
    /// 供外部薪资流程调用, 核算引擎自身不调用
    ///
    /// # 返回
    /// - Ok(rows): 本次新过账的记录数
    pub fn mark_posted(
        &self,
        employee_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE attendance_record
            SET posting_status = 'posted', updated_at = datetime('now')
            WHERE employee_id = ?1
              AND attendance_date BETWEEN ?2 AND ?3
              AND posting_status = 'not_posted'
            "#,
            params![employee_id, fmt_date(start_date), fmt_date(end_date)],
        )?;
        Ok(rows)
    }

    /// 记录总数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM attendance_record", [], |row| row.get(0))?;
        Ok(n)
    }
}

impl AttendanceStore for AttendanceRepository {
    fn reconcile_day(&self, draft: &AttendanceRecord) -> RepositoryResult<WriteOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existing = Self::select_one(&tx, draft.key())?;
        let outcome = Self::apply_draft(&tx, existing, draft)?;

        tx.commit()?;

        debug!(
            employee_id = draft.employee_id,
            attendance_date = %draft.attendance_date,
            outcome = ?outcome,
            "考勤记录对账完成"
        );
        Ok(outcome)
    }

    fn recompute_day(
        &self,
        key: RecordKey,
        recompute: &dyn Fn(&AttendanceRecord) -> AttendanceRecord,
    ) -> RepositoryResult<Option<RecomputedDay>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let Some(existing) = Self::select_one(&tx, key)? else {
            return Ok(None);
        };
        if existing.posting_status.is_posted() {
            return Ok(Some(RecomputedDay {
                outcome: WriteOutcome::SkippedPosted,
                missing_punch: existing.missing_punch,
            }));
        }

        let draft = recompute(&existing);
        let outcome = Self::apply_draft(&tx, Some(existing), &draft)?;

        tx.commit()?;

        debug!(
            employee_id = key.employee_id,
            attendance_date = %key.attendance_date,
            outcome = ?outcome,
            "考勤记录重算完成"
        );
        Ok(Some(RecomputedDay {
            outcome,
            missing_punch: draft.missing_punch,
        }))
    }

    fn find_by_key(&self, key: RecordKey) -> RepositoryResult<Option<AttendanceRecord>> {
        let conn = self.get_conn()?;
        Self::select_one(&conn, key)
    }

    fn find_by_query(&self, query: &AttendanceQuery) -> RepositoryResult<Vec<StoredRow>> {
        let mut sql = format!(
            "SELECT {} FROM attendance_record ar JOIN employee e ON e.employee_id = ar.employee_id WHERE 1 = 1",
            SELECT_COLUMNS
        );
        let mut args: Vec<String> = Vec::new();

        if let Some(start) = query.start_date {
            args.push(fmt_date(start));
            sql.push_str(&format!(" AND ar.attendance_date >= ?{}", args.len()));
        }
        if let Some(end) = query.end_date {
            args.push(fmt_date(end));
            sql.push_str(&format!(" AND ar.attendance_date <= ?{}", args.len()));
        }
        if let Some(employee_id) = query.employee_id {
            args.push(employee_id.to_string());
            sql.push_str(&format!(" AND ar.employee_id = CAST(?{} AS INTEGER)", args.len()));
        }
        if let Some(department) = &query.department {
            args.push(department.clone());
            sql.push_str(&format!(" AND e.department = ?{}", args.len()));
        }
        if let Some(status) = query.posting_status {
            args.push(status.as_str().to_string());
            sql.push_str(&format!(" AND ar.posting_status = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY ar.employee_id, ar.attendance_date");

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params_from_iter(args.iter()), RawRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raws
            .into_iter()
            .map(|raw| StoredRow {
                key: raw.key(),
                record: raw.decode(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Mutex<Connection>>, AttendanceRepository) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO employee (employee_id, external_id, full_name, department) VALUES (1, 'E001', 'Ana', 'Ops')",
            [],
        )
        .unwrap();

        let conn = Arc::new(Mutex::new(conn));
        let repo = AttendanceRepository::new(conn.clone());
        (conn, repo)
    }

    fn draft() -> AttendanceRecord {
        let mut r = AttendanceRecord::new(
            1,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            AttendanceSource::Biometric,
        );
        r.time_in = NaiveTime::from_hms_opt(8, 5, 0);
        r.time_out = NaiveTime::from_hms_opt(17, 16, 0);
        r.hours_worked = 8.92;
        r.late_minutes = 5.0;
        r
    }

    #[test]
    fn test_reconcile_insert_then_unchanged() {
        let (_conn, repo) = setup();
        let d = draft();

        assert_eq!(repo.reconcile_day(&d).unwrap(), WriteOutcome::Created);
        assert_eq!(repo.reconcile_day(&d).unwrap(), WriteOutcome::Unchanged);

        let stored = repo.find_by_key(d.key()).unwrap().unwrap();
        assert_eq!(stored, d);
    }

    #[test]
    fn test_reconcile_reports_changed_fields() {
        let (_conn, repo) = setup();
        let mut d = draft();
        repo.reconcile_day(&d).unwrap();

        d.late_minutes = 0.0;
        match repo.reconcile_day(&d).unwrap() {
            WriteOutcome::Updated { changed_fields } => assert_eq!(changed_fields, vec!["late_minutes"]),
            other => panic!("期望 Updated, 实际 {:?}", other),
        }
    }

    #[test]
    fn test_posted_record_is_never_modified() {
        let (_conn, repo) = setup();
        let mut d = draft();
        repo.reconcile_day(&d).unwrap();
        assert_eq!(repo.mark_posted(1, d.attendance_date, d.attendance_date).unwrap(), 1);

        d.hours_worked = 1.0;
        assert_eq!(repo.reconcile_day(&d).unwrap(), WriteOutcome::SkippedPosted);

        let stored = repo.find_by_key(d.key()).unwrap().unwrap();
        assert_eq!(stored.hours_worked, 8.92);
        assert_eq!(stored.posting_status, PostingStatus::Posted);
    }

    #[test]
    fn test_find_by_query_keeps_corrupt_rows_separate() {
        let (conn, repo) = setup();
        repo.reconcile_day(&draft()).unwrap();
        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO attendance_record (employee_id, attendance_date, time_in, source) VALUES (1, '2026-03-03', 'garbage', 'biometric')",
                [],
            )
            .unwrap();

        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let rows = repo
            .find_by_query(&AttendanceQuery::date_range(start, end).with_department("Ops"))
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.is_ok());
        assert!(rows[1].record.is_err());
        assert!(rows[1].key.is_some());

        let none = repo
            .find_by_query(&AttendanceQuery::date_range(start, end).with_department("Finance"))
            .unwrap();
        assert!(none.is_empty());
    }
}
