// ==========================================
// 考勤核算引擎 - 考勤记录领域模型
// ==========================================
// 主键: (employee_id, attendance_date), 每人每天一条
// 红线: posting_status = posted 的记录对引擎只读
// ==========================================

use crate::domain::types::{AttendanceSource, PostingStatus};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// AttendanceRecord - 日考勤记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    // ===== 主键 =====
    pub employee_id: i64,
    pub attendance_date: NaiveDate,

    // ===== 打卡时间 =====
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
    pub break_in: Option<NaiveTime>,  // 开始休息
    pub break_out: Option<NaiveTime>, // 休息结束
    pub next_day_timeout: Option<NaiveTime>, // 跨零点下班时间, 仅夜班
    pub is_nightshift: bool,

    // ===== 计算结果 =====
    pub hours_worked: f64,
    pub late_minutes: f64,
    pub undertime_minutes: f64,

    // ===== 标注 =====
    pub missing_punch: bool,
    pub remarks: Option<String>,

    // ===== 状态 =====
    pub source: AttendanceSource,
    pub posting_status: PostingStatus,
}

impl AttendanceRecord {
    /// 创建空白记录 (未过账)
    pub fn new(employee_id: i64, attendance_date: NaiveDate, source: AttendanceSource) -> Self {
        Self {
            employee_id,
            attendance_date,
            time_in: None,
            time_out: None,
            break_in: None,
            break_out: None,
            next_day_timeout: None,
            is_nightshift: false,
            hours_worked: 0.0,
            late_minutes: 0.0,
            undertime_minutes: 0.0,
            missing_punch: false,
            remarks: None,
            source,
            posting_status: PostingStatus::NotPosted,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            employee_id: self.employee_id,
            attendance_date: self.attendance_date,
        }
    }

    /// 实际下班时间: 夜班跨零点时取 next_day_timeout
    pub fn effective_time_out(&self) -> Option<NaiveTime> {
        if self.is_nightshift {
            self.next_day_timeout.or(self.time_out)
        } else {
            self.time_out
        }
    }

    pub fn has_any_punch(&self) -> bool {
        self.time_in.is_some()
            || self.time_out.is_some()
            || self.break_in.is_some()
            || self.break_out.is_some()
            || self.next_day_timeout.is_some()
    }

    /// 半天: 有打卡数据但工时为 0 (派生字段, 不落库)
    pub fn is_halfday(&self) -> bool {
        self.hours_worked == 0.0 && self.has_any_punch()
    }

    /// 逐字段比较, 返回发生变化的字段名
    ///
    /// 用于幂等写入: 无变化则不写库
    pub fn changed_fields(&self, other: &AttendanceRecord) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if self.time_in != other.time_in {
            changed.push("time_in");
        }
        if self.time_out != other.time_out {
            changed.push("time_out");
        }
        if self.break_in != other.break_in {
            changed.push("break_in");
        }
        if self.break_out != other.break_out {
            changed.push("break_out");
        }
        if self.next_day_timeout != other.next_day_timeout {
            changed.push("next_day_timeout");
        }
        if self.is_nightshift != other.is_nightshift {
            changed.push("is_nightshift");
        }
        if self.hours_worked.to_bits() != other.hours_worked.to_bits() {
            changed.push("hours_worked");
        }
        if self.late_minutes.to_bits() != other.late_minutes.to_bits() {
            changed.push("late_minutes");
        }
        if self.undertime_minutes.to_bits() != other.undertime_minutes.to_bits() {
            changed.push("undertime_minutes");
        }
        if self.missing_punch != other.missing_punch {
            changed.push("missing_punch");
        }
        if self.remarks != other.remarks {
            changed.push("remarks");
        }
        if self.source != other.source {
            changed.push("source");
        }

        changed
    }
}

// ==========================================
// RecordKey - 记录主键
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub employee_id: i64,
    pub attendance_date: NaiveDate,
}

// ==========================================
// AttendanceQuery - 记录范围查询
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub employee_id: Option<i64>,
    pub department: Option<String>,
    pub posting_status: Option<PostingStatus>,
}

impl AttendanceQuery {
    pub fn date_range(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Default::default()
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_posting_status(mut self, status: PostingStatus) -> Self {
        self.posting_status = Some(status);
        self
    }

    pub fn with_employee(mut self, employee_id: i64) -> Self {
        self.employee_id = Some(employee_id);
        self
    }
}
