// ==========================================
// 考勤核算引擎 - 打卡领域模型
// ==========================================
// RawPunch: 考勤机/CSV 适配器产出, 不落库
// ClassifiedPunch: 单次批处理内产生, 折叠进考勤记录后丢弃
// ==========================================

use crate::domain::types::PunchRole;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// RawPunch - 原始打卡
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPunch {
    pub employee_external_id: String,       // 考勤机上的员工编号
    pub timestamp: NaiveDateTime,           // 本地时间
    pub device_reported_state: Option<i32>, // 考勤机上报状态 (不可靠, 仅留痕)
}

impl RawPunch {
    pub fn new(employee_external_id: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            employee_external_id: employee_external_id.into(),
            timestamp,
            device_reported_state: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }
}

// ==========================================
// PunchReject - 无法解析的原始打卡
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunchReject {
    pub row: usize, // 源文件行号 (含表头, 从 1 开始)
    pub reason: String,
}

// ==========================================
// ClassifiedPunch - 已归类打卡
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPunch {
    pub punch: RawPunch,
    pub role: PunchRole,
    pub missing_punch: bool,
    pub missing_punch_note: Option<String>,
}

impl ClassifiedPunch {
    pub fn new(punch: RawPunch, role: PunchRole) -> Self {
        Self {
            punch,
            role,
            missing_punch: false,
            missing_punch_note: None,
        }
    }

    /// 标记疑似缺卡, 多条说明以 "; " 拼接
    pub fn flag_missing(&mut self, note: impl Into<String>) {
        let note = note.into();
        self.missing_punch = true;
        self.missing_punch_note = Some(match self.missing_punch_note.take() {
            Some(existing) => format!("{}; {}", existing, note),
            None => note,
        });
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.punch.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_missing_accumulates_notes() {
        let ts = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut p = ClassifiedPunch::new(RawPunch::new("E001", ts), PunchRole::ClockIn);
        p.flag_missing("first");
        p.flag_missing("second");

        assert!(p.missing_punch);
        assert_eq!(p.missing_punch_note.as_deref(), Some("first; second"));
    }
}
