// ==========================================
// 考勤核算引擎 - 领域类型定义
// ==========================================
// 职责: 打卡角色 / 记录来源 / 过账状态
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 打卡角色 (Punch Role)
// ==========================================
// BreakIn = 开始休息, BreakOut = 休息结束返岗
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchRole {
    ClockIn,  // 上班
    BreakIn,  // 开始休息
    BreakOut, // 休息结束
    ClockOut, // 下班
}

impl PunchRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchRole::ClockIn => "clock_in",
            PunchRole::BreakIn => "break_in",
            PunchRole::BreakOut => "break_out",
            PunchRole::ClockOut => "clock_out",
        }
    }

    /// 该角色之后员工是否仍处于在岗状态
    pub fn leaves_employee_on_shift(&self) -> bool {
        matches!(self, PunchRole::ClockIn | PunchRole::BreakOut)
    }
}

impl fmt::Display for PunchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 记录来源 (Attendance Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceSource {
    Biometric,  // 考勤机
    Manual,     // 人工录入
    Import,     // 文件导入
    SlvlSync,   // 假期同步
    HolidaySet, // 节假日设定
}

impl AttendanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceSource::Biometric => "biometric",
            AttendanceSource::Manual => "manual",
            AttendanceSource::Import => "import",
            AttendanceSource::SlvlSync => "slvl_sync",
            AttendanceSource::HolidaySet => "holiday_set",
        }
    }
}

impl fmt::Display for AttendanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttendanceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "biometric" => Ok(AttendanceSource::Biometric),
            "manual" => Ok(AttendanceSource::Manual),
            "import" => Ok(AttendanceSource::Import),
            "slvl_sync" => Ok(AttendanceSource::SlvlSync),
            "holiday_set" => Ok(AttendanceSource::HolidaySet),
            other => Err(format!("未知的记录来源: {}", other)),
        }
    }
}

// ==========================================
// 过账状态 (Posting Status)
// ==========================================
// 红线: posted 为终态, 引擎不得再修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    NotPosted,
    Posted,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStatus::NotPosted => "not_posted",
            PostingStatus::Posted => "posted",
        }
    }

    pub fn is_posted(&self) -> bool {
        matches!(self, PostingStatus::Posted)
    }
}

impl fmt::Display for PostingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "not_posted" => Ok(PostingStatus::NotPosted),
            "posted" => Ok(PostingStatus::Posted),
            other => Err(format!("未知的过账状态: {}", other)),
        }
    }
}

// ==========================================
// 班次类型 (Shift Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftKind {
    Day,       // 白班 08:00
    LateDay,   // 晚开白班 09:00
    Afternoon, // 中班 14:00
    Evening,   // 晚班 18:00, 跨零点
    Night,     // 夜班 22:00, 跨零点
}

impl ShiftKind {
    pub fn crosses_midnight(&self) -> bool {
        matches!(self, ShiftKind::Evening | ShiftKind::Night)
    }
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftKind::Day => write!(f, "day"),
            ShiftKind::LateDay => write!(f, "late_day"),
            ShiftKind::Afternoon => write!(f, "afternoon"),
            ShiftKind::Evening => write!(f, "evening"),
            ShiftKind::Night => write!(f, "night"),
        }
    }
}
