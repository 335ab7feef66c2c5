// ==========================================
// 考勤核算引擎 - 核算参数
// ==========================================
// 职责: 所有启发式常量 (班次窗口/取整/工时下限/休息上限)
// 红线: 以值对象形式传入引擎函数, 不做全局单例
// ==========================================

use crate::domain::types::ShiftKind;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn hms(hour: u32, minute: u32, second: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN)
}

// ==========================================
// AttendanceConfig - 核算参数总集
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttendanceConfig {
    pub classifier: ClassifierConfig,
    pub shift: ShiftConfig,
    pub metrics: MetricsConfig,
    pub reconcile: ReconcileConfig,
}

// ==========================================
// ClassifierConfig - 打卡归类参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// 单次打卡: 早于该时刻视为上班卡
    pub midday_cutoff: NaiveTime,
    /// 标准上班时刻
    pub workday_start: NaiveTime,
    /// 标准下班时刻
    pub workday_end: NaiveTime,
    /// "明显晚于/早于" 标准时刻的偏差 (分钟)
    pub workday_deviation_minutes: i64,
    /// 三次打卡: 间隔超过该值视为此处缺休息卡
    pub missing_break_gap_minutes: i64,
    /// 四次打卡: 第 2/3 次间隔超过该值才考虑两段班
    pub double_shift_gap_minutes: i64,
    /// 午休窗口, 第 3 次打卡落在窗口内视为休息返岗
    pub lunch_window_start: NaiveTime,
    pub lunch_window_end: NaiveTime,
    /// 休息时长上限 (分钟), 超出视为班段分隔
    pub max_break_minutes: i64,
    /// 多次打卡: 短间隔 (分钟), 偏向休息边界
    pub short_gap_minutes: i64,
    /// 多次打卡 (奇数): 异常长间隔 (分钟), 提示缺卡
    pub anomalous_gap_minutes: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            midday_cutoff: hm(12, 0),
            workday_start: hm(8, 0),
            workday_end: hm(17, 0),
            workday_deviation_minutes: 60,
            missing_break_gap_minutes: 180,
            double_shift_gap_minutes: 30,
            lunch_window_start: hm(11, 0),
            lunch_window_end: hm(14, 0),
            max_break_minutes: 240,
            short_gap_minutes: 30,
            anomalous_gap_minutes: 120,
        }
    }
}

// ==========================================
// ShiftBucket - 班次识别窗口
// ==========================================
// from > to 表示跨零点窗口 (例如 21:00 ~ 05:59:59)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftBucket {
    pub from: NaiveTime,
    pub to: NaiveTime,
    pub expected_time_in: NaiveTime,
    pub kind: ShiftKind,
}

impl ShiftBucket {
    pub fn new(from: NaiveTime, to: NaiveTime, expected_time_in: NaiveTime, kind: ShiftKind) -> Self {
        Self {
            from,
            to,
            expected_time_in,
            kind,
        }
    }

    /// 闭区间判断, 支持跨零点
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.from <= self.to {
            t >= self.from && t <= self.to
        } else {
            t >= self.from || t <= self.to
        }
    }
}

// ==========================================
// ShiftConfig - 班次识别参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// 优先: 按下班时间识别
    pub by_time_out: Vec<ShiftBucket>,
    /// 回退: 按上班时间识别
    pub by_time_in: Vec<ShiftBucket>,
    /// 均未命中时的应到时间
    pub fallback_time_in: NaiveTime,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            by_time_out: vec![
                ShiftBucket::new(hm(16, 30), hm(17, 30), hm(8, 0), ShiftKind::Day),
                ShiftBucket::new(hm(17, 30), hm(18, 30), hm(9, 0), ShiftKind::LateDay),
                ShiftBucket::new(hm(1, 0), hms(3, 59, 59), hm(18, 0), ShiftKind::Evening),
                ShiftBucket::new(hm(6, 0), hms(8, 59, 59), hm(22, 0), ShiftKind::Night),
            ],
            by_time_in: vec![
                ShiftBucket::new(hm(6, 0), hms(10, 59, 59), hm(8, 0), ShiftKind::Day),
                ShiftBucket::new(hm(13, 0), hms(16, 59, 59), hm(14, 0), ShiftKind::Afternoon),
                ShiftBucket::new(hm(17, 0), hms(20, 59, 59), hm(18, 0), ShiftKind::Evening),
                ShiftBucket::new(hm(21, 0), hms(5, 59, 59), hm(22, 0), ShiftKind::Night),
            ],
            fallback_time_in: hm(8, 0),
        }
    }
}

// ==========================================
// MetricsConfig - 工时计算参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// 标准工作日分钟数 (9 小时)
    pub minimum_workday_minutes: i64,
    /// 早退宽限: 不足该值的差额不计
    pub undertime_grace_minutes: i64,
    /// 休息扣减上限
    pub break_cap_minutes: i64,
    /// 休息超上限时的固定扣减
    pub fallback_break_minutes: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            minimum_workday_minutes: 9 * 60,
            undertime_grace_minutes: 60,
            break_cap_minutes: 240,
            fallback_break_minutes: 60,
        }
    }
}

// ==========================================
// ReconcileConfig - 批处理参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// 并发处理单元数
    pub max_workers: usize,
    /// 夜班续接: 当天最后一次打卡不早于该时刻
    pub night_carryover_from: NaiveTime,
    /// 夜班续接: 次日早于该时刻的打卡归入前一天
    pub night_carryover_until: NaiveTime,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            night_carryover_from: hm(17, 0),
            night_carryover_until: hm(9, 0),
        }
    }
}
