// ==========================================
// 考勤核算引擎 - 工时计算引擎
// ==========================================
// 职责: 由上/下班/休息时间 + 应到时间计算 工时/迟到/早退/半天
// 输入: MetricsInput + 应到时间 + MetricsConfig
// 输出: DayMetrics
// 红线: 纯函数; 相同输入得到逐位相同的结果 (重算幂等)
// ==========================================

use crate::config::MetricsConfig;
use crate::domain::attendance::AttendanceRecord;
use crate::domain::types::PunchRole;
use crate::engine::time_utils::{
    anchor, minutes_between, minutes_late, minutes_to_hours, round_down_to_hour,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// 计算产生的标注前缀 (重算时会重新生成)
pub const STILL_CLOCKED_IN: &str = "STILL_CLOCKED_IN";
pub const BREAK_OVER_CAP: &str = "BREAK_OVER_CAP";

/// 两段班标注前缀 (归类产生, 重算时保留)
pub const DOUBLE_SHIFT: &str = "DOUBLE_SHIFT";

// ==========================================
// MetricsInput - 计算输入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsInput {
    pub attendance_date: NaiveDate,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
    pub next_day_timeout: Option<NaiveTime>,
    pub break_in: Option<NaiveTime>,
    pub break_out: Option<NaiveTime>,
    pub is_nightshift: bool,
    /// break_in/break_out 为两段班之间的下班间隔, 全额扣减, 不受休息上限约束
    pub double_shift: bool,
    /// 归类得到的最后一次打卡角色; 人工记录为 None, 由字段推断
    pub last_role: Option<PunchRole>,
}

impl MetricsInput {
    /// 从已有记录构造 (重算入口)
    pub fn from_record(record: &AttendanceRecord) -> Self {
        Self {
            attendance_date: record.attendance_date,
            time_in: record.time_in,
            time_out: record.time_out,
            next_day_timeout: record.next_day_timeout,
            break_in: record.break_in,
            break_out: record.break_out,
            is_nightshift: record.is_nightshift,
            double_shift: record
                .remarks
                .as_deref()
                .is_some_and(|r| r.split("; ").any(|part| part.starts_with(DOUBLE_SHIFT))),
            last_role: None,
        }
    }

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
            || self.next_day_timeout.is_some()
            || self.break_in.is_some()
            || self.break_out.is_some()
    }

    fn inferred_last_role(&self) -> PunchRole {
        if let Some(role) = self.last_role {
            return role;
        }
        if self.effective_time_out().is_some() {
            PunchRole::ClockOut
        } else if self.break_out.is_some() {
            PunchRole::BreakOut
        } else if self.break_in.is_some() {
            PunchRole::BreakIn
        } else {
            PunchRole::ClockIn
        }
    }

    /// 锚定到考勤日; 夜班时早于上班时刻的时间顺延到次日
    fn anchor_shift_time(&self, in_dt: NaiveDateTime, t: NaiveTime) -> NaiveDateTime {
        let dt = anchor(self.attendance_date, t);
        if self.is_nightshift && dt < in_dt {
            dt + Duration::days(1)
        } else {
            dt
        }
    }
}

// ==========================================
// DayMetrics - 计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayMetrics {
    pub expected_time_in: NaiveTime,
    pub rounded_time_out: Option<NaiveTime>,
    pub break_minutes: i64,
    pub worked_minutes: i64,
    pub hours_worked: f64,
    pub late_minutes: f64,
    pub undertime_minutes: f64,
    pub is_halfday: bool,
    pub still_clocked_in: bool,
    pub break_over_cap: bool,
}

impl DayMetrics {
    fn empty(expected_time_in: NaiveTime) -> Self {
        Self {
            expected_time_in,
            rounded_time_out: None,
            break_minutes: 0,
            worked_minutes: 0,
            hours_worked: 0.0,
            late_minutes: 0.0,
            undertime_minutes: 0.0,
            is_halfday: false,
            still_clocked_in: false,
            break_over_cap: false,
        }
    }

    /// 计算产生的标注, 顺序固定
    pub fn annotations(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.still_clocked_in {
            notes.push(format!("{}: no clock-out recorded yet", STILL_CLOCKED_IN));
        }
        if self.break_over_cap {
            notes.push(format!(
                "{}: break exceeds cap, deducted {} min",
                BREAK_OVER_CAP, self.break_minutes
            ));
        }
        notes
    }
}

// ==========================================
// MetricsCalculator - 工时计算器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsCalculator;

impl MetricsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 计算单日指标
    ///
    /// 步骤:
    /// 1) 迟到 = max(0, 上班 - 应到), 与当天总工时无关
    /// 2) 下班卡向下取整到整点, 上班卡不取整
    /// 3) 夜班且取整后下班早于上班 → 下班 +24h
    /// 4) 休息两端都落在 [上班, 未取整下班] 内才扣减, 超上限按固定值扣;
    ///    两段班的下班间隔全额扣减
    /// 5) 工时 = (取整下班 - 上班 - 休息) / 60, 不小于 0, 两位小数
    /// 6) 工时为 0 但有打卡 → 半天, 迟到/早退清零
    /// 7) 早退: 非半天, 工时 > 0, 有下班卡; 差额不足宽限值不计
    /// 8) 无下班卡且仍在岗 → 标注仍在岗, 不猜测下班时间
    pub fn compute(
        &self,
        input: &MetricsInput,
        expected_time_in: NaiveTime,
        config: &MetricsConfig,
    ) -> DayMetrics {
        let mut metrics = DayMetrics::empty(expected_time_in);
        let has_any_punch = input.has_any_punch();

        // 无上班卡: 视为缺勤, 全部指标为 0
        let time_in = match input.time_in {
            Some(t) => t,
            None => {
                metrics.is_halfday = has_any_punch;
                return metrics;
            }
        };
        let in_dt = anchor(input.attendance_date, time_in);

        // 1) 迟到
        let late = minutes_late(time_in, expected_time_in);

        match input.effective_time_out() {
            None => {
                metrics.still_clocked_in = input.inferred_last_role().leaves_employee_on_shift();
            }
            Some(out) => {
                // 2) 3) 取整与跨零点
                let raw_out_dt = input.anchor_shift_time(in_dt, out);
                let rounded = round_down_to_hour(out);
                let rounded_dt = input.anchor_shift_time(in_dt, rounded);
                metrics.rounded_time_out = Some(rounded);

                // 4) 休息扣减
                if let (Some(bi), Some(bo)) = (input.break_in, input.break_out) {
                    let bi_dt = input.anchor_shift_time(in_dt, bi);
                    let bo_dt = input.anchor_shift_time(in_dt, bo);
                    let inside = |dt: NaiveDateTime| dt >= in_dt && dt <= raw_out_dt;

                    if inside(bi_dt) && inside(bo_dt) {
                        let span = minutes_between(bi_dt, bo_dt).abs();
                        if span > config.break_cap_minutes && !input.double_shift {
                            metrics.break_minutes = config.fallback_break_minutes;
                            metrics.break_over_cap = true;
                        } else {
                            metrics.break_minutes = span;
                        }
                    }
                }

                // 5) 工时
                metrics.worked_minutes =
                    (minutes_between(in_dt, rounded_dt) - metrics.break_minutes).max(0);
            }
        }

        metrics.hours_worked = minutes_to_hours(metrics.worked_minutes);
        metrics.late_minutes = late as f64;

        // 6) 半天
        if metrics.hours_worked == 0.0 && has_any_punch {
            metrics.is_halfday = true;
            metrics.late_minutes = 0.0;
            metrics.undertime_minutes = 0.0;
            return metrics;
        }

        // 7) 早退
        if metrics.hours_worked > 0.0 && input.effective_time_out().is_some() {
            let shortfall = config.minimum_workday_minutes - metrics.worked_minutes;
            if shortfall >= config.undertime_grace_minutes {
                metrics.undertime_minutes = shortfall as f64;
            }
        }

        metrics
    }
}
