// ==========================================
// 考勤核算引擎 - 时间工具
// ==========================================
// 职责: 取整 / 时长 / 跨日锚定
// 红线: 纯函数, 无 I/O
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// 下班时间向下取整到整点 (17:59 → 17:00)
///
/// 只取整下班卡, 上班卡从不取整
pub fn round_down_to_hour(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), 0, 0).unwrap_or(t)
}

/// 将时间锚定到考勤日
pub fn anchor(date: NaiveDate, t: NaiveTime) -> NaiveDateTime {
    date.and_time(t)
}

/// 锚定到不早于 reference 的最近时刻 (早于 reference 则顺延一天)
pub fn anchor_not_before(reference: NaiveDateTime, t: NaiveTime) -> NaiveDateTime {
    let same_day = reference.date().and_time(t);
    if same_day < reference {
        same_day + Duration::days(1)
    } else {
        same_day
    }
}

/// from → to 的整分钟数 (截断), to 早于 from 时为负
pub fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_minutes()
}

/// 迟到分钟数, 支持应到时间在零点前的班次
///
/// 差值超过半天时按跨日处理: 应到 22:00 实到 00:10 → 迟到 130
pub fn minutes_late(actual: NaiveTime, expected: NaiveTime) -> i64 {
    let mut diff = (actual - expected).num_minutes();
    if diff < -(MINUTES_PER_DAY / 2) {
        diff += MINUTES_PER_DAY;
    } else if diff > MINUTES_PER_DAY / 2 {
        diff -= MINUTES_PER_DAY;
    }
    diff.max(0)
}

/// 闭区间窗口判断
pub fn within(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    t >= start && t <= end
}

/// 保留两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 分钟 → 小时 (两位小数)
pub fn minutes_to_hours(minutes: i64) -> f64 {
    round2(minutes as f64 / 60.0)
}
