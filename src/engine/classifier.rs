// ==========================================
// 考勤核算引擎 - 打卡归类引擎
// ==========================================
// 职责: 为单人单日的无序打卡推断角色 (上班/开始休息/休息结束/下班)
// 输入: 单人单日 RawPunch 集合 + ClassifierConfig
// 输出: 按时间升序的 ClassifiedPunch, 长度与输入一致
// 红线: 规则制, 必须给出答案; 不确定时标注 missing_punch, 不拒绝
// ==========================================

use crate::config::ClassifierConfig;
use crate::domain::punch::{ClassifiedPunch, RawPunch};
use crate::domain::types::PunchRole;
use crate::engine::time_utils::{minutes_between, within};
use chrono::{NaiveTime, Timelike};
use tracing::{debug, instrument};

use PunchRole::{BreakIn, BreakOut, ClockIn, ClockOut};

fn minute_of_day(t: NaiveTime) -> i64 {
    (t.num_seconds_from_midnight() / 60) as i64
}

fn fmt_hm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

// ==========================================
// PunchClassifier - 打卡归类引擎
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct PunchClassifier;

impl PunchClassifier {
    /// 创建新的打卡归类引擎
    pub fn new() -> Self {
        Self
    }

    /// 归类单人单日打卡
    ///
    /// 规则（按打卡次数分派）:
    /// - 1 次: 按时刻判定上班/下班, 标注缺卡
    /// - 2 次: 上班 + 下班
    /// - 3 次: 缺一次卡, 结合标准上下班时刻与间隔推断
    /// - 4 次: 默认 上班/开始休息/休息结束/下班, 中段长间隔判定为两段班
    /// - >4 偶数: 首尾为上下班, 中间按位置交替, 按间隔修正
    /// - >4 奇数: 同上, 并扫描异常长间隔标注缺卡
    #[instrument(skip(self, punches, config), fields(count = punches.len()))]
    pub fn classify(&self, mut punches: Vec<RawPunch>, config: &ClassifierConfig) -> Vec<ClassifiedPunch> {
        punches.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let classified = match punches.len() {
            0 => Vec::new(),
            1 => self.classify_single(punches, config),
            2 => assign(punches, &[ClockIn, ClockOut]),
            3 => self.classify_three(punches, config),
            4 => self.classify_four(punches, config),
            n if n % 2 == 0 => self.classify_even_many(punches, config),
            _ => self.classify_odd_many(punches, config),
        };

        debug!(
            roles = ?classified.iter().map(|p| p.role).collect::<Vec<_>>(),
            flagged = classified.iter().filter(|p| p.missing_punch).count(),
            "打卡归类完成"
        );

        classified
    }

    // ==========================================
    // 1 次打卡
    // ==========================================

    fn classify_single(&self, punches: Vec<RawPunch>, config: &ClassifierConfig) -> Vec<ClassifiedPunch> {
        let at = punches[0].time();
        let role = if at < config.midday_cutoff { ClockIn } else { ClockOut };

        let mut out = assign(punches, &[role]);
        let note = match role {
            ClockIn => format!(
                "MISSING_CLOCK_OUT: single punch at {} before {}",
                fmt_hm(at),
                fmt_hm(config.midday_cutoff)
            ),
            _ => format!(
                "MISSING_CLOCK_IN: single punch at {} at or after {}",
                fmt_hm(at),
                fmt_hm(config.midday_cutoff)
            ),
        };
        out[0].flag_missing(note);
        out
    }

    // ==========================================
    // 3 次打卡
    // ==========================================

    fn classify_three(&self, punches: Vec<RawPunch>, config: &ClassifierConfig) -> Vec<ClassifiedPunch> {
        let first = punches[0].timestamp;
        let last = punches[2].timestamp;
        let gap_12 = minutes_between(punches[0].timestamp, punches[1].timestamp);
        let gap_23 = minutes_between(punches[1].timestamp, punches[2].timestamp);

        // 跨零点的班段不适用白班上下班时刻判断
        let same_day = first.date() == last.date();
        let deviation = config.workday_deviation_minutes;
        let late_start = same_day
            && minute_of_day(first.time()) > minute_of_day(config.workday_start) + deviation;
        let early_end = same_day
            && minute_of_day(last.time()) < minute_of_day(config.workday_end) - deviation;

        if late_start {
            let mut out = assign(punches, &[BreakIn, BreakOut, ClockOut]);
            let note = format!(
                "MISSING_CLOCK_IN: first punch {} is well after workday start {}",
                fmt_hm(first.time()),
                fmt_hm(config.workday_start)
            );
            out[0].flag_missing(note);
            return out;
        }

        if early_end {
            let mut out = assign(punches, &[ClockIn, BreakIn, BreakOut]);
            let note = format!(
                "MISSING_CLOCK_OUT: last punch {} is well before workday end {}",
                fmt_hm(last.time()),
                fmt_hm(config.workday_end)
            );
            out[2].flag_missing(note);
            return out;
        }

        let threshold = config.missing_break_gap_minutes;
        if gap_12 > gap_23 && gap_12 > threshold {
            let mut out = assign(punches, &[ClockIn, BreakOut, ClockOut]);
            out[1].flag_missing(format!(
                "MISSING_BREAK_IN: {} min gap before this punch",
                gap_12
            ));
            return out;
        }

        if gap_23 > gap_12 && gap_23 > threshold {
            let mut out = assign(punches, &[ClockIn, BreakIn, ClockOut]);
            out[1].flag_missing(format!(
                "MISSING_BREAK_OUT: {} min gap after this punch",
                gap_23
            ));
            return out;
        }

        let mut out = assign(punches, &[ClockIn, BreakIn, ClockOut]);
        out[1].flag_missing("AMBIGUOUS: three punches without a decisive gap");
        out
    }

    // ==========================================
    // 4 次打卡
    // ==========================================

    fn classify_four(&self, punches: Vec<RawPunch>, config: &ClassifierConfig) -> Vec<ClassifiedPunch> {
        let gap_23 = minutes_between(punches[1].timestamp, punches[2].timestamp);
        let resumes_break = gap_23 <= config.double_shift_gap_minutes
            || (within(punches[2].time(), config.lunch_window_start, config.lunch_window_end)
                && gap_23 <= config.max_break_minutes);

        if resumes_break {
            assign(punches, &[ClockIn, BreakIn, BreakOut, ClockOut])
        } else {
            debug!(gap_23, "中段间隔过长, 按两段班处理");
            assign(punches, &[ClockIn, ClockOut, ClockIn, ClockOut])
        }
    }

    // ==========================================
    // >4 次打卡
    // ==========================================

    fn classify_even_many(&self, punches: Vec<RawPunch>, config: &ClassifierConfig) -> Vec<ClassifiedPunch> {
        let n = punches.len();
        let mut out = assign(punches, &alternating_roles(n));

        // 中间按 (开始休息, 休息结束) 成对; 间隔超过休息上限视为班段分隔
        let mut i = 1;
        while i + 1 < n - 1 {
            let gap = minutes_between(out[i].timestamp(), out[i + 1].timestamp());
            if gap > config.max_break_minutes {
                let gap_before = minutes_between(out[i - 1].timestamp(), out[i].timestamp());
                let gap_after = minutes_between(out[i + 1].timestamp(), out[i + 2].timestamp());

                if gap_before < config.short_gap_minutes || gap_after < config.short_gap_minutes {
                    // 相邻短间隔: 大概率是重复打卡导致错位, 保留休息边界
                    out[i].flag_missing(format!(
                        "AMBIGUOUS: {} min break next to a {} min gap",
                        gap,
                        gap_before.min(gap_after)
                    ));
                } else {
                    out[i].role = ClockOut;
                    out[i + 1].role = ClockIn;
                }
            }
            i += 2;
        }

        out
    }

    fn classify_odd_many(&self, punches: Vec<RawPunch>, config: &ClassifierConfig) -> Vec<ClassifiedPunch> {
        let n = punches.len();
        let mut out = assign(punches, &alternating_roles(n));
        let mut flagged = false;

        for i in 0..n - 1 {
            let gap = minutes_between(out[i].timestamp(), out[i + 1].timestamp());
            if gap <= config.anomalous_gap_minutes {
                continue;
            }
            if out[i].role == BreakIn {
                out[i].flag_missing(format!(
                    "LIKELY_MISSING_BREAK_OUT: {} min gap after break start",
                    gap
                ));
                flagged = true;
            }
            if out[i + 1].role == BreakOut {
                out[i + 1].flag_missing(format!(
                    "LIKELY_MISSING_BREAK_IN: {} min gap before break end",
                    gap
                ));
                flagged = true;
            }
        }

        if !flagged {
            // 奇数次打卡必有一次缺卡, 未找到异常间隔时标注未配对的那一次
            out[n - 2].flag_missing("AMBIGUOUS: odd punch count, unmatched break punch");
        }

        out
    }
}

/// 首次上班, 末次下班, 中间按位置交替 开始休息/休息结束
fn alternating_roles(n: usize) -> Vec<PunchRole> {
    (0..n)
        .map(|i| {
            if i == 0 {
                ClockIn
            } else if i == n - 1 {
                ClockOut
            } else if i % 2 == 1 {
                BreakIn
            } else {
                BreakOut
            }
        })
        .collect()
}

fn assign(punches: Vec<RawPunch>, roles: &[PunchRole]) -> Vec<ClassifiedPunch> {
    punches
        .into_iter()
        .zip(roles.iter().copied())
        .map(|(punch, role)| ClassifiedPunch::new(punch, role))
        .collect()
}
