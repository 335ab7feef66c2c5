// ==========================================
// 考勤核算引擎 - 日记录构建
// ==========================================
// 职责: 归类结果折叠为上/下班/休息时间, 调用班次识别与工时计算, 产出记录草稿
// 两条入口共用同一计算链:
//   - from_punches: 打卡批处理 (归类 → 折叠 → 识别 → 计算)
//   - recompute: 已有记录重算 (识别 → 计算)
// 红线: 纯函数, 不读写库; 标注顺序固定, 保证重算幂等
// ==========================================

use crate::config::AttendanceConfig;
use crate::domain::attendance::AttendanceRecord;
use crate::domain::punch::{ClassifiedPunch, RawPunch};
use crate::domain::types::{AttendanceSource, PunchRole};
use crate::engine::classifier::PunchClassifier;
use crate::engine::metrics::{
    DayMetrics, MetricsCalculator, MetricsInput, BREAK_OVER_CAP, DOUBLE_SHIFT, STILL_CLOCKED_IN,
};
use crate::engine::shift_detector::{DetectedShift, ShiftDetector};
use chrono::{NaiveDate, NaiveDateTime};

const REMARK_SEPARATOR: &str = "; ";

// ==========================================
// FoldedDay - 折叠结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct FoldedDay {
    pub input: MetricsInput,
    pub missing_punch: bool,
    /// 归类阶段产生的标注 (缺卡/两段班)
    pub notes: Vec<String>,
}

/// 将已归类打卡折叠为单日时间字段
///
/// - 第一个 ClockIn → time_in
/// - 最后一个 ClockOut → time_out (跨日时写 next_day_timeout)
/// - 第一个 BreakIn → break_in, 其后第一个 BreakOut → break_out
/// - 无休息卡的两段班: 第一个 ClockOut → break_in, 其后 ClockIn → break_out
pub fn fold_classified(attendance_date: NaiveDate, punches: &[ClassifiedPunch]) -> FoldedDay {
    let first_of = |role: PunchRole| punches.iter().find(|p| p.role == role).map(|p| p.timestamp());

    let time_in = first_of(PunchRole::ClockIn);
    let time_out = punches
        .iter()
        .rev()
        .find(|p| p.role == PunchRole::ClockOut)
        .map(|p| p.timestamp())
        .filter(|out| time_in.map_or(true, |tin| *out > tin));

    let mut break_in = first_of(PunchRole::BreakIn);
    let mut break_out = match break_in {
        Some(start) => punches
            .iter()
            .find(|p| p.role == PunchRole::BreakOut && p.timestamp() > start)
            .map(|p| p.timestamp()),
        None => first_of(PunchRole::BreakOut),
    };

    let mut notes: Vec<String> = punches
        .iter()
        .filter_map(|p| {
            p.missing_punch_note
                .as_ref()
                .map(|note| format!("[{}] {}", p.timestamp().format("%H:%M"), note))
        })
        .collect();

    let mut double_shift = false;
    if break_in.is_none() && break_out.is_none() {
        if let Some((off, back)) = split_shift_gap(punches) {
            break_in = Some(off);
            break_out = Some(back);
            double_shift = true;
            notes.push(format!(
                "{}: off duty {}-{}",
                DOUBLE_SHIFT,
                off.format("%H:%M"),
                back.format("%H:%M")
            ));
        }
    }

    let is_nightshift = punches.iter().any(|p| p.timestamp().date() > attendance_date);
    let (day_out, next_day_out) = match time_out {
        Some(out) if out.date() > attendance_date => (None, Some(out.time())),
        Some(out) => (Some(out.time()), None),
        None => (None, None),
    };

    FoldedDay {
        input: MetricsInput {
            attendance_date,
            time_in: time_in.map(|t| t.time()),
            time_out: day_out,
            next_day_timeout: next_day_out,
            break_in: break_in.map(|t| t.time()),
            break_out: break_out.map(|t| t.time()),
            is_nightshift,
            double_shift,
            last_role: punches.last().map(|p| p.role),
        },
        missing_punch: punches.iter().any(|p| p.missing_punch),
        notes,
    }
}

/// 两段班的下班/再上班时刻
fn split_shift_gap(punches: &[ClassifiedPunch]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    punches.windows(2).find_map(|pair| {
        (pair[0].role == PunchRole::ClockOut && pair[1].role == PunchRole::ClockIn)
            .then(|| (pair[0].timestamp(), pair[1].timestamp()))
    })
}

/// 拼接标注: 保留的归类标注在前, 计算标注在后
fn compose_remarks<'a>(
    carried: impl IntoIterator<Item = &'a str>,
    annotations: &'a [String],
) -> Option<String> {
    let parts: Vec<&str> = carried
        .into_iter()
        .chain(annotations.iter().map(String::as_str))
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(REMARK_SEPARATOR))
    }
}

/// 去掉上次计算产生的标注, 保留归类/人工标注
fn carried_remarks(remarks: Option<&str>) -> Vec<&str> {
    remarks
        .map(|r| {
            r.split(REMARK_SEPARATOR)
                .filter(|part| {
                    !part.starts_with(STILL_CLOCKED_IN) && !part.starts_with(BREAK_OVER_CAP)
                })
                .collect()
        })
        .unwrap_or_default()
}

// ==========================================
// DayEvaluation - 单日计算过程 (日志/测试用)
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct DayEvaluation {
    pub record: AttendanceRecord,
    pub shift: DetectedShift,
    pub metrics: DayMetrics,
}

// ==========================================
// DayRecordBuilder - 日记录构建器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct DayRecordBuilder {
    classifier: PunchClassifier,
    detector: ShiftDetector,
    calculator: MetricsCalculator,
}

impl DayRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由单人单日打卡构建记录草稿
    ///
    /// # 参数
    /// - employee_id: 内部员工 ID
    /// - attendance_date: 考勤日 (含夜班顺延到次日的打卡)
    /// - punches: 该组全部原始打卡, 无需有序
    /// - source: 本批数据来源
    pub fn from_punches(
        &self,
        employee_id: i64,
        attendance_date: NaiveDate,
        punches: Vec<RawPunch>,
        source: AttendanceSource,
        config: &AttendanceConfig,
    ) -> DayEvaluation {
        let classified = self.classifier.classify(punches, &config.classifier);
        let folded = fold_classified(attendance_date, &classified);

        let mut record = AttendanceRecord::new(employee_id, attendance_date, source);
        record.time_in = folded.input.time_in;
        record.time_out = folded.input.time_out;
        record.next_day_timeout = folded.input.next_day_timeout;
        record.break_in = folded.input.break_in;
        record.break_out = folded.input.break_out;
        record.is_nightshift = folded.input.is_nightshift;
        record.missing_punch = folded.missing_punch;

        let (shift, metrics) = self.evaluate(&folded.input, config);
        apply_metrics(&mut record, &metrics);
        record.remarks = compose_remarks(
            folded.notes.iter().map(String::as_str),
            &metrics.annotations(),
        );

        DayEvaluation {
            record,
            shift,
            metrics,
        }
    }

    /// 重算已有记录: 时间字段/来源/缺卡标记不变, 只刷新计算字段与计算标注
    pub fn recompute(&self, existing: &AttendanceRecord, config: &AttendanceConfig) -> DayEvaluation {
        let input = MetricsInput::from_record(existing);
        let (shift, metrics) = self.evaluate(&input, config);

        let mut record = existing.clone();
        apply_metrics(&mut record, &metrics);
        record.remarks = compose_remarks(
            carried_remarks(existing.remarks.as_deref()),
            &metrics.annotations(),
        );

        DayEvaluation {
            record,
            shift,
            metrics,
        }
    }

    fn evaluate(&self, input: &MetricsInput, config: &AttendanceConfig) -> (DetectedShift, DayMetrics) {
        let shift = self
            .detector
            .detect(input.time_in, input.effective_time_out(), &config.shift);
        let metrics = self
            .calculator
            .compute(input, shift.expected_time_in, &config.metrics);
        (shift, metrics)
    }
}

fn apply_metrics(record: &mut AttendanceRecord, metrics: &DayMetrics) {
    record.hours_worked = metrics.hours_worked;
    record.late_minutes = metrics.late_minutes;
    record.undertime_minutes = metrics.undertime_minutes;
}
