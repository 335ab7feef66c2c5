// ==========================================
// 考勤核算引擎 - 班次识别
// ==========================================
// 职责: 由实际上/下班时间推断应到时间 (迟到基准)
// 规则: 优先按下班时间识别 (重叠班次窗口区分度更高), 其次按上班时间
// 红线: 同样输入必须得到同样结果, 保证重算幂等
// ==========================================

use crate::config::ShiftConfig;
use crate::domain::types::ShiftKind;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// 识别依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionBasis {
    TimeOut,
    TimeIn,
    Fallback,
}

/// 识别结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedShift {
    pub expected_time_in: NaiveTime,
    pub kind: ShiftKind,
    pub basis: DetectionBasis,
}

// ==========================================
// ShiftDetector - 班次识别器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct ShiftDetector;

impl ShiftDetector {
    pub fn new() -> Self {
        Self
    }

    /// 识别应到时间
    ///
    /// 顺序（命中即返回）:
    /// 1) 下班时间落入 by_time_out 窗口
    /// 2) 上班时间落入 by_time_in 窗口
    /// 3) fallback_time_in (白班)
    pub fn detect(
        &self,
        time_in: Option<NaiveTime>,
        time_out: Option<NaiveTime>,
        config: &ShiftConfig,
    ) -> DetectedShift {
        if let Some(out) = time_out {
            if let Some(bucket) = config.by_time_out.iter().find(|b| b.contains(out)) {
                return DetectedShift {
                    expected_time_in: bucket.expected_time_in,
                    kind: bucket.kind,
                    basis: DetectionBasis::TimeOut,
                };
            }
        }

        if let Some(inp) = time_in {
            if let Some(bucket) = config.by_time_in.iter().find(|b| b.contains(inp)) {
                return DetectedShift {
                    expected_time_in: bucket.expected_time_in,
                    kind: bucket.kind,
                    basis: DetectionBasis::TimeIn,
                };
            }
        }

        DetectedShift {
            expected_time_in: config.fallback_time_in,
            kind: ShiftKind::Day,
            basis: DetectionBasis::Fallback,
        }
    }
}
