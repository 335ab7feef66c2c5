// ==========================================
// 考勤核算引擎 - 引擎层
// ==========================================
// 职责: 打卡归类 / 班次识别 / 工时计算 / 批次编排
// 红线: Engine 不拼 SQL, 所有标注必须带原因代码
// ==========================================

pub mod classifier;
pub mod day_builder;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod shift_detector;
pub mod time_utils;

// 重导出核心引擎
pub use classifier::PunchClassifier;
pub use day_builder::{fold_classified, DayEvaluation, DayRecordBuilder, FoldedDay};
pub use metrics::{DayMetrics, MetricsCalculator, MetricsInput, DOUBLE_SHIFT};
pub use orchestrator::{group_punches, CancelFlag, PunchGroup, ReconcileError, ReconcileOrchestrator};
pub use report::{BatchReport, RunKind, UnitFailure, UnitOutcome};
pub use shift_detector::{DetectedShift, DetectionBasis, ShiftDetector};
