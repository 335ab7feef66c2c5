// ==========================================
// 考勤核算引擎 - 核心库
// ==========================================
// 职责: 原始打卡 → 日考勤记录 (工时/迟到/早退/半天)
// 技术栈: Rust + SQLite
// 红线: 已过账记录只读; 重复执行零变更
// ==========================================

// 打卡 / 考勤记录 / 员工
pub mod domain;

// SQLite 存储 (考勤记录, 员工目录, 批次台账)
pub mod repository;

// 归类 → 班次识别 → 工时计算 → 批次编排
pub mod engine;

// 考勤机导出文件与员工主数据
pub mod importer;

// 核算参数与 config_kv 覆写
pub mod config;

// 连接 PRAGMA / 建表
pub mod db;

pub mod logging;

// CLI 装配
pub mod app;

pub use domain::types::{AttendanceSource, PostingStatus, PunchRole, ShiftKind};
pub use domain::{
    AttendanceQuery, AttendanceRecord, ClassifiedPunch, Employee, PunchReject, RawPunch, RecordKey,
};
pub use engine::{
    BatchReport, CancelFlag, DayRecordBuilder, MetricsCalculator, PunchClassifier,
    ReconcileError, ReconcileOrchestrator, ShiftDetector,
};
pub use config::AttendanceConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = "考勤核算引擎";
