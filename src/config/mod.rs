// ==========================================
// 考勤核算引擎 - 配置层
// ==========================================
// 职责: 核算参数值对象 + config_kv 覆写加载
// 存储: config_kv 表
// ==========================================

pub mod attendance_config;
pub mod config_manager;

// 重导出核心配置
pub use attendance_config::{
    AttendanceConfig, ClassifierConfig, MetricsConfig, ReconcileConfig, ShiftBucket, ShiftConfig,
};
pub use config_manager::{config_keys, ConfigError, ConfigManager, ConfigResult};
