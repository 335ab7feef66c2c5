// ==========================================
// 考勤核算引擎 - 应用层
// ==========================================
// 职责: 装配仓储/配置/编排器, 供 CLI 调用
// ==========================================

pub mod state;

// 重导出
pub use state::{AppError, AppResult, AppState};
