// ==========================================
// 考勤核算引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod attendance_repo;
pub mod employee_repo;
pub mod error;
pub mod reconcile_run_repo;
pub mod store;

// 重导出核心仓储
pub use attendance_repo::AttendanceRepository;
pub use employee_repo::{EmployeeRepository, NewEmployee};
pub use error::{RepositoryError, RepositoryResult};
pub use reconcile_run_repo::{ReconcileRunEntry, ReconcileRunRepository};
pub use store::{
    AttendanceStore, EmployeeDirectory, RecomputedDay, RunLedger, StoredRow, WriteOutcome,
};
