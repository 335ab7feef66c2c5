// ==========================================
// 考勤核算引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod attendance;
pub mod employee;
pub mod punch;
pub mod types;

// 重导出核心类型
pub use attendance::{AttendanceQuery, AttendanceRecord, RecordKey};
pub use employee::Employee;
pub use punch::{ClassifiedPunch, PunchReject, RawPunch};
pub use types::{AttendanceSource, PostingStatus, PunchRole, ShiftKind};
