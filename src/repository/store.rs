// ==========================================
// 考勤核算引擎 - 存储接口
// ==========================================
// 职责: 编排器依赖的存储抽象 (考勤记录存储 + 员工目录)
// 实现者: AttendanceRepository / EmployeeRepository (rusqlite)
// 红线: 同一主键的 读-比较-写 必须在实现内部原子完成
// ==========================================

use crate::domain::attendance::{AttendanceQuery, AttendanceRecord, RecordKey};
use crate::engine::report::BatchReport;
use crate::repository::error::RepositoryResult;

/// 单条写入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated { changed_fields: Vec<&'static str> },
    Unchanged,
    /// 已过账, 未做任何修改
    SkippedPosted,
}

/// 原地重算的写入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputedDay {
    pub outcome: WriteOutcome,
    pub missing_punch: bool,
}

/// 范围查询返回的单行: 主键可解析但字段损坏时保留主键, 便于定位
#[derive(Debug)]
pub struct StoredRow {
    pub key: Option<RecordKey>,
    pub record: RepositoryResult<AttendanceRecord>,
}

// ==========================================
// AttendanceStore - 考勤记录存储
// ==========================================
pub trait AttendanceStore: Send + Sync {
    /// 以草稿对账单日记录
    ///
    /// - 不存在 → 插入
    /// - 已过账 → 跳过, 不写
    /// - 字段无变化 → 不写
    /// - 否则 → 更新变化字段
    fn reconcile_day(&self, draft: &AttendanceRecord) -> RepositoryResult<WriteOutcome>;

    /// 原地重算单日记录: 读当前行 → recompute → 比较 → 写入, 同一事务内完成
    ///
    /// - 不存在 → Ok(None)
    /// - 已过账 → SkippedPosted, 不调用 recompute
    /// - 草稿基于事务内读到的行构建, 并发导入写入的时间字段不会被覆盖回旧值
    fn recompute_day(
        &self,
        key: RecordKey,
        recompute: &dyn Fn(&AttendanceRecord) -> AttendanceRecord,
    ) -> RepositoryResult<Option<RecomputedDay>>;

    /// 按主键读取
    fn find_by_key(&self, key: RecordKey) -> RepositoryResult<Option<AttendanceRecord>>;

    /// 按查询条件读取 (逐行解码, 单行损坏不影响其余行)
    fn find_by_query(&self, query: &AttendanceQuery) -> RepositoryResult<Vec<StoredRow>>;
}

// ==========================================
// EmployeeDirectory - 员工目录
// ==========================================
pub trait EmployeeDirectory: Send + Sync {
    /// 考勤机员工编号 → 内部员工 ID, 未知编号返回 None
    fn resolve(&self, external_id: &str) -> RepositoryResult<Option<i64>>;
}

// ==========================================
// RunLedger - 批次台账
// ==========================================
pub trait RunLedger: Send + Sync {
    fn record_run(&self, report: &BatchReport, config_snapshot_json: Option<&str>) -> RepositoryResult<()>;
}
