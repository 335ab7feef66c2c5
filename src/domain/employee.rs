// ==========================================
// 考勤核算引擎 - 员工领域模型
// ==========================================
// 用途: 考勤机编号 → 内部员工ID 映射
// ==========================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: i64,
    pub external_id: String,        // 考勤机编号
    pub full_name: String,
    pub department: Option<String>, // 部门 (记录过滤用)
    pub active: bool,
}
