// ==========================================
// 考勤核算引擎 - 员工主数据导入
// ==========================================
// 列: external_id|employee_id|emp_code, name|full_name, department|dept (可选)
// 缺编号或姓名的行跳过并记录行号
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{FileParser, SourceRow, UniversalFileParser};
use crate::repository::employee_repo::NewEmployee;
use std::path::Path;
use tracing::{info, warn};

const ID_ALIASES: &[&str] = &["external_id", "employee_id", "emp_code"];
const NAME_ALIASES: &[&str] = &["name", "full_name"];
const DEPARTMENT_ALIASES: &[&str] = &["department", "dept"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmployeeImport {
    pub employees: Vec<NewEmployee>,
    pub skipped_rows: Vec<usize>,
}

/// 读取员工文件
pub fn load_employees<P: AsRef<Path>>(path: P) -> ImportResult<EmployeeImport> {
    let rows = UniversalFileParser.parse_to_rows(path.as_ref())?;
    let result = map_employee_rows(rows)?;
    info!(
        employees = result.employees.len(),
        skipped = result.skipped_rows.len(),
        "员工文件解析完成"
    );
    Ok(result)
}

pub fn map_employee_rows(rows: Vec<SourceRow>) -> ImportResult<EmployeeImport> {
    if let Some(first) = rows.first() {
        let has_id = first
            .fields
            .keys()
            .any(|k| ID_ALIASES.iter().any(|a| k.eq_ignore_ascii_case(a)));
        if !has_id {
            return Err(ImportError::MissingColumn(ID_ALIASES.join("|")));
        }
    }

    let mut result = EmployeeImport::default();
    for row in rows {
        match (row.get_any(ID_ALIASES), row.get_any(NAME_ALIASES)) {
            (Some(id), Some(name)) => result.employees.push(NewEmployee {
                external_id: id.to_string(),
                full_name: name.to_string(),
                department: row.get_any(DEPARTMENT_ALIASES).map(str::to_string),
            }),
            _ => {
                warn!(row = row.row, "员工行缺少编号或姓名, 已跳过");
                result.skipped_rows.push(row.row);
            }
        }
    }
    Ok(result)
}
