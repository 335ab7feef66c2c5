// ==========================================
// 考勤核算引擎 - 员工仓储
// ==========================================
// 表: employee
// 职责: 考勤机编号 → 内部员工 ID 解析, 员工主数据维护
// ==========================================

use crate::domain::employee::Employee;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::store::EmployeeDirectory;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

fn map_employee(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        employee_id: row.get(0)?,
        external_id: row.get(1)?,
        full_name: row.get(2)?,
        department: row.get(3)?,
        active: row.get(4)?,
    })
}

/// 待写入的员工 (ID 由数据库分配)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub external_id: String,
    pub full_name: String,
    pub department: Option<String>,
}

// ==========================================
// EmployeeRepository - 员工仓储
// ==========================================
pub struct EmployeeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EmployeeRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新员工 (按 external_id)
    ///
    /// # 返回
    /// - Ok(employee_id)
    pub fn upsert(&self, employee: &NewEmployee) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::upsert_with(&conn, employee)
    }

    fn upsert_with(conn: &Connection, employee: &NewEmployee) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO employee (external_id, full_name, department, active)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT(external_id) DO UPDATE SET
                full_name = excluded.full_name,
                department = excluded.department
            "#,
            params![employee.external_id, employee.full_name, employee.department],
        )?;

        let id = conn.query_row(
            "SELECT employee_id FROM employee WHERE external_id = ?1",
            params![employee.external_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// 批量新增或更新 (单事务)
    pub fn batch_upsert(&self, employees: &[NewEmployee]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        for employee in employees {
            Self::upsert_with(&tx, employee)?;
        }

        tx.commit()?;
        Ok(employees.len())
    }

    pub fn find_by_external_id(&self, external_id: &str) -> RepositoryResult<Option<Employee>> {
        let conn = self.get_conn()?;
        let employee = conn
            .query_row(
                r#"
                SELECT employee_id, external_id, full_name, department, active
                FROM employee WHERE external_id = ?1
                "#,
                params![external_id],
                map_employee,
            )
            .optional()?;
        Ok(employee)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<Employee>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT employee_id, external_id, full_name, department, active
            FROM employee ORDER BY employee_id
            "#,
        )?;
        let employees = stmt
            .query_map([], map_employee)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(employees)
    }
}

impl EmployeeDirectory for EmployeeRepository {
    fn resolve(&self, external_id: &str) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;
        let id = conn
            .query_row(
                "SELECT employee_id FROM employee WHERE external_id = ?1",
                params![external_id.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}
