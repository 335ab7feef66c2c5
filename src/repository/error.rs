// ==========================================
// 考勤核算引擎 - 仓储层错误类型
// ==========================================
// 分类: 锁中毒 / 库忙 / 无法打开 = 存储不可用, 批次终止
//       约束冲突 / SQL 失败 / 值无法解码 = 单条记录失败, 计数后继续
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 存储不可用 =====
    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库不可用: {0}")]
    Unavailable(String),

    // ===== 单条记录 =====
    #[error("约束冲突: {0}")]
    Constraint(String),

    #[error("SQL 执行失败: {0}")]
    Sqlite(String),

    #[error("存储值无法解码 (字段 {field}): {message}")]
    CorruptValue { field: &'static str, message: String },

    #[error("JSON 编解码失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 批次应立即终止
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepositoryError::LockError(_) | RepositoryError::Unavailable(_))
    }

    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        RepositoryError::CorruptValue {
            field,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(code, msg) = &err else {
            return RepositoryError::Sqlite(err.to_string());
        };
        let message = msg.clone().unwrap_or_else(|| code.to_string());

        match code.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::NotADatabase => RepositoryError::Unavailable(message),
            ErrorCode::ConstraintViolation => RepositoryError::Constraint(message),
            _ => RepositoryError::Sqlite(message),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
