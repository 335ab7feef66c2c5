// ==========================================
// 考勤核算引擎 - 应用状态
// ==========================================
// 职责: 共享连接 + 仓储 + 配置装配, 对外提供批处理入口
// 使用方: CLI 主入口 / 集成测试
// ==========================================

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use crate::config::{AttendanceConfig, ConfigError, ConfigManager};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::attendance::AttendanceQuery;
use crate::domain::types::AttendanceSource;
use crate::engine::orchestrator::{CancelFlag, ReconcileError, ReconcileOrchestrator};
use crate::engine::report::BatchReport;
use crate::importer::{load_employees, EmployeeImport, FilePunchSource, ImportError, PunchFileImporter, PunchSource};
use crate::repository::{
    AttendanceRepository, EmployeeRepository, ReconcileRunRepository, RepositoryError,
};

/// 应用层错误
#[derive(Error, Debug)]
pub enum AppError {
    #[error("数据库初始化失败: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

pub type AppResult<T> = Result<T, AppError>;

/// 应用状态
///
/// 所有仓储共享同一连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub attendance_repo: Arc<AttendanceRepository>,
    pub employee_repo: Arc<EmployeeRepository>,
    pub run_repo: Arc<ReconcileRunRepository>,
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 打开数据库并完成建表
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: impl Into<String>) -> AppResult<Self> {
        let db_path = db_path.into();
        info!(db_path = %db_path, "初始化应用状态");

        let conn = open_sqlite_connection(&db_path)?;
        init_schema(&conn)?;
        Ok(Self::from_connection(db_path, Arc::new(Mutex::new(conn))))
    }

    /// 从已建表的连接装配
    pub fn from_connection(db_path: String, conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            db_path,
            attendance_repo: Arc::new(AttendanceRepository::new(conn.clone())),
            employee_repo: Arc::new(EmployeeRepository::new(conn.clone())),
            run_repo: Arc::new(ReconcileRunRepository::new(conn.clone())),
            config_manager: Arc::new(ConfigManager::from_connection(conn)),
        }
    }

    /// 当前生效配置 (每个批次开始时读取一次)
    pub fn load_config(&self) -> AppResult<AttendanceConfig> {
        Ok(self.config_manager.load_attendance_config()?)
    }

    /// 以当前配置构建编排器
    pub fn orchestrator(
        &self,
    ) -> AppResult<ReconcileOrchestrator<AttendanceRepository, EmployeeRepository>> {
        let config = Arc::new(self.load_config()?);
        Ok(ReconcileOrchestrator::new(
            self.attendance_repo.clone(),
            self.employee_repo.clone(),
            config,
        )
        .with_ledger(self.run_repo.clone()))
    }

    /// 导入员工主数据
    pub fn import_employees<P: AsRef<Path>>(&self, path: P) -> AppResult<EmployeeImport> {
        let imported = load_employees(path)?;
        self.employee_repo.batch_upsert(&imported.employees)?;
        Ok(imported)
    }

    /// 导入打卡文件并对账
    ///
    /// 给出日期范围时只处理范围内 (含夜班顺延) 的打卡
    pub async fn reconcile_file<P: AsRef<Path>>(
        &self,
        path: P,
        range: Option<(NaiveDate, NaiveDate)>,
        source: AttendanceSource,
        cancel: &CancelFlag,
    ) -> AppResult<BatchReport> {
        let orchestrator = self.orchestrator()?;

        let import = match range {
            Some((start, end)) => {
                let carry_until = orchestrator.config().reconcile.night_carryover_until;
                FilePunchSource::new(path.as_ref(), carry_until)
                    .fetch_punches(start, end)
                    .await?
            }
            None => PunchFileImporter::new().load(path)?,
        };

        Ok(orchestrator
            .reconcile_punches(import.punches, import.rejects, source, cancel)
            .await?)
    }

    /// 范围重算
    pub async fn recalculate(&self, query: AttendanceQuery, cancel: &CancelFlag) -> AppResult<BatchReport> {
        let orchestrator = self.orchestrator()?;
        Ok(orchestrator.recalculate_range(query, cancel).await?)
    }
}
