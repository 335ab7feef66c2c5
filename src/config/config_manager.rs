// ==========================================
// 考勤核算引擎 - 配置管理器
// ==========================================
// 职责: 从 config_kv 表加载参数覆写, 组装 AttendanceConfig
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::attendance_config::{AttendanceConfig, ShiftBucket};
use crate::db::open_sqlite_connection;
use chrono::NaiveTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // ===== 打卡归类 =====
    pub const MIDDAY_CUTOFF: &str = "classifier.midday_cutoff";
    pub const WORKDAY_START: &str = "classifier.workday_start";
    pub const WORKDAY_END: &str = "classifier.workday_end";
    pub const WORKDAY_DEVIATION_MINUTES: &str = "classifier.workday_deviation_minutes";
    pub const MISSING_BREAK_GAP_MINUTES: &str = "classifier.missing_break_gap_minutes";
    pub const DOUBLE_SHIFT_GAP_MINUTES: &str = "classifier.double_shift_gap_minutes";
    pub const LUNCH_WINDOW_START: &str = "classifier.lunch_window_start";
    pub const LUNCH_WINDOW_END: &str = "classifier.lunch_window_end";
    pub const MAX_BREAK_MINUTES: &str = "classifier.max_break_minutes";
    pub const SHORT_GAP_MINUTES: &str = "classifier.short_gap_minutes";
    pub const ANOMALOUS_GAP_MINUTES: &str = "classifier.anomalous_gap_minutes";

    // ===== 班次识别 =====
    pub const SHIFT_BY_TIME_OUT: &str = "shift.by_time_out";
    pub const SHIFT_BY_TIME_IN: &str = "shift.by_time_in";
    pub const SHIFT_FALLBACK_TIME_IN: &str = "shift.fallback_time_in";

    // ===== 工时计算 =====
    pub const MINIMUM_WORKDAY_MINUTES: &str = "metrics.minimum_workday_minutes";
    pub const UNDERTIME_GRACE_MINUTES: &str = "metrics.undertime_grace_minutes";
    pub const BREAK_CAP_MINUTES: &str = "metrics.break_cap_minutes";
    pub const FALLBACK_BREAK_MINUTES: &str = "metrics.fallback_break_minutes";

    // ===== 批处理 =====
    pub const MAX_WORKERS: &str = "reconcile.max_workers";
    pub const NIGHT_CARRYOVER_FROM: &str = "reconcile.night_carryover_from";
    pub const NIGHT_CARRYOVER_UNTIL: &str = "reconcile.night_carryover_until";
}

/// 配置层错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置读取失败: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("配置序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ConfigResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    // ==========================================
    // 参数解析
    // ==========================================

    fn parse_override<T>(&self, key: &str, target: &mut T) -> ConfigResult<()>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(raw) = self.get_global_config_value(key)? {
            *target = raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            })?;
            debug!(key, value = %raw, "应用配置覆写");
        }
        Ok(())
    }

    fn time_override(&self, key: &str, target: &mut NaiveTime) -> ConfigResult<()> {
        if let Some(raw) = self.get_global_config_value(key)? {
            *target = parse_clock(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                message: "期望 HH:MM 或 HH:MM:SS".to_string(),
            })?;
            debug!(key, value = %raw, "应用配置覆写");
        }
        Ok(())
    }

    fn json_override<T: DeserializeOwned>(&self, key: &str, target: &mut T) -> ConfigResult<()> {
        if let Some(raw) = self.get_global_config_value(key)? {
            *target = serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            })?;
            debug!(key, "应用配置覆写");
        }
        Ok(())
    }

    /// 加载核算参数: 默认值 + config_kv 覆写
    ///
    /// 缺失的键使用默认值, 格式错误的键直接报错
    pub fn load_attendance_config(&self) -> ConfigResult<AttendanceConfig> {
        use config_keys::*;

        let mut config = AttendanceConfig::default();

        let c = &mut config.classifier;
        self.time_override(MIDDAY_CUTOFF, &mut c.midday_cutoff)?;
        self.time_override(WORKDAY_START, &mut c.workday_start)?;
        self.time_override(WORKDAY_END, &mut c.workday_end)?;
        self.parse_override(WORKDAY_DEVIATION_MINUTES, &mut c.workday_deviation_minutes)?;
        self.parse_override(MISSING_BREAK_GAP_MINUTES, &mut c.missing_break_gap_minutes)?;
        self.parse_override(DOUBLE_SHIFT_GAP_MINUTES, &mut c.double_shift_gap_minutes)?;
        self.time_override(LUNCH_WINDOW_START, &mut c.lunch_window_start)?;
        self.time_override(LUNCH_WINDOW_END, &mut c.lunch_window_end)?;
        self.parse_override(MAX_BREAK_MINUTES, &mut c.max_break_minutes)?;
        self.parse_override(SHORT_GAP_MINUTES, &mut c.short_gap_minutes)?;
        self.parse_override(ANOMALOUS_GAP_MINUTES, &mut c.anomalous_gap_minutes)?;

        let s = &mut config.shift;
        self.json_override::<Vec<ShiftBucket>>(SHIFT_BY_TIME_OUT, &mut s.by_time_out)?;
        self.json_override::<Vec<ShiftBucket>>(SHIFT_BY_TIME_IN, &mut s.by_time_in)?;
        self.time_override(SHIFT_FALLBACK_TIME_IN, &mut s.fallback_time_in)?;

        let m = &mut config.metrics;
        self.parse_override(MINIMUM_WORKDAY_MINUTES, &mut m.minimum_workday_minutes)?;
        self.parse_override(UNDERTIME_GRACE_MINUTES, &mut m.undertime_grace_minutes)?;
        self.parse_override(BREAK_CAP_MINUTES, &mut m.break_cap_minutes)?;
        self.parse_override(FALLBACK_BREAK_MINUTES, &mut m.fallback_break_minutes)?;

        let r = &mut config.reconcile;
        self.parse_override(MAX_WORKERS, &mut r.max_workers)?;
        self.time_override(NIGHT_CARRYOVER_FROM, &mut r.night_carryover_from)?;
        self.time_override(NIGHT_CARRYOVER_UNTIL, &mut r.night_carryover_until)?;

        if r.max_workers == 0 {
            r.max_workers = 1;
        }

        Ok(config)
    }

    /// 获取生效参数快照（JSON格式）
    ///
    /// # 用途
    /// - 写入 reconcile_run, 便于追溯某次批处理使用的参数
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let config = self.load_attendance_config()?;
        Ok(serde_json::to_string(&config)?)
    }
}

/// 解析 "HH:MM" / "HH:MM:SS"
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_accepts_both_precisions() {
        assert_eq!(parse_clock("08:00"), NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(parse_clock(" 17:30:15 "), NaiveTime::from_hms_opt(17, 30, 15));
        assert_eq!(parse_clock("8am"), None);
    }
}
