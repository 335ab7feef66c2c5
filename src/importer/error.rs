// ==========================================
// 考勤核算引擎 - 导入模块错误类型
// ==========================================
// 文件级错误: 终止本次导入
// 行级错误: 由导入器转为 PunchReject, 计入批次报告
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件级 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("不支持的文件类型: .{0} (支持 csv/xlsx/xls)")]
    UnsupportedFormat(String),

    #[error("读取文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV 解析失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel 解析失败: {0}")]
    Workbook(String),

    #[error("缺少必需列: {0}")]
    MissingColumn(String),

    #[error("导入线程失败: {0}")]
    Worker(#[from] tokio::task::JoinError),

    // ===== 行级 =====
    #[error("第 {row} 行{field}为空")]
    EmptyField { row: usize, field: &'static str },

    #[error("第 {row} 行打卡时间无法识别: {value}")]
    TimestampParse { row: usize, value: String },
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::Workbook(err.to_string())
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
