// ==========================================
// 考勤核算引擎 - 导入层
// ==========================================
// 职责: 外部数据导入 (考勤机导出打卡 / 员工主数据)
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod employee_importer;
pub mod error;
pub mod file_parser;
pub mod punch_importer;

// 重导出核心类型
pub use employee_importer::{load_employees, EmployeeImport};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, SourceRow, UniversalFileParser};
pub use punch_importer::{parse_timestamp, FilePunchSource, PunchFileImporter, PunchImport, PunchSource};
