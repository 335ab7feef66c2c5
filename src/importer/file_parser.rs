// ==========================================
// 考勤核算引擎 - 文件解析器
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: 表头 → 值 的行集合, 带源文件行号; 空白行跳过
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 解析出的单行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 源文件行号 (表头为第 1 行)
    pub row: usize,
    pub fields: HashMap<String, String>,
}

impl SourceRow {
    /// 按别名取第一个非空字段 (表头大小写不敏感)
    pub fn get_any(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            self.fields
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(alias) && !v.is_empty())
                .map(|(_, v)| v.as_str())
        })
    }
}

/// 文件解析器接口
pub trait FileParser {
    fn parse_to_rows(&self, file_path: &Path) -> ImportResult<Vec<SourceRow>>;
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn to_row(row: usize, headers: &[String], values: impl Iterator<Item = String>) -> Option<SourceRow> {
    let fields: HashMap<String, String> = headers
        .iter()
        .cloned()
        .zip(values.map(|v| v.trim().to_string()))
        .collect();

    // 跳过完全空白的行
    if fields.values().all(|v| v.is_empty()) {
        return None;
    }
    Some(SourceRow { row, fields })
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_rows(&self, file_path: &Path) -> ImportResult<Vec<SourceRow>> {
        ensure_exists(file_path)?;
        if extension(file_path) != "csv" {
            return Err(ImportError::UnsupportedFormat(extension(file_path)));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            if let Some(row) = to_row(idx + 2, &headers, record.iter().map(str::to_string)) {
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

/// 日期时间单元格转为标准文本, 其余按显示值
fn cell_text(cell: &Data) -> String {
    if cell.is_datetime() {
        if let Some(dt) = cell.as_datetime() {
            return dt.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }
    cell.to_string()
}

impl FileParser for ExcelParser {
    fn parse_to_rows(&self, file_path: &Path) -> ImportResult<Vec<SourceRow>> {
        ensure_exists(file_path)?;
        let ext = extension(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::Workbook("无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut iter = range.rows();
        let header_row = iter
            .next()
            .ok_or_else(|| ImportError::Workbook("首个工作表为空".to_string()))?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, data_row) in iter.enumerate() {
            if let Some(row) = to_row(idx + 2, &headers, data_row.iter().map(cell_text)) {
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_rows(&self, file_path: &Path) -> ImportResult<Vec<SourceRow>> {
        match extension(file_path).as_str() {
            "csv" => CsvParser.parse_to_rows(file_path),
            "xlsx" | "xls" => ExcelParser.parse_to_rows(file_path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
