// ==========================================
// 考勤核算引擎 - 命令行入口
// ==========================================
// 用法:
//   attendance-engine init
//   attendance-engine import-employees <file>
//   attendance-engine reconcile <file> [start end] [--source <source>]
//   attendance-engine recalc <start> <end> [department]
//   attendance-engine post <employee_external_id> <start> <end>
//
// 数据库路径: ATTENDANCE_DB_PATH, 否则用户数据目录
// 日志级别: RUST_LOG (ATTENDANCE_LOG_JSON=1 时输出 JSON 行)
// ==========================================

use anyhow::{anyhow, bail, Context};
use attendance_engine::app::AppState;
use attendance_engine::db::default_db_path;
use attendance_engine::{logging, AttendanceQuery, AttendanceSource, BatchReport, CancelFlag};
use chrono::NaiveDate;

const USAGE: &str = "usage: attendance-engine <init|import-employees|reconcile|recalc|post> [args]";

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("日期格式错误, 期望 YYYY-MM-DD: {}", raw))
}

fn print_report(report: &BatchReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Ctrl-C 触发协作式取消: 进行中的单元完成, 其余不再开始
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号, 取消剩余单元");
            flag.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("ATTENDANCE_LOG_JSON").map_or(false, |v| v == "1") {
        logging::init_json();
    } else {
        logging::init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).ok_or_else(|| anyhow!(USAGE))?;

    let db_path = default_db_path();
    tracing::info!("{} v{}, 数据库: {}", attendance_engine::APP_NAME, attendance_engine::VERSION, db_path);
    let state = AppState::new(db_path)?;

    match command {
        "init" => {
            println!("schema ready: {}", state.db_path);
        }
        "import-employees" => {
            let path = args.get(1).ok_or_else(|| anyhow!("缺少员工文件路径"))?;
            let imported = state.import_employees(path)?;
            println!(
                "imported={} skipped_rows={:?}",
                imported.employees.len(),
                imported.skipped_rows
            );
        }
        "reconcile" => {
            let path = args.get(1).ok_or_else(|| anyhow!("缺少打卡文件路径"))?;

            let mut source = AttendanceSource::Biometric;
            let mut positional = Vec::new();
            let mut rest = args[2..].iter();
            while let Some(arg) = rest.next() {
                if arg == "--source" {
                    let raw = rest.next().ok_or_else(|| anyhow!("--source 缺少取值"))?;
                    source = raw.parse().map_err(|e: String| anyhow!(e))?;
                } else {
                    positional.push(arg.as_str());
                }
            }

            let range = match positional.as_slice() {
                [] => None,
                [start, end] => Some((parse_date(start)?, parse_date(end)?)),
                _ => bail!("日期范围需要同时给出 start 与 end"),
            };

            let cancel = cancel_on_ctrl_c();
            let report = state.reconcile_file(path, range, source, &cancel).await?;
            print_report(&report)?;
        }
        "recalc" => {
            let (start, end) = match (args.get(1), args.get(2)) {
                (Some(s), Some(e)) => (parse_date(s)?, parse_date(e)?),
                _ => bail!("recalc 需要 <start> <end>"),
            };
            let mut query = AttendanceQuery::date_range(start, end);
            if let Some(department) = args.get(3) {
                query = query.with_department(department.as_str());
            }

            let cancel = cancel_on_ctrl_c();
            let report = state.recalculate(query, &cancel).await?;
            print_report(&report)?;
        }
        "post" => {
            let (external_id, start, end) = match (args.get(1), args.get(2), args.get(3)) {
                (Some(id), Some(s), Some(e)) => (id, parse_date(s)?, parse_date(e)?),
                _ => bail!("post 需要 <employee_external_id> <start> <end>"),
            };
            let employee = state
                .employee_repo
                .find_by_external_id(external_id)?
                .ok_or_else(|| anyhow!("员工不存在: {}", external_id))?;
            let rows = state
                .attendance_repo
                .mark_posted(employee.employee_id, start, end)?;
            println!("posted={}", rows);
        }
        other => bail!("未知命令 {}\n{}", other, USAGE),
    }

    Ok(())
}
