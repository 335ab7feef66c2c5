// ==========================================
// 考勤核算引擎 - 日志
// ==========================================
// 输出: 人读格式 (默认) 或 JSON 行 (ATTENDANCE_LOG_JSON=1, 供定时批处理采集)
// 级别: RUST_LOG, 未设置时为 info
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// RUST_LOG 未设置或无法解析时使用的级别
const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// 命令行日志
///
/// ```no_run
/// attendance_engine::logging::init();
/// tracing::info!(units = 12, "开始打卡对账");
/// ```
pub fn init() {
    fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// JSON 行日志; 批次报告的字段 (run_id, created, updated ...) 逐个展开
pub fn init_json() {
    fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(false)
        .flatten_event(true)
        .init();
}

/// 测试日志: debug 级别, 输出交给测试框架捕获, 重复调用无副作用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("attendance_engine=debug"))
        .with_test_writer()
        .try_init();
}
