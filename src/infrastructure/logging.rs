//! 日志系统配置模块
//! 支持结构化日志、日志级别配置和按天轮转的文件日志

use std::path::Path;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 默认日志文件名
const LOG_FILE_NAME: &str = "keywatch.log";

/// 初始化日志系统
///
/// 开启文件日志时返回写线程的 guard，调用方需持有到进程结束，否则缓冲内容会丢失
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    // RUST_LOG 优先
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.format == "json" {
        init_json_logging(filter, config)
    } else {
        init_text_logging(filter, config)
    }
}

/// 日志文件目录与文件名
fn log_target(config: &LoggingConfig) -> (&Path, &str) {
    let path = config.log_file_path.as_deref().map(Path::new);
    let dir = path
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("./logs"));
    let file = path
        .and_then(Path::file_name)
        .and_then(|f| f.to_str())
        .unwrap_or(LOG_FILE_NAME);
    (dir, file)
}

/// 初始化JSON格式日志（结构化日志）
fn init_json_logging(
    filter: EnvFilter,
    config: &LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    if config.enable_file_logging {
        let (log_dir, file_name) = log_target(config);
        std::fs::create_dir_all(log_dir)?;

        let file_appender = rolling::daily(log_dir, file_name);
        let (non_blocking_appender, guard) = non_blocking(file_appender);

        let file_layer = fmt::layer()
            .json()
            .with_writer(non_blocking_appender)
            .with_timer(ChronoUtc::rfc_3339());
        let stdout_layer = fmt::layer().json().with_timer(ChronoUtc::rfc_3339());

        Registry::default()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .try_init()?;

        Ok(Some(guard))
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()))
            .try_init()?;

        Ok(None)
    }
}

/// 初始化文本格式日志
fn init_text_logging(
    filter: EnvFilter,
    config: &LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    if config.enable_file_logging {
        let (log_dir, file_name) = log_target(config);
        std::fs::create_dir_all(log_dir)?;

        let file_appender = rolling::daily(log_dir, file_name);
        let (non_blocking_appender, guard) = non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false);
        let stdout_layer = fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true);

        Registry::default()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .try_init()?;

        Ok(Some(guard))
    } else {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(true),
            )
            .try_init()?;

        Ok(None)
    }
}

/// 简化初始化（使用默认配置）
pub fn init_default_logging() -> Option<WorkerGuard> {
    let config = LoggingConfig::default();
    init_logging(&config).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        // 回退到最基本的日志初始化
        let _ = tracing_subscriber::fmt().try_init();
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: Option<&str>) -> LoggingConfig {
        LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            enable_file_logging: true,
            log_file_path: path.map(str::to_string),
        }
    }

    #[test]
    fn test_log_target_from_path() {
        let cfg = config(Some("/var/log/keywatch/app.log"));
        let (dir, file) = log_target(&cfg);
        assert_eq!(dir, Path::new("/var/log/keywatch"));
        assert_eq!(file, "app.log");
    }

    #[test]
    fn test_log_target_defaults() {
        let cfg = config(None);
        let (dir, file) = log_target(&cfg);
        assert_eq!(dir, Path::new("./logs"));
        assert_eq!(file, LOG_FILE_NAME);

        // 只有文件名时目录退回默认
        let cfg = config(Some("app.log"));
        assert_eq!(log_target(&cfg).0, Path::new("./logs"));
    }

    #[test]
    fn test_default_logging_survives_reinit() {
        let _guard = init_default_logging();
        // 全局 subscriber 已存在，再次初始化走回退分支而不是 panic
        assert!(init_default_logging().is_none());
        tracing::info!("logging still usable after fallback");
    }
}
