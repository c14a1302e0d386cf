//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::derivation_path::HARDENED_OFFSET;

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub derivation: DerivationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// 地址派生配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// 导入时预先派生的地址数量
    pub initial_address_count: u32,
    /// 按需扩展时每批派生的数量
    pub extension_batch_size: u32,
    /// 无效子密钥记为不可用地址而非报错
    pub skip_invalid_children: bool,
    pub max_address_index: u32,
}

/// 余额同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_concurrent_lookups: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

/// 注册表持久化配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// 为空时不落盘
    pub registry_path: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            initial_address_count: env_parse("INITIAL_ADDRESS_COUNT").unwrap_or(1),
            extension_batch_size: env_parse("ADDRESS_EXTENSION_BATCH").unwrap_or(5),
            skip_invalid_children: std::env::var("SKIP_INVALID_CHILDREN")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            max_address_index: env_parse("MAX_ADDRESS_INDEX").unwrap_or(1000),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: env_parse("MAX_CONCURRENT_LOOKUPS").unwrap_or(8),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl PersistenceConfig {
    pub fn from_env() -> Self {
        Self {
            registry_path: std::env::var("REGISTRY_PATH").ok(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            derivation: DerivationConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
            persistence: PersistenceConfig::from_env(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.logging.enable_file_logging && self.logging.log_file_path.is_none() {
            anyhow::bail!("LOG_FILE_PATH is required when file logging is enabled");
        }

        let derivation = &self.derivation;
        if derivation.initial_address_count > derivation.max_address_index {
            anyhow::bail!(
                "INITIAL_ADDRESS_COUNT ({}) exceeds MAX_ADDRESS_INDEX ({})",
                derivation.initial_address_count,
                derivation.max_address_index
            );
        }
        if derivation.max_address_index >= HARDENED_OFFSET {
            anyhow::bail!(
                "MAX_ADDRESS_INDEX ({}) must be below the hardened range (2^31)",
                derivation.max_address_index
            );
        }
        if derivation.extension_batch_size == 0 {
            anyhow::bail!("ADDRESS_EXTENSION_BATCH must be greater than 0");
        }

        if self.sync.max_concurrent_lookups == 0 {
            anyhow::bail!("MAX_CONCURRENT_LOOKUPS must be greater than 0");
        }

        Ok(())
    }
}
