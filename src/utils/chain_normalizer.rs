//! 链标识符标准化模块
//!
//! 外部协作方（导入数据、余额查询）给出的链名写法各不相同，
//! 统一映射到 [`Chain`]

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::domain::chain_config::Chain;

/// 链标识符配置
///
/// 规范名与符号取自 [`Chain`]，这里只登记额外的别名
#[derive(Debug, Clone)]
pub struct ChainIdentifier {
    pub chain: Chain,
    /// 别名列表（匹配时忽略大小写）
    pub aliases: &'static [&'static str],
}

/// 链标识符注册表（静态初始化）
static CHAIN_REGISTRY: Lazy<HashMap<String, ChainIdentifier>> = Lazy::new(|| {
    let chains = vec![
        ChainIdentifier {
            chain: Chain::Bitcoin,
            aliases: &["btc", "xbt"],
        },
        ChainIdentifier {
            chain: Chain::Thorchain,
            aliases: &["thor", "rune", "thorchain-mainnet-v1"],
        },
    ];

    let mut registry = HashMap::new();
    for id in chains {
        registry.insert(id.chain.canonical_name().to_string(), id.clone());
        registry.insert(id.chain.symbol().to_lowercase(), id.clone());
        for alias in id.aliases {
            registry.insert(alias.to_string(), id.clone());
        }
    }

    registry
});

/// 标准化链标识符
///
/// # 示例
/// ```rust
/// # use keywatch::utils::chain_normalizer::normalize_chain_identifier;
/// # use keywatch::domain::chain_config::Chain;
/// assert_eq!(normalize_chain_identifier("BTC").unwrap(), Chain::Bitcoin);
/// assert_eq!(normalize_chain_identifier("Thorchain").unwrap(), Chain::Thorchain);
/// ```
pub fn normalize_chain_identifier(input: &str) -> anyhow::Result<Chain> {
    get_chain_config(input).map(|config| config.chain)
}

/// 获取链配置
pub fn get_chain_config(input: &str) -> anyhow::Result<&'static ChainIdentifier> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Chain identifier cannot be empty");
    }

    CHAIN_REGISTRY
        .get(&trimmed.to_lowercase())
        .ok_or_else(|| anyhow::anyhow!("Unsupported chain identifier: {}", trimmed))
}
