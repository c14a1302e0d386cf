//! 观察钱包领域模型
//!
//! Wallet → CoinAccount → DerivedAddress 三层结构，只保存公开信息：
//! 扩展公钥、派生路径、地址和余额。不存在任何私钥字段。

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::chain_config::{Chain, ChainScriptKind};
use crate::domain::derivation_path::DerivationPath;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 余额
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 地址余额
///
/// `Unknown` 与 `Known(0)` 是两种不同状态：前者表示尚未查询
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "amount", rename_all = "snake_case")]
pub enum Balance {
    #[default]
    Unknown,
    Known(Decimal),
}

impl Balance {
    pub fn known(amount: impl Into<Decimal>) -> Self {
        Balance::Known(amount.into())
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Balance::Known(_))
    }

    /// 已知且不为零
    pub fn is_non_zero(&self) -> bool {
        matches!(self, Balance::Known(amount) if !amount.is_zero())
    }

    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Balance::Known(amount) => Some(*amount),
            Balance::Unknown => None,
        }
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::Unknown => f.write_str("unknown"),
            Balance::Known(amount) => write!(f, "{}", amount),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 地址
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 某个索引上的派生地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAddress {
    pub index: u32,
    /// `None` 表示该索引无法派生（地址不可用），绝不用空字符串代替
    pub address: Option<String>,
    #[serde(default)]
    pub balance: Balance,
}

impl DerivedAddress {
    pub fn new(index: u32, address: impl Into<String>) -> Self {
        Self {
            index,
            address: Some(address.into()),
            balance: Balance::Unknown,
        }
    }

    /// 派生失败的索引
    pub fn unavailable(index: u32) -> Self {
        Self {
            index,
            address: None,
            balance: Balance::Unknown,
        }
    }

    pub fn is_available(&self) -> bool {
        self.address.is_some()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 账户
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 一条链 + 一个派生路径前缀对应的账户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinAccount {
    pub chain: Chain,
    pub symbol: String,
    pub script_kind: ChainScriptKind,
    pub derivation_path: DerivationPath,
    pub extended_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 按 index 升序，index 唯一
    #[serde(default)]
    pub derived_addresses: Vec<DerivedAddress>,
}

impl CoinAccount {
    pub fn new(
        script_kind: ChainScriptKind,
        derivation_path: DerivationPath,
        extended_public_key: impl Into<String>,
    ) -> Self {
        Self {
            chain: script_kind.chain(),
            symbol: script_kind.symbol().to_string(),
            script_kind,
            derivation_path,
            extended_public_key: extended_public_key.into(),
            name: None,
            derived_addresses: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<DerivedAddress>) -> Self {
        for address in addresses {
            self.upsert_address(address);
        }
        self
    }

    /// 账户索引（路径第三段）
    pub fn account_index(&self) -> u32 {
        self.derivation_path
            .segments()
            .get(2)
            .map(|segment| segment.value())
            .unwrap_or(0)
    }

    pub fn address(&self, index: u32) -> Option<&DerivedAddress> {
        self.derived_addresses
            .binary_search_by_key(&index, |a| a.index)
            .ok()
            .map(|pos| &self.derived_addresses[pos])
    }

    pub fn address_mut(&mut self, index: u32) -> Option<&mut DerivedAddress> {
        match self.derived_addresses.binary_search_by_key(&index, |a| a.index) {
            Ok(pos) => Some(&mut self.derived_addresses[pos]),
            Err(_) => None,
        }
    }

    /// 按 index 有序插入；已存在则保留原余额并返回 false
    pub fn upsert_address(&mut self, address: DerivedAddress) -> bool {
        match self
            .derived_addresses
            .binary_search_by_key(&address.index, |a| a.index)
        {
            Ok(pos) => {
                let existing = &mut self.derived_addresses[pos];
                if existing.address.is_none() {
                    existing.address = address.address;
                }
                false
            }
            Err(pos) => {
                self.derived_addresses.insert(pos, address);
                true
            }
        }
    }

    /// 接收地址（index 0）
    pub fn first_address(&self) -> Option<&DerivedAddress> {
        self.derived_addresses.first()
    }

    pub fn highest_index(&self) -> Option<u32> {
        self.derived_addresses.last().map(|a| a.index)
    }

    /// 下一个未派生的索引
    pub fn next_index(&self) -> u32 {
        self.highest_index().map_or(0, |i| i.saturating_add(1))
    }

    pub fn non_zero_addresses(&self) -> impl Iterator<Item = &DerivedAddress> {
        self.derived_addresses
            .iter()
            .filter(|a| a.balance.is_non_zero())
    }

    pub fn has_non_zero_balance(&self) -> bool {
        self.derived_addresses.iter().any(|a| a.balance.is_non_zero())
    }

    /// 已知余额之和（未知的不计入）
    pub fn total_balance(&self) -> Decimal {
        self.derived_addresses
            .iter()
            .filter_map(|a| a.balance.amount())
            .sum()
    }

    pub fn has_known_address(&self) -> bool {
        self.derived_addresses.iter().any(DerivedAddress::is_available)
    }

    /// 保证地址列表有序且 index 唯一（反序列化后的数据可能不满足）
    pub fn normalize(&mut self) {
        self.derived_addresses.sort_by_key(|a| a.index);
        self.derived_addresses.dedup_by_key(|a| a.index);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 钱包
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 硬件钱包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    #[default]
    Keystone,
    Ledger,
}

impl WalletType {
    /// 按导出数据里的设备名判断
    pub fn from_device(device: Option<&str>) -> Self {
        match device.map(|d| d.trim().to_lowercase()) {
            Some(d) if d.contains("ledger") => WalletType::Ledger,
            _ => WalletType::Keystone,
        }
    }
}

/// 以主指纹为身份的观察钱包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub master_fingerprint: String,
    pub wallet_type: WalletType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default)]
    pub coin_accounts: Vec<CoinAccount>,
}

impl Wallet {
    pub fn new(master_fingerprint: impl Into<String>, wallet_type: WalletType) -> Self {
        Self {
            master_fingerprint: master_fingerprint.into(),
            wallet_type,
            device: None,
            coin_accounts: Vec::new(),
        }
    }

    pub fn account(&self, path: &DerivationPath) -> Option<&CoinAccount> {
        self.coin_accounts
            .iter()
            .find(|a| &a.derivation_path == path)
    }

    pub fn account_mut(&mut self, path: &DerivationPath) -> Option<&mut CoinAccount> {
        self.coin_accounts
            .iter_mut()
            .find(|a| &a.derivation_path == path)
    }

    /// 插入或替换同路径的账户，返回是否为替换
    pub fn upsert_account(&mut self, account: CoinAccount) -> bool {
        match self.account_mut(&account.derivation_path) {
            Some(existing) => {
                *existing = account;
                true
            }
            None => {
                self.coin_accounts.push(account);
                false
            }
        }
    }

    pub fn has_non_zero_balance(&self) -> bool {
        self.coin_accounts.iter().any(CoinAccount::has_non_zero_balance)
    }
}

/// 钱包注册表：fingerprint → Wallet，最多一个活跃钱包
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRegistry {
    #[serde(default)]
    pub wallets: BTreeMap<String, Wallet>,
    #[serde(default)]
    pub active_wallet: Option<String>,
}

/// 主指纹规范化为 8 位小写 hex
pub fn normalize_fingerprint(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches("0x");
    if trimmed.len() == 8 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(trimmed.to_ascii_lowercase())
    } else {
        None
    }
}
