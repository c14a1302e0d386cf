//! 余额对账引擎
//!
//! 持有 WalletRegistry，把异步到达的余额观测合并进
//! Wallet → CoinAccount → DerivedAddress 树。
//!
//! - 规范匹配键：(fingerprint, 派生路径前缀, 地址索引)
//! - 兼容路径：只有地址字符串时，在活跃钱包内按地址匹配
//! - 后写覆盖；重复观测幂等；缺失的索引按序插入
//!
//! 所有操作同步执行，多线程共享时由外层加锁（见 `balance_sync_service`）

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::chain_config::Chain;
use crate::domain::derivation_path::DerivationPath;
use crate::domain::wallet::{
    normalize_fingerprint, Balance, CoinAccount, DerivedAddress, Wallet, WalletRegistry,
    WalletType,
};
use crate::error::ReconciliationError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 观测与查询结构
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 余额观测的定位键
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationKey {
    /// 完整定位键
    Indexed {
        fingerprint: String,
        derivation_path: DerivationPath,
        address_index: u32,
        /// 观测到的地址，用于校验或补齐
        address: Option<String>,
    },
    /// 仅有地址字符串（兼容旧调用方）
    Address(String),
}

/// 一次合并的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 已有地址的余额被覆盖
    Updated,
    /// 索引不存在，已按序插入
    Inserted,
    /// 按地址字符串匹配，更新了 n 条
    Matched(usize),
}

/// 发给余额查询方的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub fingerprint: String,
    pub chain: Chain,
    pub derivation_path: DerivationPath,
    pub account_index: u32,
    pub address_index: u32,
    pub address: String,
}

/// 查询方的响应，必须回带原请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance: Decimal,
    pub echoed_request: BalanceRequest,
}

impl From<&BalanceRequest> for ObservationKey {
    fn from(request: &BalanceRequest) -> Self {
        ObservationKey::Indexed {
            fingerprint: request.fingerprint.clone(),
            derivation_path: request.derivation_path.clone(),
            address_index: request.address_index,
            address: Some(request.address.clone()),
        }
    }
}

/// watch-list 中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEntry {
    pub fingerprint: String,
    pub chain: Chain,
    pub symbol: String,
    pub derivation_path: DerivationPath,
    pub address_index: u32,
    pub address: String,
    pub balance: Balance,
}

impl WatchEntry {
    fn new(wallet: &Wallet, account: &CoinAccount, derived: &DerivedAddress) -> Option<Self> {
        let address = derived.address.clone()?;
        Some(Self {
            fingerprint: wallet.master_fingerprint.clone(),
            chain: account.chain,
            symbol: account.symbol.clone(),
            derivation_path: account.derivation_path.clone(),
            address_index: derived.index,
            address,
            balance: derived.balance,
        })
    }
}

/// 指纹统一为小写 hex；非 8 位 hex 的输入原样小写
fn fingerprint_key(raw: &str) -> String {
    normalize_fingerprint(raw).unwrap_or_else(|| raw.trim().to_lowercase())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BalanceStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 对账引擎
#[derive(Debug, Clone, Default)]
pub struct BalanceStore {
    registry: WalletRegistry,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化的注册表恢复
    ///
    /// 指纹键与 active 指针统一为小写；地址列表重新排序去重；
    /// 指向不存在钱包的 active 指针被清除
    pub fn from_registry(registry: WalletRegistry) -> Self {
        let WalletRegistry {
            wallets: stored,
            active_wallet,
        } = registry;

        let mut wallets = BTreeMap::new();
        for (raw, mut wallet) in stored {
            let key = fingerprint_key(&raw);
            wallet.master_fingerprint = key.clone();
            for account in &mut wallet.coin_accounts {
                account.normalize();
            }
            if wallets.insert(key.clone(), wallet).is_some() {
                warn!(fingerprint = %key, "duplicate wallet after fingerprint normalization, keeping last");
            }
        }

        let mut active_wallet = active_wallet.map(|fp| fingerprint_key(&fp));
        if let Some(fp) = active_wallet.as_deref() {
            if !wallets.contains_key(fp) {
                warn!(fingerprint = %fp, "dropping dangling active wallet");
                active_wallet = None;
            }
        }

        Self {
            registry: WalletRegistry {
                wallets,
                active_wallet,
            },
        }
    }

    /// 当前状态的副本，用于持久化
    pub fn snapshot(&self) -> WalletRegistry {
        self.registry.clone()
    }

    pub fn registry(&self) -> &WalletRegistry {
        &self.registry
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 写操作
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 插入或替换账户；钱包不存在时创建，没有活跃钱包时设为活跃
    ///
    /// 返回是否替换了已有账户
    pub fn seed_account(
        &mut self,
        fingerprint: &str,
        wallet_type: WalletType,
        mut account: CoinAccount,
    ) -> bool {
        let key = fingerprint_key(fingerprint);
        account.normalize();

        let wallet = self
            .registry
            .wallets
            .entry(key.clone())
            .or_insert_with(|| Wallet::new(key.clone(), wallet_type));
        let path = account.derivation_path.clone();
        let replaced = wallet.upsert_account(account);

        if self.registry.active_wallet.is_none() {
            self.registry.active_wallet = Some(key.clone());
        }

        debug!(fingerprint = %key, path = %path, replaced, "coin account seeded");
        replaced
    }

    /// 整体导入钱包，替换同指纹的旧钱包
    pub fn import_wallet(&mut self, mut wallet: Wallet) -> Option<Wallet> {
        let key = fingerprint_key(&wallet.master_fingerprint);
        wallet.master_fingerprint = key.clone();
        for account in &mut wallet.coin_accounts {
            account.normalize();
        }

        let accounts = wallet.coin_accounts.len();
        let previous = self.registry.wallets.insert(key.clone(), wallet);
        if self.registry.active_wallet.is_none() {
            self.registry.active_wallet = Some(key.clone());
        }

        info!(
            fingerprint = %key,
            accounts,
            replaced = previous.is_some(),
            "wallet imported"
        );
        previous
    }

    /// 切换活跃钱包
    pub fn set_active_wallet(&mut self, fingerprint: &str) -> Result<(), ReconciliationError> {
        let key = fingerprint_key(fingerprint);
        if !self.registry.wallets.contains_key(&key) {
            return Err(ReconciliationError::WalletNotFound(key));
        }
        self.registry.active_wallet = Some(key);
        Ok(())
    }

    /// 合并一条余额观测
    ///
    /// 观测总是已知余额：地址只会 Unknown → Known 或 Known → Known
    pub fn apply_balance(
        &mut self,
        key: &ObservationKey,
        balance: Decimal,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        let balance = Balance::Known(balance);
        match key {
            ObservationKey::Indexed {
                fingerprint,
                derivation_path,
                address_index,
                address,
            } => self.apply_indexed(
                fingerprint,
                derivation_path,
                *address_index,
                address.as_deref(),
                balance,
            ),
            ObservationKey::Address(address) => self.apply_by_address(address, balance),
        }
    }

    /// 合并查询方响应（按回带的请求定位）
    pub fn apply_response(
        &mut self,
        response: &BalanceResponse,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        self.apply_balance(
            &ObservationKey::from(&response.echoed_request),
            response.balance,
        )
    }

    fn apply_indexed(
        &mut self,
        fingerprint: &str,
        path: &DerivationPath,
        index: u32,
        observed: Option<&str>,
        balance: Balance,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        let key = fingerprint_key(fingerprint);
        let account = self
            .registry
            .wallets
            .get_mut(&key)
            .ok_or_else(|| ReconciliationError::WalletNotFound(key.clone()))?
            .account_mut(path)
            .ok_or_else(|| ReconciliationError::AccountNotFound {
                fingerprint: key.clone(),
                path: path.to_string(),
            })?;

        if let Some(existing) = account.address_mut(index) {
            if let (Some(known), Some(seen)) = (existing.address.as_deref(), observed) {
                if known != seen {
                    return Err(ReconciliationError::AddressMismatch {
                        path: path.to_string(),
                        index,
                        known: known.to_string(),
                        observed: seen.to_string(),
                    });
                }
            }
            if existing.address.is_none() {
                existing.address = observed.map(str::to_string);
            }
            existing.balance = balance;
            debug!(fingerprint = %key, path = %path, index, balance = %balance, "balance updated");
            return Ok(ApplyOutcome::Updated);
        }

        account.upsert_address(DerivedAddress {
            index,
            address: observed.map(str::to_string),
            balance,
        });
        debug!(fingerprint = %key, path = %path, index, balance = %balance, "address inserted from observation");
        Ok(ApplyOutcome::Inserted)
    }

    fn apply_by_address(
        &mut self,
        address: &str,
        balance: Balance,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        let active = self
            .registry
            .active_wallet
            .clone()
            .ok_or(ReconciliationError::NoActiveWallet)?;
        let wallet = self
            .registry
            .wallets
            .get_mut(&active)
            .ok_or_else(|| ReconciliationError::WalletNotFound(active.clone()))?;

        let mut matched = 0;
        for account in &mut wallet.coin_accounts {
            for derived in &mut account.derived_addresses {
                if derived.address.as_deref() == Some(address) {
                    derived.balance = balance;
                    matched += 1;
                }
            }
        }

        if matched == 0 {
            return Err(ReconciliationError::AddressNotFound(address.to_string()));
        }
        debug!(fingerprint = %active, address, matched, "balance matched by address");
        Ok(ApplyOutcome::Matched(matched))
    }

    /// 批量写入派生出的地址（已存在的索引保留余额）
    ///
    /// 返回新增条数
    pub fn insert_addresses(
        &mut self,
        fingerprint: &str,
        path: &DerivationPath,
        addresses: Vec<DerivedAddress>,
    ) -> Result<usize, ReconciliationError> {
        let key = fingerprint_key(fingerprint);
        let account = self
            .registry
            .wallets
            .get_mut(&key)
            .ok_or_else(|| ReconciliationError::WalletNotFound(key.clone()))?
            .account_mut(path)
            .ok_or_else(|| ReconciliationError::AccountNotFound {
                fingerprint: key.clone(),
                path: path.to_string(),
            })?;

        let mut inserted = 0;
        for address in addresses {
            if account.upsert_address(address) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// 删除钱包；若为活跃钱包则清空 active
    pub fn forget_wallet(&mut self, fingerprint: &str) -> Option<Wallet> {
        let key = fingerprint_key(fingerprint);
        let removed = self.registry.wallets.remove(&key);
        if self.registry.active_wallet.as_deref() == Some(key.as_str()) {
            self.registry.active_wallet = None;
        }
        if removed.is_some() {
            info!(fingerprint = %key, "wallet forgotten");
        }
        removed
    }

    pub fn forget_all(&mut self) {
        let count = self.registry.wallets.len();
        self.registry = WalletRegistry::default();
        info!(wallets = count, "all wallets forgotten");
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 查询（无副作用）
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //
    // `fingerprint` 为 None 时走活跃钱包

    pub fn active_fingerprint(&self) -> Option<&str> {
        self.registry.active_wallet.as_deref()
    }

    pub fn active_wallet(&self) -> Option<&Wallet> {
        self.active_fingerprint()
            .and_then(|fp| self.registry.wallets.get(fp))
    }

    pub fn wallet(&self, fingerprint: &str) -> Option<&Wallet> {
        self.registry.wallets.get(&fingerprint_key(fingerprint))
    }

    fn resolve(&self, fingerprint: Option<&str>) -> Option<&Wallet> {
        match fingerprint {
            Some(fp) => self.wallet(fp),
            None => self.active_wallet(),
        }
    }

    pub fn account(&self, fingerprint: &str, path: &DerivationPath) -> Option<&CoinAccount> {
        self.wallet(fingerprint).and_then(|w| w.account(path))
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.registry.wallets.values()
    }

    pub fn fingerprints(&self) -> Vec<String> {
        self.registry.wallets.keys().cloned().collect()
    }

    pub fn num_wallets(&self) -> usize {
        self.registry.wallets.len()
    }

    pub fn num_coin_accounts(&self, fingerprint: Option<&str>) -> usize {
        self.resolve(fingerprint)
            .map_or(0, |w| w.coin_accounts.len())
    }

    /// 只保留有非零余额账户的钱包视图（None 表示无钱包或全部为零）
    pub fn wallet_with_balances(&self, fingerprint: Option<&str>) -> Option<Wallet> {
        let wallet = self.resolve(fingerprint)?;
        let accounts: Vec<CoinAccount> = wallet
            .coin_accounts
            .iter()
            .filter(|a| a.has_non_zero_balance())
            .cloned()
            .collect();
        if accounts.is_empty() {
            return None;
        }
        Some(Wallet {
            coin_accounts: accounts,
            ..wallet.clone()
        })
    }

    /// 至少有一个可用地址的账户
    pub fn coin_accounts_with_known_addresses(&self, fingerprint: Option<&str>) -> Vec<&CoinAccount> {
        self.resolve(fingerprint)
            .map(|w| {
                w.coin_accounts
                    .iter()
                    .filter(|a| a.has_known_address())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 所有非零余额地址（按账户顺序、索引升序）
    pub fn non_zero_addresses(&self, fingerprint: Option<&str>) -> Vec<WatchEntry> {
        let Some(wallet) = self.resolve(fingerprint) else {
            return Vec::new();
        };
        wallet
            .coin_accounts
            .iter()
            .flat_map(|account| {
                account
                    .non_zero_addresses()
                    .filter_map(move |d| WatchEntry::new(wallet, account, d))
            })
            .collect()
    }

    /// 默认 watch-list：每个账户的首地址 + 所有非零地址
    ///
    /// 两部分直接拼接，不去重；去重由消费方负责
    pub fn watch_list(&self, fingerprint: Option<&str>) -> Vec<WatchEntry> {
        let Some(wallet) = self.resolve(fingerprint) else {
            return Vec::new();
        };
        let mut entries: Vec<WatchEntry> = wallet
            .coin_accounts
            .iter()
            .filter_map(|account| {
                account
                    .first_address()
                    .and_then(|d| WatchEntry::new(wallet, account, d))
            })
            .collect();
        entries.extend(self.non_zero_addresses(fingerprint));
        entries
    }

    /// 为钱包内每个可用地址生成查询请求
    pub fn balance_requests(
        &self,
        fingerprint: Option<&str>,
    ) -> Result<Vec<BalanceRequest>, ReconciliationError> {
        let wallet = match fingerprint {
            Some(fp) => self
                .wallet(fp)
                .ok_or_else(|| ReconciliationError::WalletNotFound(fingerprint_key(fp)))?,
            None => self
                .active_wallet()
                .ok_or(ReconciliationError::NoActiveWallet)?,
        };

        Ok(wallet
            .coin_accounts
            .iter()
            .flat_map(|account| {
                account.derived_addresses.iter().filter_map(move |d| {
                    d.address.as_ref().map(|address| BalanceRequest {
                        fingerprint: wallet.master_fingerprint.clone(),
                        chain: account.chain,
                        derivation_path: account.derivation_path.clone(),
                        account_index: account.account_index(),
                        address_index: d.index,
                        address: address.clone(),
                    })
                })
            })
            .collect())
    }
}
