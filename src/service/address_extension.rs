//! 按需扩展账户地址
//!
//! 导入时只派生少量地址，其余索引在首次需要时再派生。

use tracing::info;

use crate::domain::derivation::AddressDeriver;
use crate::domain::derivation_path::DerivationPath;
use crate::domain::key_node::KeyNode;
use crate::domain::wallet::{CoinAccount, DerivedAddress};
use crate::error::{CoreError, CoreResult, DerivationError, ReconciliationError};
use crate::service::balance_store::BalanceStore;

fn find_account<'a>(
    store: &'a BalanceStore,
    fingerprint: &str,
    path: &DerivationPath,
) -> Result<&'a CoinAccount, ReconciliationError> {
    let wallet = store
        .wallet(fingerprint)
        .ok_or_else(|| ReconciliationError::WalletNotFound(fingerprint.to_string()))?;
    wallet
        .account(path)
        .ok_or_else(|| ReconciliationError::AccountNotFound {
            fingerprint: wallet.master_fingerprint.clone(),
            path: path.to_string(),
        })
}

/// 在已知最大索引之后再派生 `count` 个地址
///
/// 返回新派生的地址（不可用的索引也包含在内）
pub fn extend_account(
    store: &mut BalanceStore,
    deriver: &AddressDeriver,
    fingerprint: &str,
    path: &DerivationPath,
    count: u32,
) -> CoreResult<Vec<DerivedAddress>> {
    let account = find_account(store, fingerprint, path)?;
    let start = account.next_index();
    if start > deriver.max_address_index() {
        return Err(DerivationError::IndexOutOfRange {
            index: start,
            max: deriver.max_address_index(),
        }
        .into());
    }
    let end = start
        .saturating_add(count)
        .min(deriver.max_address_index().saturating_add(1));

    let node = KeyNode::from_base58(&account.extended_public_key)?;
    let kind = account.script_kind;
    let derived = deriver.derive_range(&node, kind, start..end)?;

    store.insert_addresses(fingerprint, path, derived.clone())?;
    info!(
        fingerprint,
        path = %path,
        from = start,
        to = end,
        "account addresses extended"
    );
    Ok(derived)
}

/// 钱包内每个账户各扩展 `count` 个地址，已到上限的账户跳过
///
/// 返回新派生的地址总数
pub fn extend_wallet(
    store: &mut BalanceStore,
    deriver: &AddressDeriver,
    fingerprint: &str,
    count: u32,
) -> CoreResult<usize> {
    let paths: Vec<DerivationPath> = store
        .wallet(fingerprint)
        .ok_or_else(|| ReconciliationError::WalletNotFound(fingerprint.to_string()))?
        .coin_accounts
        .iter()
        .map(|a| a.derivation_path.clone())
        .collect();

    let mut total = 0;
    for path in &paths {
        match extend_account(store, deriver, fingerprint, path, count) {
            Ok(added) => total += added.len(),
            Err(CoreError::Derivation(DerivationError::IndexOutOfRange { .. })) => {
                info!(fingerprint, path = %path, "account already at max index");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// 保证 `index` 及其之前的索引都已派生，返回该索引上的地址
pub fn ensure_address(
    store: &mut BalanceStore,
    deriver: &AddressDeriver,
    fingerprint: &str,
    path: &DerivationPath,
    index: u32,
) -> CoreResult<DerivedAddress> {
    let account = find_account(store, fingerprint, path)?;
    if let Some(existing) = account.address(index).filter(|a| a.is_available()) {
        return Ok(existing.clone());
    }

    // 从第一个缺口开始补齐
    let first_missing = (0..=index)
        .find(|i| account.address(*i).map_or(true, |a| !a.is_available()))
        .unwrap_or(index);

    let node = KeyNode::from_base58(&account.extended_public_key)?;
    let kind = account.script_kind;
    let derived = deriver.derive_range(&node, kind, first_missing..index.saturating_add(1))?;
    store.insert_addresses(fingerprint, path, derived)?;

    let account = find_account(store, fingerprint, path)?;
    Ok(account
        .address(index)
        .cloned()
        .unwrap_or_else(|| DerivedAddress::unavailable(index)))
}
