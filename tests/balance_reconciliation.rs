//! 余额对账测试
//!
//! 乱序、重复、未知索引的观测都要落到正确的位置上

mod common;

use common::*;
use keywatch::domain::derivation::AddressDeriver;
use keywatch::domain::derivation_path::DerivationPath;
use keywatch::domain::wallet::Balance;
use keywatch::error::ReconciliationError;
use keywatch::service::address_extension::{ensure_address, extend_account};
use keywatch::service::{ApplyOutcome, ObservationKey};
use rust_decimal::Decimal;

fn native_path() -> DerivationPath {
    "m/84'/0'/0'".parse().unwrap()
}

fn indexed(index: u32, address: Option<&str>) -> ObservationKey {
    ObservationKey::Indexed {
        fingerprint: FINGERPRINT.to_uppercase(),
        derivation_path: native_path(),
        address_index: index,
        address: address.map(str::to_string),
    }
}

#[test]
fn test_out_of_order_observations_self_heal() {
    let (mut store, _) = imported_store();

    assert_eq!(
        store
            .apply_balance(&indexed(2, Some(NATIVE_2)), Decimal::from(7))
            .unwrap(),
        ApplyOutcome::Inserted
    );
    assert_eq!(
        store
            .apply_balance(&indexed(1, Some(NATIVE_1)), Decimal::from(0))
            .unwrap(),
        ApplyOutcome::Inserted
    );

    let account = store.account(FINGERPRINT, &native_path()).unwrap();
    let indices: Vec<u32> = account.derived_addresses.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(account.address(2).unwrap().address(), Some(NATIVE_2));
}

#[test]
fn test_replayed_observation_is_idempotent() {
    let (mut store, _) = imported_store();
    let amount = Decimal::new(150_000, 8);

    store.apply_balance(&indexed(0, Some(NATIVE_0)), amount).unwrap();
    let once = store.snapshot();
    store.apply_balance(&indexed(0, Some(NATIVE_0)), amount).unwrap();
    assert_eq!(store.snapshot(), once);
}

#[test]
fn test_non_zero_addresses_join_watch_list() {
    let (mut store, _) = imported_store();

    store
        .apply_balance(&indexed(0, None), Decimal::from(1))
        .unwrap();
    store
        .apply_balance(&indexed(2, Some(NATIVE_2)), Decimal::from(5))
        .unwrap();
    store
        .apply_balance(&indexed(1, Some(NATIVE_1)), Decimal::from(0))
        .unwrap();

    let watch: Vec<String> = store
        .watch_list(None)
        .into_iter()
        .map(|e| e.address)
        .collect();
    // 首地址同时出现在两部分
    assert_eq!(
        watch,
        vec![NATIVE_0, WRAPPED_0, LEGACY_0, THOR_0, NATIVE_0, NATIVE_2]
    );

    let funded = store.wallet_with_balances(None).unwrap();
    assert_eq!(funded.coin_accounts.len(), 1);
    assert_eq!(funded.coin_accounts[0].total_balance(), Decimal::from(6));
}

#[test]
fn test_observation_with_conflicting_address() {
    let (mut store, _) = imported_store();
    let err = store
        .apply_balance(&indexed(0, Some(NATIVE_1)), Decimal::from(1))
        .unwrap_err();
    assert!(matches!(
        err,
        ReconciliationError::AddressMismatch { index: 0, .. }
    ));
    assert!(!store
        .account(FINGERPRINT, &native_path())
        .unwrap()
        .address(0)
        .unwrap()
        .balance
        .is_known());
}

#[test]
fn test_bare_address_fallback_uses_active_wallet() {
    let (mut store, _) = imported_store();

    let outcome = store
        .apply_balance(&ObservationKey::Address(THOR_0.to_string()), Decimal::from(42))
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Matched(1));

    let err = store
        .apply_balance(&ObservationKey::Address(NATIVE_2.to_string()), Decimal::from(1))
        .unwrap_err();
    assert_eq!(err, ReconciliationError::AddressNotFound(NATIVE_2.to_string()));
}

#[test]
fn test_extension_keeps_existing_balances() {
    let (mut store, _) = imported_store();
    let deriver = AddressDeriver::new(1000, false);

    store
        .apply_balance(&indexed(0, Some(NATIVE_0)), Decimal::from(3))
        .unwrap();
    let added = extend_account(&mut store, &deriver, FINGERPRINT, &native_path(), 2).unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(added[1].address(), Some(NATIVE_2));

    let thor_path: DerivationPath = "m/44'/931'/0'".parse().unwrap();
    let thor = ensure_address(&mut store, &deriver, FINGERPRINT, &thor_path, 1).unwrap();
    assert_eq!(thor.address(), Some(THOR_1));

    let account = store.account(FINGERPRINT, &native_path()).unwrap();
    assert_eq!(account.address(0).unwrap().balance, Balance::known(3));
    assert_eq!(account.derived_addresses.len(), 3);
}

#[test]
fn test_forget_wallet_clears_active() {
    let (mut store, _) = imported_store();
    assert!(store.forget_wallet(FINGERPRINT).is_some());
    assert_eq!(store.active_fingerprint(), None);
    assert!(store.watch_list(None).is_empty());
    assert_eq!(
        store.apply_balance(&ObservationKey::Address(NATIVE_0.into()), Decimal::from(1)),
        Err(ReconciliationError::NoActiveWallet)
    );
}
