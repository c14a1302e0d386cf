//! 并发余额同步测试

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use keywatch::config::SyncConfig;
use keywatch::domain::wallet::Balance;
use keywatch::error::ReconciliationError;
use keywatch::service::{
    ApplyOutcome, BalanceLookup, BalanceRequest, BalanceResponse, BalanceSyncService,
    LookupError, SharedBalanceStore,
};
use rust_decimal::Decimal;

/// 按地址返回固定余额；越靠前的请求延迟越久，让响应乱序到达
struct ScriptedLookup {
    balances: HashMap<String, Decimal>,
}

#[async_trait]
impl BalanceLookup for ScriptedLookup {
    async fn lookup(&self, request: BalanceRequest) -> Result<BalanceResponse, LookupError> {
        let delay = match request.address_index {
            0 => 30,
            _ => 5,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        match self.balances.get(&request.address) {
            Some(balance) => Ok(BalanceResponse {
                balance: *balance,
                echoed_request: request,
            }),
            None => Err(LookupError::Failed {
                address: request.address,
                reason: "not indexed".into(),
            }),
        }
    }
}

/// 回带被篡改的请求，模拟错乱的查询方
struct MisroutingLookup;

#[async_trait]
impl BalanceLookup for MisroutingLookup {
    async fn lookup(&self, mut request: BalanceRequest) -> Result<BalanceResponse, LookupError> {
        request.address = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".into();
        Ok(BalanceResponse {
            balance: Decimal::ONE,
            echoed_request: request,
        })
    }
}

fn sync_config() -> SyncConfig {
    SyncConfig {
        max_concurrent_lookups: 3,
    }
}

#[tokio::test]
async fn test_sync_active_wallet() {
    let (mut store, _) = imported_store();
    let deriver = keywatch::domain::derivation::AddressDeriver::new(1000, false);
    keywatch::service::address_extension::extend_account(
        &mut store,
        &deriver,
        FINGERPRINT,
        &"m/84'/0'/0'".parse().unwrap(),
        2,
    )
    .unwrap();

    let balances = HashMap::from([
        (NATIVE_0.to_string(), Decimal::new(5, 1)),
        (NATIVE_2.to_string(), Decimal::from(2)),
        (WRAPPED_0.to_string(), Decimal::ZERO),
        (LEGACY_0.to_string(), Decimal::ZERO),
        (THOR_0.to_string(), Decimal::from(100)),
    ]);

    let shared = SharedBalanceStore::new(store);
    let service = BalanceSyncService::new(
        Arc::new(ScriptedLookup { balances }),
        shared.clone(),
        &sync_config(),
    );

    let report = service.sync_wallet(None).await.unwrap();
    assert_eq!(report.requested, 6);
    assert_eq!(report.applied, 5);
    assert_eq!(report.lookup_failures, 1);
    assert!(report.reconciliation_errors.is_empty());

    let store = shared.read().await;
    let native = store
        .account(FINGERPRINT, &"m/84'/0'/0'".parse().unwrap())
        .unwrap();
    assert_eq!(native.address(0).unwrap().balance, Balance::known(Decimal::new(5, 1)));
    assert_eq!(native.address(1).unwrap().balance, Balance::Unknown);
    assert_eq!(native.address(2).unwrap().balance, Balance::known(2));

    let non_zero: Vec<String> = store
        .non_zero_addresses(None)
        .into_iter()
        .map(|e| e.address)
        .collect();
    assert_eq!(non_zero, vec![NATIVE_0, NATIVE_2, THOR_0]);
}

#[tokio::test]
async fn test_misrouted_responses_are_rejected() {
    let (store, _) = imported_store();
    let shared = SharedBalanceStore::new(store);
    let service = BalanceSyncService::new(Arc::new(MisroutingLookup), shared.clone(), &sync_config());

    let report = service.sync_wallet(Some(FINGERPRINT)).await.unwrap();
    assert_eq!(report.requested, 4);
    assert_eq!(report.applied, 0);
    assert_eq!(report.reconciliation_failures(), 4);
    for (request, error) in &report.reconciliation_errors {
        assert!(matches!(
            error,
            ReconciliationError::AddressMismatch { index: 0, .. }
        ));
        assert_eq!(request.address, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    let store = shared.read().await;
    assert!(store.non_zero_addresses(None).is_empty());
    assert!(store
        .wallet(FINGERPRINT)
        .unwrap()
        .coin_accounts
        .iter()
        .flat_map(|a| a.derived_addresses.iter())
        .all(|d| d.balance == Balance::Unknown));
}

#[tokio::test]
async fn test_concurrent_duplicate_responses() {
    let (store, _) = imported_store();
    let request = store.balance_requests(None).unwrap().remove(0);
    let response = BalanceResponse {
        balance: Decimal::new(42, 3),
        echoed_request: request,
    };

    let mut once = store.clone();
    once.apply_response(&response).unwrap();

    let shared = SharedBalanceStore::new(store);
    let first = shared.clone();
    let second = shared.clone();
    let (a, b) = tokio::join!(
        tokio::spawn({
            let response = response.clone();
            async move { first.apply_response(&response).await }
        }),
        tokio::spawn({
            let response = response.clone();
            async move { second.apply_response(&response).await }
        }),
    );
    assert_eq!(a.unwrap(), Ok(ApplyOutcome::Updated));
    assert_eq!(b.unwrap(), Ok(ApplyOutcome::Updated));

    assert_eq!(shared.read().await.snapshot(), once.snapshot());
}

#[tokio::test]
async fn test_sync_unknown_wallet() {
    let (store, _) = imported_store();
    let service = BalanceSyncService::new(
        Arc::new(MisroutingLookup),
        SharedBalanceStore::new(store),
        &sync_config(),
    );
    assert!(service.sync_wallet(Some("deadbeef")).await.is_err());
}
