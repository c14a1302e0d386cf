//! 余额同步服务
//!
//! 对钱包内每个地址发起外部余额查询，按响应到达顺序逐条对账。
//! 查询本身（网络、超时、重试）属于外部协作方，这里不做重试。

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::SyncConfig;
use crate::error::ReconciliationError;
use crate::service::balance_store::{ApplyOutcome, BalanceRequest, BalanceResponse, BalanceStore};

/// 外部余额查询失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("balance lookup for {address} failed: {reason}")]
    Failed { address: String, reason: String },

    #[error("no balance source for chain {0}")]
    UnsupportedChain(String),
}

/// 外部余额查询协作方
///
/// 响应必须回带请求，对账不依赖响应顺序
#[async_trait]
pub trait BalanceLookup: Send + Sync {
    async fn lookup(&self, request: BalanceRequest) -> Result<BalanceResponse, LookupError>;
}

/// 加锁共享的对账引擎
///
/// 整个注册表一把锁；单次对账是同步的短临界区
#[derive(Debug, Clone, Default)]
pub struct SharedBalanceStore {
    inner: Arc<RwLock<BalanceStore>>,
}

impl SharedBalanceStore {
    pub fn new(store: BalanceStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, BalanceStore> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, BalanceStore> {
        self.inner.write().await
    }

    pub async fn apply_response(
        &self,
        response: &BalanceResponse,
    ) -> Result<ApplyOutcome, ReconciliationError> {
        self.inner.write().await.apply_response(response)
    }
}

/// 一轮同步的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub requested: usize,
    /// 覆盖了已有地址的余额
    pub applied: usize,
    /// 自愈插入的新索引
    pub inserted: usize,
    pub lookup_failures: usize,
    /// 被拒绝的响应：回带的请求与拒绝原因
    pub reconciliation_errors: Vec<(BalanceRequest, ReconciliationError)>,
}

impl SyncReport {
    pub fn reconciliation_failures(&self) -> usize {
        self.reconciliation_errors.len()
    }
}

/// 余额同步服务
pub struct BalanceSyncService {
    lookup: Arc<dyn BalanceLookup>,
    store: SharedBalanceStore,
    max_concurrent_lookups: usize,
}

impl BalanceSyncService {
    /// 创建余额同步服务
    pub fn new(lookup: Arc<dyn BalanceLookup>, store: SharedBalanceStore, config: &SyncConfig) -> Self {
        Self {
            lookup,
            store,
            max_concurrent_lookups: config.max_concurrent_lookups.max(1),
        }
    }

    pub fn store(&self) -> &SharedBalanceStore {
        &self.store
    }

    /// 同步钱包内所有已派生地址（None 为活跃钱包）
    pub async fn sync_wallet(
        &self,
        fingerprint: Option<&str>,
    ) -> Result<SyncReport, ReconciliationError> {
        let requests = self.store.read().await.balance_requests(fingerprint)?;
        Ok(self.sync_requests(requests).await)
    }

    /// 并发查询一组请求，结果按到达顺序合并
    pub async fn sync_requests(&self, requests: Vec<BalanceRequest>) -> SyncReport {
        let mut report = SyncReport {
            requested: requests.len(),
            ..SyncReport::default()
        };

        let mut responses = stream::iter(requests)
            .map(|request| {
                let lookup = Arc::clone(&self.lookup);
                async move { lookup.lookup(request).await }
            })
            .buffer_unordered(self.max_concurrent_lookups);

        while let Some(result) = responses.next().await {
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "Balance lookup failed");
                    report.lookup_failures += 1;
                    continue;
                }
            };

            match self.store.apply_response(&response).await {
                Ok(ApplyOutcome::Inserted) => report.inserted += 1,
                Ok(_) => report.applied += 1,
                Err(e) => {
                    tracing::warn!(
                        fingerprint = %response.echoed_request.fingerprint,
                        path = %response.echoed_request.derivation_path,
                        index = response.echoed_request.address_index,
                        error = %e,
                        "Balance response could not be reconciled"
                    );
                    report
                        .reconciliation_errors
                        .push((response.echoed_request, e));
                }
            }
        }

        tracing::info!(
            requested = report.requested,
            applied = report.applied,
            inserted = report.inserted,
            lookup_failures = report.lookup_failures,
            reconciliation_failures = report.reconciliation_failures(),
            "Balance sync finished"
        );

        report
    }
}
