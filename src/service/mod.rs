pub mod address_extension; // 按需扩展地址
pub mod balance_store; // 对账引擎
pub mod balance_sync_service; // 并发余额同步
pub mod scan_session; // 硬件钱包导入

pub use balance_store::{
    ApplyOutcome, BalanceRequest, BalanceResponse, BalanceStore, ObservationKey, WatchEntry,
};
pub use balance_sync_service::{
    BalanceLookup, BalanceSyncService, LookupError, SharedBalanceStore, SyncReport,
};
pub use scan_session::{ScanPayload, ScanSession, ScanState, WalletImportResult};
