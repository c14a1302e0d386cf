//! keywatch - 硬件钱包只读观察核心
//!
//! 只持有扩展公钥：派生地址、导入硬件钱包账户、合并外部余额查询结果。
//! 不接触私钥和助记词。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

pub use error::{CoreError, CoreResult};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{
            AddressDeriver, Balance, Chain, ChainScriptKind, CoinAccount, DerivationPath,
            DerivedAddress, KeyNode, Wallet, WalletRegistry, WalletType,
        },
        error::{CoreError, CoreResult},
        service::{
            BalanceLookup, BalanceStore, BalanceSyncService, ScanPayload, ScanSession,
            SharedBalanceStore,
        },
    };
}
