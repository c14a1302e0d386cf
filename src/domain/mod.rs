//! Domain 模块
//!
//! 派生路径、扩展公钥、地址编码、钱包模型。全部是纯函数和值类型，不做 IO。

pub mod address_codec;
pub mod chain_config;
pub mod derivation;
pub mod derivation_path;
pub mod key_node;
pub mod wallet;

// 重新导出常用类型
pub use chain_config::{classify, classify_path, AddressEncoding, Chain, ChainScriptKind};
pub use derivation::AddressDeriver;
pub use derivation_path::{ChildIndex, DerivationPath};
pub use key_node::{ExtendedKey, KeyNode};
pub use wallet::{Balance, CoinAccount, DerivedAddress, Wallet, WalletRegistry, WalletType};
