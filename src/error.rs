//! 错误类型定义
//!
//! 按失败范围划分：单次派生、单个索引、整条路径、单次对账、单次导入

use thiserror::Error;

/// 扩展公钥解析错误（仅影响本次派生调用）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("extended key is empty")]
    Empty,

    #[error("invalid base58check encoding: {0}")]
    Base58(String),

    #[error("invalid extended key length: expected 78 bytes, got {0}")]
    InvalidLength(usize),

    #[error("unknown extended key version: {0}")]
    UnknownVersion(String),

    #[error("private key material is not accepted")]
    PrivateKeyMaterial,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid chain code: {0}")]
    InvalidChainCode(String),
}

/// 子密钥派生错误（仅影响当前索引，调用方可换索引重试）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("hardened segment {0} cannot be derived from a public key")]
    HardenedSegment(String),

    #[error("child {index} is invalid for this key")]
    InvalidChild { index: u32 },

    #[error("maximum derivation depth exceeded")]
    DepthOverflow,

    #[error("address index {index} exceeds configured maximum {max}")]
    IndexOutOfRange { index: u32, max: u32 },
}

/// 无法识别的派生路径 / 脚本类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedPathError {
    #[error("malformed derivation path '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("unsupported derivation path prefix '{0}'")]
    Unrecognized(String),

    #[error("path '{path}' classifies as {actual}, not {requested}")]
    KindMismatch {
        path: String,
        requested: String,
        actual: String,
    },
}

/// 地址编解码错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address encoding failed: {0}")]
    Encoding(String),

    #[error("invalid address '{address}': {reason}")]
    Invalid { address: String, reason: String },

    #[error("address '{0}' does not belong to a supported script kind")]
    Unsupported(String),
}

/// 余额观测无法匹配到已知账户
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("no active wallet")]
    NoActiveWallet,

    #[error("account {path} not found in wallet {fingerprint}")]
    AccountNotFound { fingerprint: String, path: String },

    #[error("address {0} is not tracked by the active wallet")]
    AddressNotFound(String),

    #[error("index {index} of {path} is {known}, observation carried {observed}")]
    AddressMismatch {
        path: String,
        index: u32,
        known: String,
        observed: String,
    },
}

/// 导入数据解析错误（注册表保持不变）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanParseError {
    #[error("unsupported payload encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid master fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("payload contains no supported accounts")]
    NoSupportedAccounts,

    #[error("key record {position} ({path}) declares chain {declared}, path belongs to {derived}")]
    ChainMismatch {
        position: usize,
        path: String,
        declared: String,
        derived: String,
    },

    #[error("key record {position} ({path}): {source}")]
    Record {
        position: usize,
        path: String,
        #[source]
        source: Box<CoreError>,
    },
}

/// 注册表持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 核心统一错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    KeyParse(#[from] KeyParseError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    UnsupportedPath(#[from] UnsupportedPathError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    ScanParse(#[from] ScanParseError),
}

impl CoreError {
    /// 稳定的错误码，供展示层映射
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::KeyParse(_) => "key_parse_error",
            CoreError::Derivation(_) => "derivation_error",
            CoreError::UnsupportedPath(_) => "unsupported_path",
            CoreError::Address(_) => "address_error",
            CoreError::Reconciliation(_) => "reconciliation_error",
            CoreError::ScanParse(_) => "scan_parse_error",
        }
    }

    /// 是否只影响单个索引（可换索引继续）
    pub fn is_index_local(&self) -> bool {
        matches!(self, CoreError::Derivation(DerivationError::InvalidChild { .. }))
    }
}

impl PersistenceError {
    pub fn code(&self) -> &'static str {
        "persistence_error"
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
