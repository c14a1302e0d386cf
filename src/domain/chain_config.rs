//! 链与脚本类型配置
//!
//! `ChainScriptKind` 是封闭枚举：每个变体固定派生路径骨架、哈希流程和地址编码。
//! 新增链 = 新增变体，所有 `match` 在编译期强制补全。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::derivation_path::{ChildIndex, DerivationPath};
use crate::error::UnsupportedPathError;

/// Bitcoin 主网 bech32 前缀
pub const BITCOIN_HRP: &str = "bc";
/// THORChain bech32 前缀
pub const THORCHAIN_HRP: &str = "thor";
/// P2PKH 版本字节
pub const P2PKH_VERSION: u8 = 0x00;
/// P2SH 版本字节
pub const P2SH_VERSION: u8 = 0x05;

/// 支持的链
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Bitcoin,
    Thorchain,
}

impl Chain {
    /// 原生资产符号
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Thorchain => "RUNE",
        }
    }

    /// 规范名称（小写）
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Thorchain => "thorchain",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// 地址编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEncoding {
    /// segwit v0 bech32（带见证版本）
    SegwitBech32 { hrp: &'static str },
    /// 普通 bech32（无见证版本，Cosmos 风格）
    PlainBech32 { hrp: &'static str },
    /// 版本字节 + base58check
    Base58Check { version: u8 },
}

/// 链 + 脚本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainScriptKind {
    /// BIP84 P2WPKH: bc1q...
    NativeSegwit,
    /// BIP44 P2PKH: 1...
    Legacy,
    /// BIP49 P2SH-P2WPKH: 3...
    WrappedSegwit,
    /// THORChain: thor1...
    ThorchainNative,
}

impl ChainScriptKind {
    pub const ALL: [ChainScriptKind; 4] = [
        ChainScriptKind::NativeSegwit,
        ChainScriptKind::Legacy,
        ChainScriptKind::WrappedSegwit,
        ChainScriptKind::ThorchainNative,
    ];

    pub fn chain(&self) -> Chain {
        match self {
            ChainScriptKind::NativeSegwit
            | ChainScriptKind::Legacy
            | ChainScriptKind::WrappedSegwit => Chain::Bitcoin,
            ChainScriptKind::ThorchainNative => Chain::Thorchain,
        }
    }

    pub fn symbol(&self) -> &'static str {
        self.chain().symbol()
    }

    /// BIP43 purpose
    pub fn purpose(&self) -> u32 {
        match self {
            ChainScriptKind::NativeSegwit => 84,
            ChainScriptKind::Legacy => 44,
            ChainScriptKind::WrappedSegwit => 49,
            ChainScriptKind::ThorchainNative => 44,
        }
    }

    /// SLIP-44 coin type
    pub fn coin_type(&self) -> u32 {
        match self {
            ChainScriptKind::NativeSegwit
            | ChainScriptKind::Legacy
            | ChainScriptKind::WrappedSegwit => 0,
            ChainScriptKind::ThorchainNative => 931,
        }
    }

    pub fn encoding(&self) -> AddressEncoding {
        match self {
            ChainScriptKind::NativeSegwit => AddressEncoding::SegwitBech32 { hrp: BITCOIN_HRP },
            ChainScriptKind::Legacy => AddressEncoding::Base58Check {
                version: P2PKH_VERSION,
            },
            ChainScriptKind::WrappedSegwit => AddressEncoding::Base58Check {
                version: P2SH_VERSION,
            },
            ChainScriptKind::ThorchainNative => {
                AddressEncoding::PlainBech32 { hrp: THORCHAIN_HRP }
            }
        }
    }

    /// 账户级路径骨架: m/purpose'/coin_type'/account'
    pub fn account_path(&self, account: u32) -> Result<DerivationPath, UnsupportedPathError> {
        Ok(DerivationPath::absolute(vec![
            ChildIndex::hardened(self.purpose())?,
            ChildIndex::hardened(self.coin_type())?,
            ChildIndex::hardened(account)?,
        ]))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainScriptKind::NativeSegwit => "native_segwit",
            ChainScriptKind::Legacy => "legacy",
            ChainScriptKind::WrappedSegwit => "wrapped_segwit",
            ChainScriptKind::ThorchainNative => "thorchain_native",
        }
    }
}

impl fmt::Display for ChainScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 按路径前缀判定脚本类型
///
/// 只看 purpose 与 coin_type 两段，两者都必须是硬化段；
/// 无法识别时返回错误，不做猜测。
pub fn classify(path: &DerivationPath) -> Result<ChainScriptKind, UnsupportedPathError> {
    let unrecognized = || UnsupportedPathError::Unrecognized(path.to_string());

    if !path.is_absolute() {
        return Err(UnsupportedPathError::Malformed {
            path: path.to_string(),
            reason: "path prefix must start with 'm/'".to_string(),
        });
    }

    let segments = path.segments();
    let (purpose, coin_type) = match segments {
        [purpose, coin_type, ..] => (*purpose, *coin_type),
        _ => return Err(unrecognized()),
    };
    if !purpose.is_hardened() || !coin_type.is_hardened() {
        return Err(unrecognized());
    }

    match (purpose.value(), coin_type.value()) {
        (84, 0) => Ok(ChainScriptKind::NativeSegwit),
        (49, 0) => Ok(ChainScriptKind::WrappedSegwit),
        (44, 0) => Ok(ChainScriptKind::Legacy),
        (44, 931) => Ok(ChainScriptKind::ThorchainNative),
        _ => Err(unrecognized()),
    }
}

/// 字符串版本的 [`classify`]
pub fn classify_path(prefix: &str) -> Result<ChainScriptKind, UnsupportedPathError> {
    let path: DerivationPath = prefix.parse()?;
    classify(&path)
}
