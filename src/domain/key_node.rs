//! 扩展公钥节点
//!
//! 解析 BIP32 序列化的扩展公钥（xpub/ypub/zpub/tpub/upub/vpub），
//! 只做公钥到公钥的子密钥派生，不接触任何私钥材料。

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use secp256k1::{PublicKey, Scalar, Secp256k1, VerifyOnly};
use sha2::Sha512;

use crate::domain::address_codec::hash160;
use crate::domain::derivation_path::{ChildIndex, DerivationPath};
use crate::error::{DerivationError, KeyParseError};

type HmacSha512 = Hmac<Sha512>;

/// 序列化长度: version(4) + depth(1) + fingerprint(4) + child(4) + chain code(32) + key(33)
pub const EXTENDED_KEY_LEN: usize = 78;

/// 公钥版本字节
const PUBLIC_VERSIONS: [(&str, [u8; 4]); 6] = [
    ("xpub", [0x04, 0x88, 0xB2, 0x1E]),
    ("ypub", [0x04, 0x9D, 0x7C, 0xB2]),
    ("zpub", [0x04, 0xB2, 0x47, 0x46]),
    ("tpub", [0x04, 0x35, 0x87, 0xCF]),
    ("upub", [0x04, 0x4A, 0x52, 0x62]),
    ("vpub", [0x04, 0x5F, 0x1C, 0xF6]),
];

/// 私钥版本字节（一律拒绝）
const PRIVATE_VERSIONS: [[u8; 4]; 6] = [
    [0x04, 0x88, 0xAD, 0xE4], // xprv
    [0x04, 0x9D, 0x78, 0x78], // yprv
    [0x04, 0xB2, 0x43, 0x0C], // zprv
    [0x04, 0x35, 0x83, 0x94], // tprv
    [0x04, 0x4A, 0x4E, 0x28], // uprv
    [0x04, 0x5F, 0x18, 0xBC], // vprv
];

/// xpub 版本，`from_parts` 构造的节点使用
pub const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];

/// 仅验证用的 secp256k1 上下文
static SECP: Lazy<Secp256k1<VerifyOnly>> = Lazy::new(Secp256k1::verification_only);

/// 扩展公钥节点
///
/// 不可变：派生总是返回新节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNode {
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    public_key: PublicKey,
}

/// 扩展公钥即根节点
pub type ExtendedKey = KeyNode;

impl KeyNode {
    /// 从 base58check 字符串解析
    pub fn from_base58(encoded: &str) -> Result<Self, KeyParseError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(KeyParseError::Empty);
        }

        let data = bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|e| KeyParseError::Base58(e.to_string()))?;

        Self::decode(&data)
    }

    /// 解析 78 字节序列化数据
    pub fn decode(data: &[u8]) -> Result<Self, KeyParseError> {
        if data.len() != EXTENDED_KEY_LEN {
            return Err(KeyParseError::InvalidLength(data.len()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[0..4]);
        if PRIVATE_VERSIONS.contains(&version) {
            return Err(KeyParseError::PrivateKeyMaterial);
        }
        if !PUBLIC_VERSIONS.iter().any(|(_, v)| *v == version) {
            return Err(KeyParseError::UnknownVersion(hex::encode(version)));
        }

        let depth = data[4];
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&data[5..9]);
        let child_number = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);

        // 私钥序列化的第 46 字节是 0x00
        if data[45] == 0x00 {
            return Err(KeyParseError::PrivateKeyMaterial);
        }
        let public_key = PublicKey::from_slice(&data[45..78])
            .map_err(|e| KeyParseError::InvalidPublicKey(e.to_string()))?;

        Ok(Self {
            version,
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            public_key,
        })
    }

    /// 由压缩公钥和链码（hex）构造根节点
    ///
    /// 部分硬件钱包导出时不带完整序列化，只给出这两项
    pub fn from_parts(public_key_hex: &str, chain_code_hex: &str) -> Result<Self, KeyParseError> {
        let key_bytes = hex::decode(public_key_hex.trim().trim_start_matches("0x"))
            .map_err(|e| KeyParseError::InvalidPublicKey(e.to_string()))?;
        let public_key = PublicKey::from_slice(&key_bytes)
            .map_err(|e| KeyParseError::InvalidPublicKey(e.to_string()))?;

        let code_bytes = hex::decode(chain_code_hex.trim().trim_start_matches("0x"))
            .map_err(|e| KeyParseError::InvalidChainCode(e.to_string()))?;
        let chain_code: [u8; 32] = code_bytes.as_slice().try_into().map_err(|_| {
            KeyParseError::InvalidChainCode(format!("expected 32 bytes, got {}", code_bytes.len()))
        })?;

        Ok(Self {
            version: XPUB_VERSION,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            public_key,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 派生
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// CKDpub：单步非硬化派生
    pub fn derive_child(&self, index: ChildIndex) -> Result<Self, DerivationError> {
        if index.is_hardened() {
            return Err(DerivationError::HardenedSegment(index.to_string()));
        }
        let depth = self
            .depth
            .checked_add(1)
            .ok_or(DerivationError::DepthOverflow)?;

        let invalid = || DerivationError::InvalidChild { index: index.raw() };

        let mut mac = HmacSha512::new_from_slice(&self.chain_code).map_err(|_| invalid())?;
        mac.update(&self.public_key.serialize());
        mac.update(&index.raw().to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let mut tweak_bytes = [0u8; 32];
        tweak_bytes.copy_from_slice(&digest[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);

        // IL >= n 或结果为无穷远点时，该索引无效
        let tweak = Scalar::from_be_bytes(tweak_bytes).map_err(|_| invalid())?;
        let public_key = self
            .public_key
            .add_exp_tweak(&*SECP, &tweak)
            .map_err(|_| invalid())?;

        Ok(Self {
            version: self.version,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: index.raw(),
            chain_code,
            public_key,
        })
    }

    /// 沿相对路径逐段派生
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, DerivationError> {
        if let Some(hardened) = path.first_hardened() {
            return Err(DerivationError::HardenedSegment(hardened.to_string()));
        }
        path.segments()
            .iter()
            .try_fold(self.clone(), |node, index| node.derive_child(*index))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 访问器
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 33 字节压缩公钥
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public_key.serialize()
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    /// 版本前缀名（xpub/zpub/...）
    pub fn version_name(&self) -> &'static str {
        PUBLIC_VERSIONS
            .iter()
            .find(|(_, v)| *v == self.version)
            .map(|(name, _)| *name)
            .unwrap_or("xpub")
    }

    /// hash160(pubkey) 前 4 字节
    pub fn fingerprint(&self) -> [u8; 4] {
        let id = hash160(&self.public_key.serialize());
        [id[0], id[1], id[2], id[3]]
    }

    /// 78 字节序列化
    pub fn encode(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[0..4].copy_from_slice(&self.version);
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..78].copy_from_slice(&self.public_key.serialize());
        out
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.encode()).with_check().into_string()
    }
}

impl FromStr for KeyNode {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl fmt::Display for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}
