//! 地址编解码
//!
//! 公钥 → hash160 → 按脚本类型编码；以及反向解码与校验。
//! 编码规则由 [`ChainScriptKind::encoding`] 决定，这里只负责具体的字节流程。

use bech32::{hrp, Bech32, Fe32, Hrp};
use ripemd::{Digest, Ripemd160};
use sha2::Sha256;

use crate::domain::chain_config::{
    AddressEncoding, ChainScriptKind, BITCOIN_HRP, P2PKH_VERSION, P2SH_VERSION, THORCHAIN_HRP,
};
use crate::error::AddressError;

/// hash160 长度
pub const HASH160_LEN: usize = 20;

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; HASH160_LEN] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; HASH160_LEN];
    out.copy_from_slice(&ripe);
    out
}

/// P2SH-P2WPKH 赎回脚本: OP_0 PUSH20 <hash160>
fn p2wpkh_redeem_script(pubkey_hash: &[u8; HASH160_LEN]) -> [u8; 22] {
    let mut script = [0u8; 22];
    script[0] = 0x00;
    script[1] = 0x14;
    script[2..].copy_from_slice(pubkey_hash);
    script
}

/// 压缩公钥 → 地址
pub fn encode(public_key: &[u8], kind: ChainScriptKind) -> Result<String, AddressError> {
    let pubkey_hash = hash160(public_key);
    let payload = match kind {
        // 包装隔离见证需要再哈希一次赎回脚本
        ChainScriptKind::WrappedSegwit => hash160(&p2wpkh_redeem_script(&pubkey_hash)),
        ChainScriptKind::NativeSegwit
        | ChainScriptKind::Legacy
        | ChainScriptKind::ThorchainNative => pubkey_hash,
    };
    encode_payload(&payload, kind.encoding())
}

/// 公钥哈希 → 地址（不做 P2SH 包装，payload 原样编码）
pub fn encode_payload(
    payload: &[u8; HASH160_LEN],
    encoding: AddressEncoding,
) -> Result<String, AddressError> {
    match encoding {
        AddressEncoding::SegwitBech32 { hrp } => {
            let hrp = parse_hrp(hrp)?;
            bech32::segwit::encode_v0(hrp, payload)
                .map_err(|e| AddressError::Encoding(e.to_string()))
        }
        AddressEncoding::PlainBech32 { hrp } => {
            let hrp = parse_hrp(hrp)?;
            bech32::encode::<Bech32>(hrp, payload)
                .map_err(|e| AddressError::Encoding(e.to_string()))
        }
        AddressEncoding::Base58Check { version } => {
            let mut data = Vec::with_capacity(1 + HASH160_LEN);
            data.push(version);
            data.extend_from_slice(payload);
            Ok(bs58::encode(data).with_check().into_string())
        }
    }
}

fn parse_hrp(value: &str) -> Result<Hrp, AddressError> {
    if value == BITCOIN_HRP {
        return Ok(hrp::BC);
    }
    Hrp::parse(value).map_err(|e| AddressError::Encoding(e.to_string()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 解码
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 解码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub kind: ChainScriptKind,
    /// 地址中携带的 20 字节哈希（WrappedSegwit 为赎回脚本哈希）
    pub hash: [u8; HASH160_LEN],
}

/// 识别地址类型并取回哈希
pub fn decode(address: &str) -> Result<DecodedAddress, AddressError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid(address, "empty address"));
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("bc1") {
        decode_segwit(trimmed)
    } else if lower.starts_with("thor1") {
        decode_thorchain(trimmed)
    } else {
        decode_base58(trimmed)
    }
}

fn decode_segwit(address: &str) -> Result<DecodedAddress, AddressError> {
    let (hrp, version, program) =
        bech32::segwit::decode(address).map_err(|e| invalid(address, &e.to_string()))?;

    if hrp.to_lowercase() != BITCOIN_HRP {
        return Err(AddressError::Unsupported(address.to_string()));
    }
    // 仅支持 v0 P2WPKH；P2WSH 与 taproot 不在范围内
    if version != Fe32::Q || program.len() != HASH160_LEN {
        return Err(AddressError::Unsupported(address.to_string()));
    }

    Ok(DecodedAddress {
        kind: ChainScriptKind::NativeSegwit,
        hash: to_hash(address, &program)?,
    })
}

fn decode_thorchain(address: &str) -> Result<DecodedAddress, AddressError> {
    let (hrp, data) = bech32::decode(address).map_err(|e| invalid(address, &e.to_string()))?;

    if hrp.to_lowercase() != THORCHAIN_HRP {
        return Err(AddressError::Unsupported(address.to_string()));
    }

    Ok(DecodedAddress {
        kind: ChainScriptKind::ThorchainNative,
        hash: to_hash(address, &data)?,
    })
}

fn decode_base58(address: &str) -> Result<DecodedAddress, AddressError> {
    let data = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| invalid(address, &e.to_string()))?;

    let (version, payload) = data
        .split_first()
        .ok_or_else(|| invalid(address, "empty payload"))?;

    let kind = match *version {
        P2PKH_VERSION => ChainScriptKind::Legacy,
        P2SH_VERSION => ChainScriptKind::WrappedSegwit,
        _ => return Err(AddressError::Unsupported(address.to_string())),
    };

    Ok(DecodedAddress {
        kind,
        hash: to_hash(address, payload)?,
    })
}

fn to_hash(address: &str, bytes: &[u8]) -> Result<[u8; HASH160_LEN], AddressError> {
    bytes.try_into().map_err(|_| {
        invalid(
            address,
            &format!("expected {} byte payload, got {}", HASH160_LEN, bytes.len()),
        )
    })
}

fn invalid(address: &str, reason: &str) -> AddressError {
    AddressError::Invalid {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

/// 地址是否属于给定脚本类型
pub fn validate(kind: ChainScriptKind, address: &str) -> bool {
    matches!(decode(address), Ok(decoded) if decoded.kind == kind)
}

/// 地址是否由给定公钥按该脚本类型生成
pub fn matches_public_key(kind: ChainScriptKind, public_key: &[u8], address: &str) -> bool {
    matches!(encode(public_key, kind), Ok(expected) if expected == address)
}
