//! 测试辅助模块
//! 提供公开测试向量和导入数据构造函数

#![allow(dead_code)]

use keywatch::domain::derivation::AddressDeriver;
use keywatch::service::{BalanceStore, ScanPayload, ScanSession, WalletImportResult};

/// 测试用主指纹
pub const FINGERPRINT: &str = "73c5da0a";

/// BIP84 账户 m/84'/0'/0'
pub const ZPUB_84: &str = "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs";
/// BIP49 账户 m/49'/0'/0'
pub const YPUB_49: &str = "ypub6Ww3ibxVfGzLrAH1PNcjyAWenMTbbAosGNB6VvmSEgytSER9azLDWCxoJwW7Ke7icmizBMXrzBx9979FfaHxHcrArf3zbeJJJUZPf663zsP";
/// BIP44 账户 m/44'/0'/0'
pub const XPUB_44: &str = "xpub6BosfCnifzxcFwrSzQiqu2DBVTshkCXacvNsWGYJVVhhawA7d4R5WSWGFNbi8Aw6ZRc1brxMyWMzG3DSSSSoekkudhUd9yLb6qx39T9nMdj";

/// ZPUB_84 的压缩公钥与链码
pub const ZPUB_84_PUBLIC_KEY: &str =
    "02707a62fdacc26ea9b63b1c197906f56ee0180d0bcf1966e1a2da34f5f3a09a9b";
pub const ZPUB_84_CHAIN_CODE: &str =
    "4a53a0ab21b9dc95869c4e92a161194e03c0ef3ff5014ac692f433c4765490fc";

pub const NATIVE_0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
pub const NATIVE_1: &str = "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g";
pub const NATIVE_2: &str = "bc1qp59yckz4ae5c4efgw2s5wfyvrz0ala7rgvuz8z";
pub const WRAPPED_0: &str = "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf";
pub const LEGACY_0: &str = "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA";
/// ZPUB_84 的公钥挂在 m/44'/931'/0' 下时的地址
pub const THOR_0: &str = "thor1cr8te4kr609gcawutmrza0j4xv80jy8zpjae4w";
pub const THOR_1: &str = "thor1njg0jd8228aq7egyzacy8cys3knf9xvrf73e56";

/// 一条导入记录
pub fn key_record(path: &str, xpub: &str) -> String {
    format!(r#"{{"path":"{}","extendedPublicKey":"{}"}}"#, path, xpub)
}

pub fn key_record_with_chain(chain: &str, path: &str, xpub: &str) -> String {
    format!(
        r#"{{"chain":"{}","path":"{}","extendedPublicKey":"{}"}}"#,
        chain, path, xpub
    )
}

/// 多账户导出 JSON
pub fn multi_accounts_json(fingerprint: &str, device: &str, records: &[String]) -> String {
    format!(
        r#"{{"masterFingerprint":"{}","device":"{}","keys":[{}]}}"#,
        fingerprint,
        device,
        records.join(",")
    )
}

/// 三个比特币账户 + 一个 THORChain 账户
pub fn standard_payload() -> ScanPayload {
    let json = multi_accounts_json(
        FINGERPRINT,
        "Keystone 3 Pro",
        &[
            key_record_with_chain("BTC", "m/84'/0'/0'", ZPUB_84),
            key_record("m/49'/0'/0'", YPUB_49),
            key_record("m/44'/0'/0'", XPUB_44),
            key_record_with_chain("THOR", "m/44'/931'/0'", ZPUB_84),
        ],
    );
    ScanPayload::multi_accounts_json(json.into_bytes())
}

pub fn test_session() -> ScanSession {
    ScanSession::new(AddressDeriver::new(1000, false), 1)
}

/// 导入标准数据，返回注册表
pub fn imported_store() -> (BalanceStore, WalletImportResult) {
    let mut store = BalanceStore::new();
    let mut session = test_session();
    session.start_scan();
    let result = session
        .complete_scan(&mut store, &standard_payload())
        .expect("standard payload imports");
    (store, result)
}
