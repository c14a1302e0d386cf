//! 多账户导入会话
//!
//! 状态机：Idle → Scanning → Idle。没有独立的错误状态，
//! 任何失败都回到 Idle 且注册表不变，重复扫描总是安全的。
//!
//! 导入数据的传输层（动态二维码、UR/CBOR）由外部负责，这里只接收解码后的字节。

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::DerivationConfig;
use crate::domain::chain_config::{classify, ChainScriptKind};
use crate::domain::derivation::AddressDeriver;
use crate::domain::derivation_path::DerivationPath;
use crate::domain::key_node::KeyNode;
use crate::domain::wallet::{normalize_fingerprint, CoinAccount, Wallet, WalletType};
use crate::error::{CoreError, KeyParseError, ScanParseError};
use crate::service::balance_store::BalanceStore;
use crate::utils::chain_normalizer::normalize_chain_identifier;

/// 支持的导入编码
pub const MULTI_ACCOUNTS_ENCODING: &str = "multi-accounts+json";

/// 导入协作方交来的原始数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPayload {
    pub encoding_type: String,
    pub payload_bytes: Vec<u8>,
}

impl ScanPayload {
    pub fn multi_accounts_json(payload_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            encoding_type: MULTI_ACCOUNTS_ENCODING.to_string(),
            payload_bytes: payload_bytes.into(),
        }
    }
}

/// 解码后的多账户导出
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiAccounts {
    master_fingerprint: String,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    keys: Vec<KeyRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRecord {
    #[serde(default)]
    chain: Option<String>,
    path: String,
    #[serde(default)]
    extended_public_key: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    chain_code: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// 被跳过的记录（路径无法识别）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub position: usize,
    pub path: String,
    pub reason: String,
}

/// 导入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletImportResult {
    pub fingerprint: String,
    pub wallet_type: WalletType,
    /// 导入的账户路径与类型
    pub accounts: Vec<(DerivationPath, ChainScriptKind)>,
    pub skipped: Vec<SkippedRecord>,
    /// 是否替换了同指纹的旧钱包
    pub replaced: bool,
}

/// 导入会话
#[derive(Debug, Clone)]
pub struct ScanSession {
    state: ScanState,
    progress: u8,
    deriver: AddressDeriver,
    initial_address_count: u32,
}

impl ScanSession {
    pub fn new(deriver: AddressDeriver, initial_address_count: u32) -> Self {
        Self {
            state: ScanState::Idle,
            progress: 0,
            deriver,
            initial_address_count,
        }
    }

    pub fn from_config(config: &DerivationConfig) -> Self {
        Self::new(
            AddressDeriver::from_config(config),
            config.initial_address_count,
        )
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn start_scan(&mut self) {
        self.state = ScanState::Scanning;
        self.progress = 0;
        info!("scan started");
    }

    /// 仅在 Scanning 时生效，截断到 [0, 100]
    pub fn report_progress(&mut self, percent: f64) {
        if self.state != ScanState::Scanning || percent.is_nan() {
            return;
        }
        self.progress = percent.clamp(0.0, 100.0).round() as u8;
    }

    pub fn cancel_scan(&mut self) {
        if self.state == ScanState::Scanning {
            info!(progress = self.progress, "scan cancelled");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.progress = 0;
    }

    /// 解析并导入
    ///
    /// 任何状态下都可调用，结束后总是 Idle。先完整解析再一次性写入，
    /// 失败时注册表保持不变。
    pub fn complete_scan(
        &mut self,
        store: &mut BalanceStore,
        payload: &ScanPayload,
    ) -> Result<WalletImportResult, ScanParseError> {
        let parsed = parse_payload(payload, &self.deriver, self.initial_address_count);
        self.reset();

        let (wallet, skipped) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "scan import rejected");
                return Err(err);
            }
        };

        let fingerprint = wallet.master_fingerprint.clone();
        let wallet_type = wallet.wallet_type;
        let accounts = wallet
            .coin_accounts
            .iter()
            .map(|a| (a.derivation_path.clone(), a.script_kind))
            .collect();
        let replaced = store.import_wallet(wallet).is_some();

        info!(
            fingerprint = %fingerprint,
            skipped = skipped.len(),
            replaced,
            "scan completed"
        );

        Ok(WalletImportResult {
            fingerprint,
            wallet_type,
            accounts,
            skipped,
            replaced,
        })
    }
}

/// 把导入数据解析成钱包，不触碰任何状态
pub fn parse_payload(
    payload: &ScanPayload,
    deriver: &AddressDeriver,
    initial_address_count: u32,
) -> Result<(Wallet, Vec<SkippedRecord>), ScanParseError> {
    if !payload
        .encoding_type
        .trim()
        .eq_ignore_ascii_case(MULTI_ACCOUNTS_ENCODING)
    {
        return Err(ScanParseError::UnsupportedEncoding(
            payload.encoding_type.clone(),
        ));
    }

    let decoded: MultiAccounts = serde_json::from_slice(&payload.payload_bytes)
        .map_err(|e| ScanParseError::Malformed(e.to_string()))?;

    let fingerprint = normalize_fingerprint(&decoded.master_fingerprint)
        .ok_or_else(|| ScanParseError::InvalidFingerprint(decoded.master_fingerprint.clone()))?;

    let mut wallet = Wallet::new(
        fingerprint,
        WalletType::from_device(decoded.device.as_deref()),
    );
    wallet.device = decoded.device.clone();

    let mut skipped = Vec::new();
    for (position, record) in decoded.keys.iter().enumerate() {
        let path: DerivationPath = match record.path.parse() {
            Ok(path) => path,
            Err(err) => {
                skip(&mut skipped, position, record, err.to_string());
                continue;
            }
        };
        let kind = match classify(&path) {
            Ok(kind) => kind,
            Err(err) => {
                skip(&mut skipped, position, record, err.to_string());
                continue;
            }
        };

        let account = build_account(position, record, path, kind, deriver, initial_address_count)?;
        wallet.upsert_account(account);
    }

    if wallet.coin_accounts.is_empty() {
        return Err(ScanParseError::NoSupportedAccounts);
    }

    Ok((wallet, skipped))
}

fn skip(skipped: &mut Vec<SkippedRecord>, position: usize, record: &KeyRecord, reason: String) {
    warn!(position, path = %record.path, reason = %reason, "skipping unsupported key record");
    skipped.push(SkippedRecord {
        position,
        path: record.path.clone(),
        reason,
    });
}

fn build_account(
    position: usize,
    record: &KeyRecord,
    path: DerivationPath,
    kind: ChainScriptKind,
    deriver: &AddressDeriver,
    initial_address_count: u32,
) -> Result<CoinAccount, ScanParseError> {
    let record_error = |source: CoreError| ScanParseError::Record {
        position,
        path: record.path.clone(),
        source: Box::new(source),
    };

    if let Some(declared) = record.chain.as_deref() {
        let matches = normalize_chain_identifier(declared)
            .map(|chain| chain == kind.chain())
            .unwrap_or(false);
        if !matches {
            return Err(ScanParseError::ChainMismatch {
                position,
                path: record.path.clone(),
                declared: declared.to_string(),
                derived: kind.chain().to_string(),
            });
        }
    }

    let node = match (
        record.extended_public_key.as_deref(),
        record.public_key.as_deref(),
        record.chain_code.as_deref(),
    ) {
        (Some(xpub), _, _) => KeyNode::from_base58(xpub),
        (None, Some(public_key), Some(chain_code)) => KeyNode::from_parts(public_key, chain_code),
        _ => Err(KeyParseError::Empty),
    }
    .map_err(|e| record_error(e.into()))?;

    let addresses = deriver
        .derive_range(&node, kind, 0..initial_address_count)
        .map_err(record_error)?;

    let mut account = CoinAccount::new(kind, path, node.to_base58()).with_addresses(addresses);
    account.name = record.name.clone();
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZPUB: &str = "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs";

    fn session() -> ScanSession {
        ScanSession::new(AddressDeriver::new(1000, false), 1)
    }

    fn payload(json: &str) -> ScanPayload {
        ScanPayload::multi_accounts_json(json.as_bytes().to_vec())
    }

    #[test]
    fn test_state_transitions() {
        let mut s = session();
        assert_eq!(s.state(), ScanState::Idle);

        s.report_progress(50.0);
        assert_eq!(s.progress(), 0);

        s.start_scan();
        assert!(s.is_scanning());
        s.report_progress(42.4);
        assert_eq!(s.progress(), 42);
        s.report_progress(250.0);
        assert_eq!(s.progress(), 100);
        s.report_progress(-3.0);
        assert_eq!(s.progress(), 0);

        s.cancel_scan();
        assert_eq!(s.state(), ScanState::Idle);
        assert_eq!(s.progress(), 0);
    }

    #[test]
    fn test_unsupported_encoding() {
        let mut s = session();
        let mut store = BalanceStore::new();
        s.start_scan();
        let bad = ScanPayload {
            encoding_type: "crypto-account".into(),
            payload_bytes: Vec::new(),
        };
        assert!(matches!(
            s.complete_scan(&mut store, &bad),
            Err(ScanParseError::UnsupportedEncoding(_))
        ));
        assert_eq!(s.state(), ScanState::Idle);
        assert_eq!(store.num_wallets(), 0);
    }

    #[test]
    fn test_malformed_json_leaves_store_untouched() {
        let mut s = session();
        let mut store = BalanceStore::new();
        s.start_scan();
        assert!(matches!(
            s.complete_scan(&mut store, &payload("{not json")),
            Err(ScanParseError::Malformed(_))
        ));
        assert_eq!(store.num_wallets(), 0);
        assert!(!s.is_scanning());
    }

    #[test]
    fn test_invalid_fingerprint() {
        let json = format!(
            r#"{{"masterFingerprint":"xyz","keys":[{{"path":"m/84'/0'/0'","extendedPublicKey":"{}"}}]}}"#,
            ZPUB
        );
        assert!(matches!(
            session().complete_scan(&mut BalanceStore::new(), &payload(&json)),
            Err(ScanParseError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_import_derives_initial_addresses() {
        let json = format!(
            r#"{{"masterFingerprint":"73C5DA0A","device":"Keystone 3 Pro","keys":[
                {{"chain":"BTC","path":"m/84'/0'/0'","extendedPublicKey":"{}","name":"Native SegWit"}}
            ]}}"#,
            ZPUB
        );
        let mut s = ScanSession::new(AddressDeriver::new(1000, false), 2);
        let mut store = BalanceStore::new();
        s.start_scan();
        let result = s.complete_scan(&mut store, &payload(&json)).unwrap();

        assert_eq!(result.fingerprint, "73c5da0a");
        assert_eq!(result.wallet_type, WalletType::Keystone);
        assert!(!result.replaced);
        assert_eq!(store.active_fingerprint(), Some("73c5da0a"));

        let path: DerivationPath = "m/84'/0'/0'".parse().unwrap();
        let account = store.account("73c5da0a", &path).unwrap();
        assert_eq!(account.name.as_deref(), Some("Native SegWit"));
        assert_eq!(account.derived_addresses.len(), 2);
        assert_eq!(
            account.first_address().unwrap().address(),
            Some("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu")
        );
    }

    #[test]
    fn test_chain_mismatch_aborts_import() {
        let json = format!(
            r#"{{"masterFingerprint":"73c5da0a","keys":[
                {{"chain":"THOR","path":"m/84'/0'/0'","extendedPublicKey":"{}"}}
            ]}}"#,
            ZPUB
        );
        let mut store = BalanceStore::new();
        assert!(matches!(
            session().complete_scan(&mut store, &payload(&json)),
            Err(ScanParseError::ChainMismatch { position: 0, .. })
        ));
        assert_eq!(store.num_wallets(), 0);
    }

    #[test]
    fn test_missing_key_material() {
        let json = r#"{"masterFingerprint":"73c5da0a","keys":[{"path":"m/84'/0'/0'"}]}"#;
        let err = session()
            .complete_scan(&mut BalanceStore::new(), &payload(json))
            .unwrap_err();
        assert!(matches!(err, ScanParseError::Record { position: 0, .. }));
    }
}
