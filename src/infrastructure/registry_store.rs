//! 钱包注册表落盘
//!
//! 只保存公开材料（扩展公钥、地址、余额），JSON 格式。
//! 写入先落临时文件再 rename，进程中途退出不会留下半个文件。

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::wallet::WalletRegistry;
use crate::error::PersistenceError;

#[derive(Debug, Clone)]
pub struct RegistryFileStore {
    path: PathBuf,
}

impl RegistryFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取注册表；文件不存在时返回空注册表
    pub fn load(&self) -> Result<WalletRegistry, PersistenceError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "Registry file not found, starting empty");
            return Ok(WalletRegistry::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        let registry: WalletRegistry = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %self.path.display(),
            wallets = registry.wallets.len(),
            "Registry restored"
        );
        Ok(registry)
    }

    pub fn save(&self, registry: &WalletRegistry) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(registry)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            wallets = registry.wallets.len(),
            "Registry saved"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain_config::ChainScriptKind;
    use crate::domain::wallet::{Balance, CoinAccount, DerivedAddress, Wallet, WalletType};

    fn sample_registry() -> WalletRegistry {
        let mut wallet = Wallet::new("73c5da0a", WalletType::Ledger);
        let mut address = DerivedAddress::new(0, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
        address.balance = Balance::known(rust_decimal::Decimal::new(125, 3));
        wallet.upsert_account(
            CoinAccount::new(
                ChainScriptKind::NativeSegwit,
                "m/84'/0'/0'".parse().unwrap(),
                "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs",
            )
            .with_addresses(vec![address, DerivedAddress::unavailable(1)]),
        );

        let mut registry = WalletRegistry::default();
        registry.wallets.insert("73c5da0a".into(), wallet);
        registry.active_wallet = Some("73c5da0a".into());
        registry
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryFileStore::new(dir.path().join("registry.json"));
        let registry = store.load().unwrap();
        assert!(registry.wallets.is_empty());
        assert!(registry.active_wallet.is_none());
    }

    #[test]
    fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryFileStore::new(dir.path().join("nested").join("registry.json"));
        let registry = sample_registry();

        store.save(&registry).unwrap();
        assert!(!dir.path().join("nested").join("registry.json.tmp").exists());

        let restored = store.load().unwrap();
        assert_eq!(restored, registry);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "{not json").unwrap();

        let err = RegistryFileStore::new(path).load().unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
        assert_eq!(err.code(), "persistence_error");
    }
}
