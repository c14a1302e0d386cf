//! keywatch 主入口
//!
//! 恢复注册表 → 导入扫码数据 → 扩展地址 → 合并余额响应 → 落盘 → 输出 watch-list

use anyhow::{Context, Result};
use keywatch::{
    config::Config,
    domain::AddressDeriver,
    infrastructure::{
        logging::{init_default_logging, init_logging},
        RegistryFileStore,
    },
    service::{
        address_extension::extend_wallet, BalanceResponse, BalanceStore, ScanPayload, ScanSession,
        SharedBalanceStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 加载配置
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate()?;

    // 3. 初始化日志（guard 持有到进程结束）；配置不可用时退回默认日志
    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging from config: {}, using defaults", e);
            init_default_logging()
        }
    };

    tracing::info!("Starting keywatch");

    // 4. 恢复注册表
    let registry_store = config
        .persistence
        .registry_path
        .as_deref()
        .map(RegistryFileStore::new);
    let registry = match &registry_store {
        Some(file) => file.load()?,
        None => Default::default(),
    };
    let store = SharedBalanceStore::new(BalanceStore::from_registry(registry));

    // 5. 导入扫码数据
    if let Ok(path) = std::env::var("SCAN_PAYLOAD_PATH") {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read scan payload: {}", path))?;
        let mut session = ScanSession::from_config(&config.derivation);
        session.start_scan();
        let result = session.complete_scan(
            &mut *store.write().await,
            &ScanPayload::multi_accounts_json(bytes),
        )?;
        tracing::info!(
            fingerprint = %result.fingerprint,
            accounts = result.accounts.len(),
            skipped = result.skipped.len(),
            "Wallet imported"
        );
    }

    // 6. 按批次扩展活跃钱包的地址
    if std::env::var("EXTEND_ADDRESSES").map_or(false, |v| v == "1" || v == "true") {
        let mut guard = store.write().await;
        if let Some(fingerprint) = guard.active_fingerprint().map(str::to_string) {
            let deriver = AddressDeriver::from_config(&config.derivation);
            let added = extend_wallet(
                &mut guard,
                &deriver,
                &fingerprint,
                config.derivation.extension_batch_size,
            )?;
            tracing::info!(fingerprint = %fingerprint, added, "Addresses extended");
        }
    }

    // 7. 合并外部余额响应
    if let Ok(path) = std::env::var("BALANCE_RESPONSES_PATH") {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read balance responses: {}", path))?;
        let responses: Vec<BalanceResponse> = serde_json::from_str(&raw)?;
        for response in &responses {
            if let Err(e) = store.apply_response(response).await {
                tracing::warn!(address = %response.echoed_request.address, error = %e, "Balance response skipped");
            }
        }
    }

    // 8. 落盘并输出
    let guard = store.read().await;
    if let Some(file) = &registry_store {
        file.save(&guard.snapshot())?;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&guard.watch_list(None))?
    );

    Ok(())
}
