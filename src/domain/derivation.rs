//! 地址派生
//!
//! `AddressDeriver` 是"账户 X 的第 N 个地址是什么"的唯一来源：
//! KeyNode 负责公钥派生，address_codec 负责编码，这里把两者串起来。

use std::ops::Range;

use tracing::{debug, warn};

use crate::config::DerivationConfig;
use crate::domain::address_codec;
use crate::domain::chain_config::{classify, classify_path, ChainScriptKind};
use crate::domain::derivation_path::{ChildIndex, DerivationPath};
use crate::domain::key_node::KeyNode;
use crate::domain::wallet::DerivedAddress;
use crate::error::{CoreResult, DerivationError, UnsupportedPathError};

/// 外部链（接收地址）
pub const EXTERNAL_CHAIN: u32 = 0;

/// 地址派生器
#[derive(Debug, Clone)]
pub struct AddressDeriver {
    max_address_index: u32,
    skip_invalid_children: bool,
}

impl Default for AddressDeriver {
    fn default() -> Self {
        Self::from_config(&DerivationConfig::default())
    }
}

impl AddressDeriver {
    pub fn new(max_address_index: u32, skip_invalid_children: bool) -> Self {
        Self {
            max_address_index,
            skip_invalid_children,
        }
    }

    pub fn from_config(config: &DerivationConfig) -> Self {
        Self::new(config.max_address_index, config.skip_invalid_children)
    }

    pub fn max_address_index(&self) -> u32 {
        self.max_address_index
    }

    pub fn skip_invalid_children(&self) -> bool {
        self.skip_invalid_children
    }

    /// 派生单个地址
    ///
    /// `path_prefix` 是扩展公钥所在的账户级路径，地址位于其下的 `0/<index>`。
    /// 路径判定出的脚本类型必须与 `kind` 一致。
    pub fn derive_address(
        &self,
        extended_public_key: &str,
        path_prefix: &str,
        index: u32,
        kind: ChainScriptKind,
    ) -> CoreResult<String> {
        let prefix: DerivationPath = path_prefix.parse()?;
        let actual = classify(&prefix)?;
        if actual != kind {
            return Err(UnsupportedPathError::KindMismatch {
                path: prefix.to_string(),
                requested: kind.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        let node = KeyNode::from_base58(extended_public_key)?;
        self.address_at(&node, kind, index)
    }

    /// 按路径前缀自动判定类型后派生
    pub fn derive_for_prefix(
        &self,
        extended_public_key: &str,
        path_prefix: &str,
        index: u32,
    ) -> CoreResult<(ChainScriptKind, String)> {
        let kind = classify_path(path_prefix)?;
        let address = self.derive_address(extended_public_key, path_prefix, index, kind)?;
        Ok((kind, address))
    }

    /// 账户节点 → 外部链节点
    pub fn external_chain(&self, account: &KeyNode) -> CoreResult<KeyNode> {
        Ok(account.derive_child(ChildIndex::normal(EXTERNAL_CHAIN)?)?)
    }

    /// 账户节点上第 `index` 个接收地址
    pub fn address_at(
        &self,
        account: &KeyNode,
        kind: ChainScriptKind,
        index: u32,
    ) -> CoreResult<String> {
        self.check_index(index)?;
        let external = self.external_chain(account)?;
        self.encode_child(&external, kind, index)
    }

    fn encode_child(&self, external: &KeyNode, kind: ChainScriptKind, index: u32) -> CoreResult<String> {
        let child = external.derive_child(ChildIndex::normal(index)?)?;
        let address = address_codec::encode(&child.public_key_bytes(), kind)?;
        debug!(kind = %kind, index, address = %address, "address derived");
        Ok(address)
    }

    fn check_index(&self, index: u32) -> Result<(), DerivationError> {
        if index > self.max_address_index {
            return Err(DerivationError::IndexOutOfRange {
                index,
                max: self.max_address_index,
            });
        }
        Ok(())
    }

    /// 批量派生一段索引
    ///
    /// 无效子密钥：`skip_invalid_children` 开启时记为不可用地址，否则返回错误。
    /// 其他错误总是返回。
    pub fn derive_range(
        &self,
        account: &KeyNode,
        kind: ChainScriptKind,
        indices: Range<u32>,
    ) -> CoreResult<Vec<DerivedAddress>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        self.check_index(indices.end - 1)?;

        let external = self.external_chain(account)?;
        let mut addresses = Vec::with_capacity(indices.len());
        for index in indices {
            match self.encode_child(&external, kind, index) {
                Ok(address) => addresses.push(DerivedAddress::new(index, address)),
                Err(err) if err.is_index_local() && self.skip_invalid_children => {
                    warn!(kind = %kind, index, error = %err, "address unavailable at index");
                    addresses.push(DerivedAddress::unavailable(index));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(addresses)
    }
}
