//! BIP32 派生路径
//!
//! 路径是纯值类型：`m/84'/0'/0'`（绝对）或 `0/5`（相对），按相等比较

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnsupportedPathError;

/// 硬化索引起点 (2^31)
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// 路径中的单个段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildIndex(u32);

impl ChildIndex {
    /// 普通（非硬化）索引
    pub fn normal(index: u32) -> Result<Self, UnsupportedPathError> {
        if index >= HARDENED_OFFSET {
            return Err(UnsupportedPathError::Malformed {
                path: index.to_string(),
                reason: "index must be below 2^31".to_string(),
            });
        }
        Ok(Self(index))
    }

    /// 硬化索引
    pub fn hardened(index: u32) -> Result<Self, UnsupportedPathError> {
        if index >= HARDENED_OFFSET {
            return Err(UnsupportedPathError::Malformed {
                path: format!("{}'", index),
                reason: "index must be below 2^31".to_string(),
            });
        }
        Ok(Self(index | HARDENED_OFFSET))
    }

    /// 按 BIP32 编码的原始值（硬化位已合并）
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_hardened(&self) -> bool {
        self.0 >= HARDENED_OFFSET
    }

    /// 去掉硬化位后的索引值
    pub fn value(&self) -> u32 {
        self.0 & !HARDENED_OFFSET
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hardened() {
            write!(f, "{}'", self.value())
        } else {
            write!(f, "{}", self.value())
        }
    }
}

/// 派生路径
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    /// 以 `m/` 开头的绝对路径
    absolute: bool,
    segments: Vec<ChildIndex>,
}

impl DerivationPath {
    /// 相对路径
    pub fn relative(segments: Vec<ChildIndex>) -> Self {
        Self {
            absolute: false,
            segments,
        }
    }

    /// 绝对路径（`m/...`）
    pub fn absolute(segments: Vec<ChildIndex>) -> Self {
        Self {
            absolute: true,
            segments,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[ChildIndex] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// 追加一段，返回新路径
    pub fn child(&self, index: ChildIndex) -> Self {
        let mut segments = self.segments.clone();
        segments.push(index);
        Self {
            absolute: self.absolute,
            segments,
        }
    }

    /// 拼接相对路径
    pub fn extend(&self, tail: &DerivationPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend_from_slice(&tail.segments);
        Self {
            absolute: self.absolute,
            segments,
        }
    }

    /// 第一个硬化段（公钥派生不允许出现）
    pub fn first_hardened(&self) -> Option<ChildIndex> {
        self.segments.iter().copied().find(ChildIndex::is_hardened)
    }
}

impl FromStr for DerivationPath {
    type Err = UnsupportedPathError;

    /// 支持 `'`、`h`、`H` 三种硬化写法，`m/` 前缀可选
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| UnsupportedPathError::Malformed {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty path"));
        }

        let (absolute, body) = match trimmed {
            "m" | "M" => (true, ""),
            _ if trimmed.starts_with("m/") || trimmed.starts_with("M/") => (true, &trimmed[2..]),
            _ => (false, trimmed),
        };

        let mut segments = Vec::new();
        if !body.is_empty() {
            for component in body.split('/') {
                let (digits, hardened) = match component.strip_suffix(&['\'', 'h', 'H'][..]) {
                    Some(rest) => (rest, true),
                    None => (component, false),
                };
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(malformed(&format!("invalid segment '{}'", component)));
                }
                let value: u32 = digits
                    .parse()
                    .map_err(|_| malformed(&format!("segment '{}' out of range", component)))?;
                let index = if hardened {
                    ChildIndex::hardened(value)
                } else {
                    ChildIndex::normal(value)
                }
                .map_err(|_| malformed(&format!("segment '{}' out of range", component)))?;
                segments.push(index);
            }
        }

        Ok(Self { absolute, segments })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if self.absolute {
            write!(f, "m")?;
            first = false;
        }
        for segment in &self.segments {
            if first {
                write!(f, "{}", segment)?;
                first = false;
            } else {
                write!(f, "/{}", segment)?;
            }
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
