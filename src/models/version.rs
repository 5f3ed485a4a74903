//! 版本兼容性检查
//!
//! `unitDefinitionType` 与 `unitStateDataType` 的形式都是 `<name>@<major>.<minor>`。
//! 支持的版本登记在静态表里，检查结果是带类型的 [`Incompatibility`]，
//! 由调用方决定转换成哪种协议错误。

use phf::phf_map;
use std::fmt;

/// 某个格式名下支持的版本范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedRange {
    pub major: u32,
    pub max_minor: u32,
}

/// 支持的单元定义格式
static UNIT_DEFINITION_TYPES: phf::Map<&'static str, SupportedRange> = phf_map! {
    "item-player" => SupportedRange { major: 1, max_minor: 1 },
};

/// 支持的单元状态格式
static UNIT_STATE_DATA_TYPES: phf::Map<&'static str, SupportedRange> = phf_map! {
    "iqb-standard" => SupportedRange { major: 1, max_minor: 3 },
};

/// 本播放器当前输出的单元状态格式
pub const UNIT_STATE_DATA_TYPE: &str = "iqb-standard@1.3";

/// 本播放器当前理解的单元定义格式
pub const UNIT_DEFINITION_TYPE: &str = "item-player@1.1";

/// 解析后的版本标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTypeToken {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

impl DataTypeToken {
    /// 解析 `<name>@<major>.<minor>[.<patch>]`，补丁号被忽略
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, version) = raw.trim().split_once('@')?;
        if name.is_empty() {
            return None;
        }
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        if let Some(patch) = parts.next() {
            patch.parse::<u32>().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            major,
            minor,
        })
    }
}

impl fmt::Display for DataTypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}.{}", self.name, self.major, self.minor)
    }
}

/// 不兼容的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompatibility {
    /// 无法解析为 `<name>@<major>.<minor>`
    Unparsable,
    /// 格式名未知
    UnknownFormat { name: String },
    /// 主版本不同
    MajorMismatch { supported: u32, given: u32 },
    /// 次版本比已知的更新
    MinorTooNew { supported: u32, given: u32 },
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incompatibility::Unparsable => write!(f, "无法解析的版本标记"),
            Incompatibility::UnknownFormat { name } => write!(f, "未知格式 {}", name),
            Incompatibility::MajorMismatch { supported, given } => {
                write!(f, "主版本 {} 不受支持 (支持 {})", given, supported)
            }
            Incompatibility::MinorTooNew { supported, given } => {
                write!(f, "次版本 {} 过新 (最高 {})", given, supported)
            }
        }
    }
}

fn check_against(
    table: &phf::Map<&'static str, SupportedRange>,
    raw: &str,
) -> Result<DataTypeToken, Incompatibility> {
    let token = DataTypeToken::parse(raw).ok_or(Incompatibility::Unparsable)?;
    let range = table
        .get(token.name.as_str())
        .ok_or_else(|| Incompatibility::UnknownFormat {
            name: token.name.clone(),
        })?;
    if token.major != range.major {
        return Err(Incompatibility::MajorMismatch {
            supported: range.major,
            given: token.major,
        });
    }
    if token.minor > range.max_minor {
        return Err(Incompatibility::MinorTooNew {
            supported: range.max_minor,
            given: token.minor,
        });
    }
    Ok(token)
}

/// 检查 `unitDefinitionType`；缺省视为当前版本
pub fn check_unit_definition_type(raw: Option<&str>) -> Result<(), Incompatibility> {
    match raw {
        None => Ok(()),
        Some(raw) => check_against(&UNIT_DEFINITION_TYPES, raw).map(|_| ()),
    }
}

/// 检查 `unitStateDataType`；缺省视为当前版本
pub fn check_unit_state_data_type(raw: Option<&str>) -> Result<(), Incompatibility> {
    match raw {
        None => Ok(()),
        Some(raw) => check_against(&UNIT_STATE_DATA_TYPES, raw).map(|_| ()),
    }
}
