use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{AppResult, ProtocolError};

/// 答案状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerStatus {
    /// 已显示，但仍是初始值
    #[default]
    Displayed,
    /// 加载后被用户或脚本修改过
    ValueChanged,
    /// 从未进入可视区域
    NotReached,
}

/// 答案值：单值或有序多值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnswerValue {
    /// 按位置取值；单值视为只有一个元素
    pub fn nth(&self, index: usize) -> Option<&str> {
        match self {
            AnswerValue::Single(value) if index == 0 => Some(value),
            AnswerValue::Single(_) => None,
            AnswerValue::Multiple(values) => values.get(index).map(String::as_str),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            AnswerValue::Single(value) => vec![value.clone()],
            AnswerValue::Multiple(values) => values.clone(),
        }
    }
}

impl Default for AnswerValue {
    fn default() -> Self {
        AnswerValue::Single(String::new())
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Single(value.to_string())
    }
}

impl From<Vec<&str>> for AnswerValue {
    fn from(values: Vec<&str>) -> Self {
        AnswerValue::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

struct AnswerValueVisitor;

impl<'de> Visitor<'de> for AnswerValueVisitor {
    type Value = AnswerValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string, number, boolean or a list of those")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(AnswerValue::Single(value.to_string()))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(AnswerValue::Single(value.to_string()))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(AnswerValue::Single(value.to_string()))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(AnswerValue::Single(value.to_string()))
    }

    fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(AnswerValue::Single(value.to_string()))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(AnswerValue::Single(String::new()))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some(item) = seq.next_element::<JsonValue>()? {
            values.push(match item {
                JsonValue::String(s) => s,
                JsonValue::Null => String::new(),
                other => other.to_string(),
            });
        }
        Ok(AnswerValue::Multiple(values))
    }
}

impl<'de> Deserialize<'de> for AnswerValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AnswerValueVisitor)
    }
}

/// 一个逻辑控件标识对应的答案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// 控件名（空字符串表示未命名）
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: AnswerStatus,
    #[serde(default)]
    pub value: AnswerValue,
}

impl Answer {
    pub fn new(id: impl Into<String>, status: AnswerStatus, value: impl Into<AnswerValue>) -> Self {
        Self {
            id: id.into(),
            status,
            value: value.into(),
        }
    }
}

/// 解析 `dataParts.answers`
///
/// 支持两种形态：
/// - 当前格式：`[{id, status, value}, ...]`
/// - 旧格式：`{id: value, ...}`（兼容模式，状态按 `DISPLAYED` 处理）
///
/// 值本身既可以是 JSON 字符串，也可以是已经解析好的 JSON
pub fn parse_answers(raw: &JsonValue) -> AppResult<Vec<Answer>> {
    match raw {
        JsonValue::String(encoded) if encoded.trim().is_empty() => Ok(Vec::new()),
        JsonValue::String(encoded) => {
            let decoded: JsonValue = serde_json::from_str(encoded).map_err(|e| {
                ProtocolError::MalformedAnswers {
                    reason: e.to_string(),
                }
            })?;
            parse_answers(&decoded)
        }
        JsonValue::Array(_) => serde_json::from_value(raw.clone()).map_err(|e| {
            ProtocolError::MalformedAnswers {
                reason: e.to_string(),
            }
            .into()
        }),
        JsonValue::Object(map) => map
            .iter()
            .map(|(id, value)| -> AppResult<Answer> {
                let value = serde_json::from_value::<AnswerValue>(value.clone()).map_err(|e| {
                    ProtocolError::MalformedAnswers {
                        reason: e.to_string(),
                    }
                })?;
                Ok(Answer {
                    id: id.clone(),
                    status: AnswerStatus::Displayed,
                    value,
                })
            })
            .collect(),
        JsonValue::Null => Ok(Vec::new()),
        other => Err(ProtocolError::MalformedAnswers {
            reason: format!("unexpected answers payload: {}", other),
        }
        .into()),
    }
}

/// 把答案列表编码为 `dataParts.answers` 的字符串形式
pub fn encode_answers(answers: &[Answer]) -> String {
    // Answer 只包含字符串字段，序列化不会失败
    serde_json::to_string(answers).unwrap_or_else(|_| "[]".to_string())
}
