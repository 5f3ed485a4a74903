//! 单元扩展 - 业务能力层
//!
//! 单元脚本可以注册两类扩展：
//! - 数据收集器：返回任意 JSON，以收集器 id 为键写入 `dataParts`
//! - 呈现因子：参与计算 `presentationProgress`，并在导航被拒绝时提供提示
//!
//! 每次调用都单独隔离：扩展返回错误或 panic 只影响它自己的结果。

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use crate::error::{AppError, AppResult, ExtensionError};

/// `answers` 键由播放器维护，收集器不能占用
pub const ANSWERS_PART: &str = "answers";

/// 数据收集器
pub trait DataPartCollector {
    fn collect(&self) -> AppResult<JsonValue>;
}

impl<F> DataPartCollector for F
where
    F: Fn() -> AppResult<JsonValue>,
{
    fn collect(&self) -> AppResult<JsonValue> {
        self()
    }
}

/// 呈现因子的一次报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactorReport {
    pub some: bool,
    pub complete: bool,
    /// 未完成时给学生看的提示，每条一个条目
    pub messages: Vec<String>,
}

impl FactorReport {
    pub fn complete() -> Self {
        Self {
            some: true,
            complete: true,
            messages: Vec::new(),
        }
    }

    /// 未完成，附带提示
    pub fn pending(messages: Vec<String>) -> Self {
        Self {
            some: false,
            complete: false,
            messages,
        }
    }
}

/// 呈现因子
pub trait PresentationFactor {
    fn report(&self) -> AppResult<FactorReport>;
}

impl<F> PresentationFactor for F
where
    F: Fn() -> AppResult<FactorReport>,
{
    fn report(&self) -> AppResult<FactorReport> {
        self()
    }
}

/// 隔离执行一次扩展调用
fn isolated<T>(id: &str, call: impl FnOnce() -> AppResult<T>) -> AppResult<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(_) => Err(ExtensionError::Panicked { id: id.to_string() }.into()),
    }
}

/// 扩展表
///
/// 职责：
/// - 按 id 登记收集器和呈现因子（同 id 重复登记时替换）
/// - 每次读取状态时重新调用收集器
/// - 收集器失败时沿用它上一次成功的结果
#[derive(Default)]
pub struct Extensions {
    collectors: Vec<(String, Box<dyn DataPartCollector + Send>)>,
    factors: Vec<(String, Box<dyn PresentationFactor + Send>)>,
    last_good: BTreeMap<String, String>,
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("collectors", &self.collectors.iter().map(|(id, _)| id).collect::<Vec<_>>())
            .field("factors", &self.factors.iter().map(|(id, _)| id).collect::<Vec<_>>())
            .finish()
    }
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_collector(
        &mut self,
        id: impl Into<String>,
        collector: impl DataPartCollector + Send + 'static,
    ) -> AppResult<()> {
        let id = id.into();
        if id == ANSWERS_PART {
            return Err(AppError::extension_failed(id, "dataPart 'answers' 由播放器维护"));
        }
        self.collectors.retain(|(existing, _)| *existing != id);
        self.collectors.push((id, Box::new(collector)));
        Ok(())
    }

    pub fn register_factor(&mut self, id: impl Into<String>, factor: impl PresentationFactor + Send + 'static) {
        let id = id.into();
        self.factors.retain(|(existing, _)| *existing != id);
        self.factors.push((id, Box::new(factor)));
    }

    /// 调用所有收集器
    ///
    /// # 返回
    /// 收集器 id -> 结果的 JSON 字符串
    pub fn collect_parts(&mut self) -> BTreeMap<String, String> {
        for (id, collector) in &self.collectors {
            let encoded = isolated(id, || collector.collect())
                .and_then(|value| serde_json::to_string(&value).map_err(AppError::from));
            match encoded {
                Ok(encoded) => {
                    self.last_good.insert(id.clone(), encoded);
                }
                Err(e) => warn!("⚠️ 收集器 {} 失败，沿用上次结果: {}", id, e),
            }
        }
        self.last_good.clone()
    }

    /// 询问所有呈现因子
    ///
    /// 失败的因子按"未开始、未完成、没有提示"处理
    pub fn factor_reports(&self) -> Vec<(String, FactorReport)> {
        self.factors
            .iter()
            .map(|(id, factor)| {
                let report = isolated(id, || factor.report()).unwrap_or_else(|e| {
                    warn!("⚠️ 呈现因子 {} 失败: {}", id, e);
                    FactorReport::default()
                });
                (id.clone(), report)
            })
            .collect()
    }
}
