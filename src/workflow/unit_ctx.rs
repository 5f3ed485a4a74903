//! 单元实例 - 流程层
//!
//! 一次 Start 对应一个 [`UnitCtx`]：它独占文档、控件登记表、页面模型和扩展表。
//! 换单元时整个实例被丢弃，旧文档的事件不会再被观察到。

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::markup;
use crate::infrastructure::unit_dom::{DomEvent, UnitDom};
use crate::models::answer::{encode_answers, parse_answers};
use crate::models::messages::DenialReason;
use crate::models::player_config::{PagingMode, PlayerConfig};
use crate::models::ui::{MessageBox, PointerTarget, UiAction};
use crate::models::unit_state::{PlayerState, RestoredUnitState, UnitState};
use crate::models::version::UNIT_STATE_DATA_TYPE;
use crate::services::extensions::ANSWERS_PART;
use crate::services::progress::{self, ProgressFloor, ResponseValidation};
use crate::services::{answer_codec, ControlRegistry, Extensions, PageModel, UnitLog};

/// 单元脚本：每次加载单元后调用，用来登记扩展、读取恢复的数据
pub type UnitScript = Box<dyn Fn(&mut UnitCtx) -> AppResult<()> + Send>;

/// 一批文档事件的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// 有键盘输入，需要等键盘防抖
    pub keyboard: bool,
    /// 有立即生效的值变化（点击、选择、程序化赋值）
    pub values: bool,
    /// 滚动或几何变化
    pub layout: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !(self.keyboard || self.values || self.layout)
    }
}

/// 单元实例
pub struct UnitCtx {
    dom: UnitDom,
    registry: ControlRegistry,
    pager: PageModel,
    extensions: Extensions,
    log: UnitLog,
    floor: ProgressFloor,
    restored_parts: BTreeMap<String, String>,
    validation: ResponseValidation,
}

impl UnitCtx {
    /// 渲染单元、登记控件、恢复答案
    ///
    /// # 参数
    /// - `definition`: 单元定义（标记）
    /// - `restored`: Start 带来的历史状态
    /// - `config`: 当前的协议配置（分页模式、起始页）
    /// - `validation`: 作答有效性的判定方式
    pub fn load(
        definition: &str,
        restored: Option<&RestoredUnitState>,
        config: &PlayerConfig,
        validation: ResponseValidation,
    ) -> AppResult<Self> {
        let mut dom = markup::render(definition)?;
        let mut registry = ControlRegistry::scan(&dom);

        let mut restored_parts = BTreeMap::new();
        let mut floor = ProgressFloor::default();
        if let Some(restored) = restored {
            if let Some(raw) = restored.data_part(ANSWERS_PART) {
                match parse_answers(raw) {
                    Ok(answers) => {
                        let loaded = answer_codec::load(&mut dom, &mut registry, &answers)?;
                        info!("✓ 恢复了 {} 条答案", loaded);
                    }
                    Err(e) => warn!("⚠️ 历史答案无法解析，按空白单元处理: {}", e),
                }
            }
            for (key, value) in restored.data_parts.iter().flatten() {
                if key == ANSWERS_PART {
                    continue;
                }
                let encoded = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                restored_parts.insert(key.clone(), encoded);
            }
            floor = ProgressFloor {
                presentation: restored.presentation_progress,
                response: restored.response_progress,
            };
        }

        let mut pager = PageModel::new(&dom, config.paging_mode);
        if let Some(start_page) = config.start_page.as_deref() {
            match pager.page_index(start_page) {
                Some(index) => pager.go_to(&mut dom, index)?,
                None => warn!("⚠️ startPage {} 不存在，从第一页开始", start_page),
            }
        }
        dom.drain_events();
        pager.observe(&dom);

        debug!(
            "单元已加载: {} 个控件, {} 页, 模式 {:?}",
            registry.len(),
            pager.page_count(),
            config.paging_mode
        );

        Ok(Self {
            dom,
            registry,
            pager,
            extensions: Extensions::new(),
            log: UnitLog::new(),
            floor,
            restored_parts,
            validation,
        })
    }

    pub fn dom(&self) -> &UnitDom {
        &self.dom
    }

    /// 宿主渲染器直接修改文档（几何等）；修改产生的事件在下一次处理时生效
    pub fn dom_mut(&mut self) -> &mut UnitDom {
        &mut self.dom
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    pub fn pager(&self) -> &PageModel {
        &self.pager
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn log_mut(&mut self) -> &mut UnitLog {
        &mut self.log
    }

    /// Start 时带来的、非 `answers` 的 dataPart（JSON 字符串）
    pub fn restored_part(&self, key: &str) -> Option<&str> {
        self.restored_parts.get(key).map(String::as_str)
    }

    // ========== 交互 ==========

    /// 把一个触及文档的界面操作作用到文档上
    ///
    /// 其他操作原样忽略，由播放器处理
    pub fn interact(&mut self, action: &UiAction) -> AppResult<()> {
        match action {
            UiAction::TypeText { target, text } => {
                let id = self.dom.resolve(target)?;
                self.dom.type_text(id, text)
            }
            UiAction::ClearText { target } => {
                let id = self.dom.resolve(target)?;
                self.dom.clear_text(id)
            }
            UiAction::SetValue { target, value } => {
                let id = self.dom.resolve(target)?;
                self.dom.set_value(id, value)
            }
            UiAction::Click { target } => {
                let id = self.dom.resolve(target)?;
                self.dom.click(id)
            }
            UiAction::SelectOption {
                target,
                value,
                selected,
            } => {
                let id = self.dom.resolve(target)?;
                self.dom.select_option(id, value, *selected)
            }
            UiAction::Scroll { top } => {
                self.dom.scroll_to(*top);
                Ok(())
            }
            UiAction::Resize { viewport_height } => {
                self.dom.set_viewport_height(*viewport_height);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// 取出变更通道里的事件并汇总
    pub fn drain_changes(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for event in self.dom.drain_events() {
            match event {
                DomEvent::Keyboard(_) => changes.keyboard = true,
                DomEvent::Change(_) | DomEvent::Mutation(_) => changes.values = true,
                DomEvent::Scroll | DomEvent::Layout => changes.layout = true,
            }
        }
        changes
    }

    /// 从文档读取控件的当前值
    pub fn settle(&mut self) -> usize {
        self.registry.sync(&self.dom)
    }

    /// 根据视口更新覆盖情况
    pub fn observe(&mut self) -> bool {
        self.pager.observe(&self.dom)
    }

    // ========== 页面 ==========

    pub fn go_to_page(&mut self, index: usize) -> AppResult<()> {
        self.pager.go_to(&mut self.dom, index)?;
        self.pager.observe(&self.dom);
        Ok(())
    }

    pub fn next_page(&mut self) -> AppResult<bool> {
        let moved = self.pager.next(&mut self.dom)?;
        self.pager.observe(&self.dom);
        Ok(moved)
    }

    pub fn previous_page(&mut self) -> AppResult<bool> {
        let moved = self.pager.previous(&mut self.dom)?;
        self.pager.observe(&self.dom);
        Ok(moved)
    }

    pub fn set_paging_mode(&mut self, mode: PagingMode) {
        self.pager.set_mode(&mut self.dom, mode);
        self.pager.observe(&self.dom);
    }

    /// 跟随提示：让目标进入视口
    pub fn reveal(&mut self, target: &PointerTarget) -> AppResult<()> {
        self.pager.reveal(&mut self.dom, target)?;
        self.dom.drain_events();
        self.pager.observe(&self.dom);
        Ok(())
    }

    // ========== 状态 ==========

    /// 计算当前的单元状态（每次都重新调用收集器）
    pub fn unit_state(&mut self) -> UnitState {
        let pager = &self.pager;
        let answers = answer_codec::serialize(&self.registry, |element| pager.is_reached(element));

        let mut data_parts = self.restored_parts.clone();
        data_parts.extend(self.extensions.collect_parts());
        data_parts.insert(ANSWERS_PART.to_string(), encode_answers(&answers));

        let factors = self.extensions.factor_reports();
        let presentation = progress::presentation_progress(&self.pager, &factors);
        let response = progress::response_progress(&self.registry, self.validation);

        UnitState {
            data_parts,
            presentation_progress: self.floor.presentation(presentation),
            response_progress: self.floor.response(response),
            unit_state_data_type: UNIT_STATE_DATA_TYPE.to_string(),
        }
    }

    pub fn player_state(&self) -> PlayerState {
        self.pager.player_state()
    }

    /// 生成导航被拒绝的提示
    pub fn denial(&self, reasons: &[DenialReason]) -> MessageBox {
        let factors = self.extensions.factor_reports();
        progress::denial_messages(reasons, &self.dom, &self.registry, &self.pager, &factors)
    }
}
