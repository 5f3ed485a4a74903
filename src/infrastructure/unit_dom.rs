//! 单元文档 - 基础设施层
//!
//! 持有唯一的已渲染单元，只暴露"读元素 / 改元素 / 读几何"的能力

use std::collections::VecDeque;

use crate::error::{AppError, AppResult, DomError};

/// 元素在文档中的位置（即文档顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

/// 元素寻址方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// 第一个 `name` 相同的元素
    Name(String),
    /// 第 n 个 `name` 相同的元素（从 0 开始）
    NameAt(String, usize),
    /// HTML `id` 属性
    Id(String),
    /// 直接指定元素
    Node(ElementId),
}

impl Target {
    pub fn name(name: impl Into<String>) -> Self {
        Target::Name(name.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Target::Id(id.into())
    }
}

/// 元素标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Input,
    TextArea,
    Select,
    ContentEditable,
}

/// `<option>` 节点
#[derive(Debug, Clone, PartialEq)]
pub struct OptionNode {
    pub value: String,
    pub selected: bool,
}

/// 一个表单类元素
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    /// `input` 的 `type`（小写），其他标签为空
    pub input_type: String,
    pub name: Option<String>,
    pub html_id: Option<String>,
    /// 文本类元素的当前内容；checkbox/radio 的 `value` 属性
    pub value: String,
    pub checked: bool,
    pub required: bool,
    pub readonly: bool,
    pub multiple: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub options: Vec<OptionNode>,
    /// 所在页面（顶层 fieldset），页面之外为 `None`
    pub page: Option<usize>,
    /// 相对所在区域顶部的偏移
    pub offset: f64,
    pub height: f64,
}

impl Element {
    fn bare(tag: Tag, input_type: &str) -> Self {
        Self {
            tag,
            input_type: input_type.to_ascii_lowercase(),
            name: None,
            html_id: None,
            value: String::new(),
            checked: false,
            required: false,
            readonly: false,
            multiple: false,
            min: None,
            max: None,
            options: Vec::new(),
            page: None,
            offset: 0.0,
            height: 0.0,
        }
    }

    pub fn input(input_type: &str) -> Self {
        let mut element = Self::bare(Tag::Input, input_type);
        if element.is_checkable() {
            element.value = "on".to_string();
        }
        element
    }

    pub fn textarea() -> Self {
        Self::bare(Tag::TextArea, "")
    }

    pub fn select(multiple: bool) -> Self {
        Self {
            multiple,
            ..Self::bare(Tag::Select, "")
        }
    }

    pub fn content_editable() -> Self {
        Self::bare(Tag::ContentEditable, "")
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.html_id = Some(id.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_option(mut self, value: impl Into<String>, selected: bool) -> Self {
        self.options.push(OptionNode {
            value: value.into(),
            selected,
        });
        self
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn at(mut self, offset: f64, height: f64) -> Self {
        self.offset = offset;
        self.height = height;
        self
    }

    /// checkbox 或 radio
    pub fn is_checkable(&self) -> bool {
        self.tag == Tag::Input && matches!(self.input_type.as_str(), "checkbox" | "radio")
    }

    /// 可以输入文字的元素
    pub fn is_text_like(&self) -> bool {
        match self.tag {
            Tag::TextArea | Tag::ContentEditable => true,
            Tag::Input => !self.is_checkable(),
            Tag::Select => false,
        }
    }

    /// 用于错误信息的简短描述
    pub fn describe(&self) -> String {
        match (&self.name, &self.html_id) {
            (Some(name), _) => format!("[name={}]", name),
            (None, Some(id)) => format!("#{}", id),
            (None, None) => format!("<{:?}>", self.tag).to_lowercase(),
        }
    }

    fn range_midpoint(&self) -> String {
        let min = self.min.unwrap_or(0.0);
        let max = self.max.unwrap_or(100.0);
        let mid = if max < min { min } else { min + (max - min) / 2.0 };
        format_number(mid)
    }
}

/// 把数字格式化成表单里看到的样子（整数不带小数点）
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// 文档变更事件（变更通道）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEvent {
    /// 键盘输入，需要经过键盘防抖才算稳定
    Keyboard(ElementId),
    /// 原生 change（点击、选择）
    Change(ElementId),
    /// 程序化赋值或 contenteditable 的内容变化
    Mutation(ElementId),
    /// 滚动位置变化
    Scroll,
    /// 几何变化（视口或元素尺寸）
    Layout,
}

/// 已渲染的单元文档
///
/// 职责：
/// - 持有唯一的元素树（扁平化为文档顺序）和页面几何
/// - 每次可观察的修改都往变更通道追加一个 [`DomEvent`]
/// - 加载答案使用 `write_*` 系列方法，不产生事件
/// - 不认识答案、进度或协议
#[derive(Debug, Default)]
pub struct UnitDom {
    elements: Vec<Element>,
    page_heights: Vec<f64>,
    unit_height: f64,
    viewport_height: f64,
    scroll_top: f64,
    events: VecDeque<DomEvent>,
}

impl UnitDom {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== 构建 ==========

    /// 追加一个页面，返回页面序号
    pub fn add_page(&mut self, height: f64) -> usize {
        self.page_heights.push(height);
        self.page_heights.len() - 1
    }

    /// 追加一个元素；range 没有初始值时取 min/max 的中点
    pub fn add_element(&mut self, mut element: Element) -> ElementId {
        if element.tag == Tag::Input && element.input_type == "range" && element.value.is_empty() {
            element.value = element.range_midpoint();
        }
        if element.tag == Tag::Select && !element.multiple {
            // 单选下拉框：没有显式选中项时默认第一项，多个选中项只保留最后一个
            let last_selected = element.options.iter().rposition(|o| o.selected);
            for (i, option) in element.options.iter_mut().enumerate() {
                option.selected = match last_selected {
                    Some(selected) => i == selected,
                    None => i == 0,
                };
            }
        }
        self.elements.push(element);
        ElementId(self.elements.len() - 1)
    }

    // ========== 读取 ==========

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// 按文档顺序遍历元素
    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, element)| (ElementId(i), element))
    }

    pub fn element(&self, id: ElementId) -> AppResult<&Element> {
        self.elements
            .get(id.0)
            .ok_or_else(|| AppError::element_not_found(format!("#{}", id.0)))
    }

    fn element_mut(&mut self, id: ElementId) -> AppResult<&mut Element> {
        self.elements
            .get_mut(id.0)
            .ok_or_else(|| AppError::element_not_found(format!("#{}", id.0)))
    }

    /// 解析寻址方式
    pub fn resolve(&self, target: &Target) -> AppResult<ElementId> {
        let found = match target {
            Target::Node(id) => (id.0 < self.elements.len()).then_some(*id),
            Target::Name(name) => self.find_by_name(name, 0),
            Target::NameAt(name, index) => self.find_by_name(name, *index),
            Target::Id(html_id) => self
                .elements()
                .find(|(_, e)| e.html_id.as_deref() == Some(html_id.as_str()))
                .map(|(id, _)| id),
        };
        found.ok_or_else(|| AppError::element_not_found(format!("{:?}", target)))
    }

    fn find_by_name(&self, name: &str, index: usize) -> Option<ElementId> {
        self.elements()
            .filter(|(_, e)| e.name.as_deref() == Some(name))
            .nth(index)
            .map(|(id, _)| id)
    }

    pub fn page_count(&self) -> usize {
        self.page_heights.len()
    }

    pub fn page_height(&self, index: usize) -> f64 {
        self.page_heights.get(index).copied().unwrap_or(0.0)
    }

    pub fn unit_height(&self) -> f64 {
        self.unit_height
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    // ========== 几何（由宿主渲染器提供） ==========

    pub fn set_page_height(&mut self, index: usize, height: f64) -> AppResult<()> {
        let count = self.page_heights.len();
        let slot = self.page_heights.get_mut(index).ok_or(DomError::PageOutOfRange {
            index,
            max_index: count.saturating_sub(1),
        })?;
        *slot = height;
        self.events.push_back(DomEvent::Layout);
        Ok(())
    }

    pub fn set_unit_height(&mut self, height: f64) {
        self.unit_height = height;
        self.events.push_back(DomEvent::Layout);
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height.max(0.0);
        self.events.push_back(DomEvent::Layout);
    }

    pub fn set_element_geometry(&mut self, id: ElementId, offset: f64, height: f64) -> AppResult<()> {
        let element = self.element_mut(id)?;
        element.offset = offset;
        element.height = height;
        self.events.push_back(DomEvent::Layout);
        Ok(())
    }

    /// 用户或宿主滚动
    pub fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top.max(0.0);
        self.events.push_back(DomEvent::Scroll);
    }

    /// 播放器自身调整滚动位置（如翻页后回到顶部），不产生事件
    pub fn reset_scroll(&mut self, top: f64) {
        self.scroll_top = top.max(0.0);
    }

    // ========== 交互（产生事件） ==========

    /// 在文本类元素末尾输入文字
    pub fn type_text(&mut self, id: ElementId, text: &str) -> AppResult<()> {
        let element = self.text_like_mut(id)?;
        if element.readonly {
            return Ok(());
        }
        element.value.push_str(text);
        self.events.push_back(DomEvent::Keyboard(id));
        Ok(())
    }

    /// 清空文本类元素
    pub fn clear_text(&mut self, id: ElementId) -> AppResult<()> {
        let element = self.text_like_mut(id)?;
        if element.readonly {
            return Ok(());
        }
        element.value.clear();
        self.events.push_back(DomEvent::Keyboard(id));
        Ok(())
    }

    /// 程序化赋值：文本类元素替换内容，单选下拉框选中对应项
    pub fn set_value(&mut self, id: ElementId, value: &str) -> AppResult<()> {
        self.write_value(id, value)?;
        self.events.push_back(DomEvent::Mutation(id));
        Ok(())
    }

    /// 点击：checkbox 切换，radio 选中并取消同组其他项，其他元素无变化
    pub fn click(&mut self, id: ElementId) -> AppResult<()> {
        let element = self.element(id)?;
        if !element.is_checkable() {
            return Ok(());
        }
        if element.input_type == "radio" {
            self.check_radio(id)?;
        } else {
            let element = self.element_mut(id)?;
            element.checked = !element.checked;
        }
        self.events.push_back(DomEvent::Change(id));
        Ok(())
    }

    /// 选中或取消下拉框的某一项
    pub fn select_option(&mut self, id: ElementId, value: &str, selected: bool) -> AppResult<()> {
        let element = self.element_mut(id)?;
        if element.tag != Tag::Select {
            return Err(AppError::unsupported_operation(element.describe(), "select"));
        }
        let index = element
            .options
            .iter()
            .position(|o| o.value == value)
            .ok_or_else(|| AppError::element_not_found(format!("option[value={}]", value)))?;
        if element.multiple {
            element.options[index].selected = selected;
        } else if selected {
            for (i, option) in element.options.iter_mut().enumerate() {
                option.selected = i == index;
            }
        }
        self.events.push_back(DomEvent::Change(id));
        Ok(())
    }

    // ========== 加载（不产生事件） ==========

    /// 写入文本内容或单选下拉框的值
    pub fn write_value(&mut self, id: ElementId, value: &str) -> AppResult<()> {
        let element = self.element(id)?;
        if element.tag == Tag::Select {
            return self.write_selected(id, &[value.to_string()]);
        }
        if element.is_checkable() {
            return Err(AppError::unsupported_operation(element.describe(), "text"));
        }
        self.element_mut(id)?.value = value.to_string();
        Ok(())
    }

    pub fn write_checked(&mut self, id: ElementId, checked: bool) -> AppResult<()> {
        let element = self.element(id)?;
        if !element.is_checkable() {
            return Err(AppError::unsupported_operation(element.describe(), "checkbox/radio"));
        }
        if element.input_type == "radio" && checked {
            self.check_radio(id)
        } else {
            self.element_mut(id)?.checked = checked;
            Ok(())
        }
    }

    /// 按值设置下拉框的选中项，未知的值被忽略
    pub fn write_selected(&mut self, id: ElementId, values: &[String]) -> AppResult<()> {
        let element = self.element_mut(id)?;
        if element.tag != Tag::Select {
            return Err(AppError::unsupported_operation(element.describe(), "select"));
        }
        if element.multiple {
            for option in element.options.iter_mut() {
                option.selected = values.contains(&option.value);
            }
        } else if let Some(index) = values
            .first()
            .and_then(|v| element.options.iter().position(|o| &o.value == v))
        {
            for (i, option) in element.options.iter_mut().enumerate() {
                option.selected = i == index;
            }
        }
        Ok(())
    }

    // ========== 变更通道 ==========

    /// 取出所有待处理事件
    pub fn drain_events(&mut self) -> Vec<DomEvent> {
        self.events.drain(..).collect()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn text_like_mut(&mut self, id: ElementId) -> AppResult<&mut Element> {
        let element = self.element_mut(id)?;
        if !element.is_text_like() {
            return Err(AppError::unsupported_operation(element.describe(), "text"));
        }
        Ok(element)
    }

    fn check_radio(&mut self, id: ElementId) -> AppResult<()> {
        let group = self.element(id)?.name.clone();
        for (i, element) in self.elements.iter_mut().enumerate() {
            if i == id.0 {
                element.checked = true;
            } else if group.is_some() && element.input_type == "radio" && element.name == group {
                element.checked = false;
            }
        }
        Ok(())
    }
}
