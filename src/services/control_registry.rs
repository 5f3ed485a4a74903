//! 控件登记 - 业务能力层
//!
//! 扫描已渲染单元里的表单类元素，给它们分配身份，并维护当前值与初始值。

use phf::phf_map;
use tracing::debug;

use crate::infrastructure::unit_dom::{Element, ElementId, Tag, UnitDom};

/// 控件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Number,
    Checkbox,
    Radio,
    SelectSingle,
    SelectMulti,
    TextArea,
    ContentEditable,
}

/// 与文本框不同的 input 类型；表里没有的类型都按文本处理
static INPUT_KINDS: phf::Map<&'static str, ControlKind> = phf_map! {
    "number" => ControlKind::Number,
    "range" => ControlKind::Number,
    "checkbox" => ControlKind::Checkbox,
    "radio" => ControlKind::Radio,
};

impl ControlKind {
    pub fn of(element: &Element) -> Self {
        match element.tag {
            Tag::Input => INPUT_KINDS
                .get(element.input_type.as_str())
                .copied()
                .unwrap_or(ControlKind::Text),
            Tag::TextArea => ControlKind::TextArea,
            Tag::Select if element.multiple => ControlKind::SelectMulti,
            Tag::Select => ControlKind::SelectSingle,
            Tag::ContentEditable => ControlKind::ContentEditable,
        }
    }
}

/// 从元素读出的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlValue {
    /// 文本类控件的内容
    Text(String),
    /// checkbox / radio：是否选中，以及选中时的值
    Toggle { checked: bool, value: String },
    /// 下拉框选中项的值，按选项顺序
    Options(Vec<String>),
}

impl ControlValue {
    fn read(element: &Element) -> Self {
        match element.tag {
            Tag::Select => ControlValue::Options(
                element
                    .options
                    .iter()
                    .filter(|o| o.selected)
                    .map(|o| o.value.clone())
                    .collect(),
            ),
            _ if element.is_checkable() => ControlValue::Toggle {
                checked: element.checked,
                value: element.value.clone(),
            },
            _ => ControlValue::Text(element.value.clone()),
        }
    }
}

/// 一个已登记的控件
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub element: ElementId,
    /// 分组标识；没有 `name` 的控件归入 `''`
    pub name: String,
    pub kind: ControlKind,
    pub required: bool,
    pub readonly: bool,
    pub page: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub initial: ControlValue,
    pub current: ControlValue,
    /// 加载后是否被修改过（一旦为真不再复位）
    pub touched: bool,
}

impl Control {
    fn from_element(id: ElementId, element: &Element) -> Self {
        let value = ControlValue::read(element);
        Self {
            element: id,
            name: element.name.clone().unwrap_or_default(),
            kind: ControlKind::of(element),
            required: element.required,
            readonly: element.readonly,
            page: element.page,
            min: element.min,
            max: element.max,
            initial: value.clone(),
            current: value,
            touched: false,
        }
    }

    /// 当前值是否与初始值不同，或曾经被修改过
    pub fn is_changed(&self) -> bool {
        self.touched || self.current != self.initial
    }

    /// 单值形式的答案
    ///
    /// 数字框里无法解析的内容读作空字符串（与浏览器的 `value` 一致）
    pub fn answer_text(&self) -> String {
        match &self.current {
            ControlValue::Text(text) if self.kind == ControlKind::Number => {
                if self.parsed_number().is_some() {
                    text.trim().to_string()
                } else {
                    String::new()
                }
            }
            ControlValue::Text(text) => text.clone(),
            ControlValue::Toggle { checked: true, value } => value.clone(),
            ControlValue::Toggle { checked: false, .. } => String::new(),
            ControlValue::Options(values) => values.first().cloned().unwrap_or_default(),
        }
    }

    /// 多值形式的答案（多选下拉框）
    pub fn answer_list(&self) -> Vec<String> {
        match &self.current {
            ControlValue::Options(values) => values.clone(),
            _ => vec![self.answer_text()],
        }
    }

    /// 是否有非空的值
    pub fn is_filled(&self) -> bool {
        match &self.current {
            ControlValue::Text(text) => !text.is_empty(),
            ControlValue::Toggle { checked, .. } => *checked,
            ControlValue::Options(values) => values.iter().any(|v| !v.is_empty()),
        }
    }

    fn parsed_number(&self) -> Option<f64> {
        match &self.current {
            ControlValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// 是否违反原生约束（格式、范围）
    pub fn has_constraint_violation(&self) -> bool {
        if self.kind != ControlKind::Number {
            return false;
        }
        let ControlValue::Text(text) = &self.current else {
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }
        match self.parsed_number() {
            None => true,
            Some(n) => self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max),
        }
    }

    /// 单个控件的有效性；radio 要放在组里判断，见 [`ControlRegistry::validity`]
    pub fn is_valid(&self) -> bool {
        if self.readonly {
            return true;
        }
        if self.required && !self.is_filled() {
            return false;
        }
        !self.has_constraint_violation()
    }
}

/// 同名控件组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlGroup {
    pub name: String,
    /// 成员在登记表中的下标，文档顺序
    pub members: Vec<usize>,
}

/// 控件的有效性判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub element: ElementId,
    pub required: bool,
    pub filled: bool,
    pub valid: bool,
}

/// 控件登记表
///
/// 职责：
/// - `scan` 按文档顺序登记所有表单类元素，每次加载单元都完整重建
/// - `sync` 从文档重新读取当前值，记录"被修改过"
/// - 不认识答案格式、页面或协议
#[derive(Debug, Default)]
pub struct ControlRegistry {
    controls: Vec<Control>,
}

impl ControlRegistry {
    /// 扫描文档
    pub fn scan(dom: &UnitDom) -> Self {
        let controls: Vec<Control> = dom
            .elements()
            .map(|(id, element)| Control::from_element(id, element))
            .collect();
        debug!("登记 {} 个控件", controls.len());
        Self { controls }
    }

    /// 重新读取当前值
    ///
    /// # 返回
    /// 值发生变化的控件数量
    pub fn sync(&mut self, dom: &UnitDom) -> usize {
        let mut changed = 0;
        for control in self.controls.iter_mut() {
            let Ok(element) = dom.element(control.element) else {
                continue;
            };
            let value = ControlValue::read(element);
            if value != control.current {
                control.current = value;
                control.touched = true;
                changed += 1;
            }
        }
        changed
    }

    /// 标记某个分组为已修改（加载状态为 `VALUE_CHANGED` 的答案时）
    pub fn mark_group_touched(&mut self, name: &str) {
        for control in self.controls.iter_mut().filter(|c| c.name == name) {
            control.touched = true;
        }
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn get(&self, element: ElementId) -> Option<&Control> {
        self.controls.iter().find(|c| c.element == element)
    }

    /// 按首次出现顺序分组
    pub fn groups(&self) -> Vec<ControlGroup> {
        let mut groups: Vec<ControlGroup> = Vec::new();
        for (index, control) in self.controls.iter().enumerate() {
            match groups.iter_mut().find(|g| g.name == control.name) {
                Some(group) => group.members.push(index),
                None => groups.push(ControlGroup {
                    name: control.name.clone(),
                    members: vec![index],
                }),
            }
        }
        groups
    }

    pub fn group(&self, name: &str) -> Option<ControlGroup> {
        self.groups().into_iter().find(|g| g.name == name)
    }

    /// 每个作答单位的有效性
    ///
    /// 同名的 radio 合并为一个单位（位置取第一个 radio），组内任一选中即为已填写
    pub fn validity(&self) -> Vec<Validity> {
        let mut result = Vec::new();
        for group in self.groups() {
            let mut radio_seen = false;
            for &index in &group.members {
                let control = &self.controls[index];
                if control.kind == ControlKind::Radio && !control.name.is_empty() {
                    if radio_seen {
                        continue;
                    }
                    radio_seen = true;
                    let radios: Vec<&Control> = group
                        .members
                        .iter()
                        .map(|&i| &self.controls[i])
                        .filter(|c| c.kind == ControlKind::Radio)
                        .collect();
                    let filled = radios.iter().any(|c| c.is_filled());
                    let required = radios.iter().any(|c| c.required);
                    let readonly = radios.iter().all(|c| c.readonly);
                    result.push(Validity {
                        element: control.element,
                        required,
                        filled,
                        valid: readonly || !required || filled,
                    });
                } else {
                    result.push(Validity {
                        element: control.element,
                        required: control.required,
                        filled: control.is_filled(),
                        valid: control.is_valid(),
                    });
                }
            }
        }
        result
    }

    /// `printMode=on-with-ids` 的名字提示，每个元素一个
    pub fn name_hints(&self) -> Vec<String> {
        self.controls.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::markup::render;
    use crate::infrastructure::unit_dom::Target;

    #[test]
    fn test_scan_kinds_and_identity() {
        let dom = render(
            r#"<input name="t"><input type="number" name="n"><input type="range" name="r">
               <input type="checkbox" name="c"><input type="radio" name="g" value="a">
               <select name="s"><option>x</option></select>
               <select name="m" multiple><option>x</option></select>
               <textarea id="area"></textarea><div contenteditable name="free"></div>"#,
        )
        .unwrap();
        let registry = ControlRegistry::scan(&dom);
        let kinds: Vec<_> = registry.controls().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ControlKind::Text,
                ControlKind::Number,
                ControlKind::Number,
                ControlKind::Checkbox,
                ControlKind::Radio,
                ControlKind::SelectSingle,
                ControlKind::SelectMulti,
                ControlKind::TextArea,
                ControlKind::ContentEditable,
            ]
        );
        // 只有 id 没有 name 的元素也归入 ''
        assert_eq!(registry.controls()[7].name, "");
        assert_eq!(registry.controls()[8].name, "free");
    }

    #[test]
    fn test_sync_marks_touched_even_when_reverted() {
        let mut dom = render(r#"<input type="checkbox" name="c">"#).unwrap();
        let mut registry = ControlRegistry::scan(&dom);
        let id = dom.resolve(&Target::name("c")).unwrap();

        dom.click(id).unwrap();
        assert_eq!(registry.sync(&dom), 1);
        dom.click(id).unwrap();
        assert_eq!(registry.sync(&dom), 1);

        let control = registry.get(id).unwrap();
        assert_eq!(control.current, control.initial);
        assert!(control.is_changed());
        assert_eq!(registry.sync(&dom), 0);
    }

    #[test]
    fn test_number_validity() {
        let mut dom = render(r#"<input type="number" name="n" min="1" max="5">"#).unwrap();
        let id = dom.resolve(&Target::name("n")).unwrap();
        let mut registry = ControlRegistry::scan(&dom);
        assert!(registry.get(id).unwrap().is_valid());

        dom.type_text(id, "not a number").unwrap();
        registry.sync(&dom);
        let control = registry.get(id).unwrap();
        assert!(!control.is_valid());
        assert_eq!(control.answer_text(), "");

        dom.set_value(id, "7").unwrap();
        registry.sync(&dom);
        assert!(!registry.get(id).unwrap().is_valid());

        dom.set_value(id, "3").unwrap();
        registry.sync(&dom);
        assert!(registry.get(id).unwrap().is_valid());
    }

    #[test]
    fn test_required_radio_group_is_one_unit() {
        let mut dom = render(
            r#"<input type="radio" name="g" value="a" required>
               <input type="radio" name="g" value="b">
               <input name="g">"#,
        )
        .unwrap();
        let mut registry = ControlRegistry::scan(&dom);
        let validity = registry.validity();
        assert_eq!(validity.len(), 2);
        assert!(!validity[0].valid);
        assert!(validity[1].valid);

        let b = dom.resolve(&Target::NameAt("g".into(), 1)).unwrap();
        dom.click(b).unwrap();
        registry.sync(&dom);
        assert!(registry.validity()[0].valid);
    }

    #[test]
    fn test_readonly_is_always_valid() {
        let dom = render(r#"<input name="r" value="" required readonly>"#).unwrap();
        let registry = ControlRegistry::scan(&dom);
        assert!(registry.validity()[0].valid);
    }
}
