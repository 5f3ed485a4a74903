//! 答案编解码 - 业务能力层
//!
//! 在登记表中的控件与规范化的 [`Answer`] 列表之间转换。

use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::unit_dom::{ElementId, UnitDom};
use crate::models::answer::{Answer, AnswerStatus, AnswerValue};
use crate::services::control_registry::{
    Control, ControlGroup, ControlKind, ControlRegistry, ControlValue,
};

/// 一个分组内的取值位置
///
/// 同名 radio 合并为一个位置，其余每个控件各占一个
enum Slot<'a> {
    Single(&'a Control),
    Radios(Vec<&'a Control>),
}

impl Slot<'_> {
    fn text(&self) -> String {
        match self {
            Slot::Single(control) => control.answer_text(),
            Slot::Radios(radios) => radios
                .iter()
                .find(|c| c.is_filled())
                .map(|c| c.answer_text())
                .unwrap_or_default(),
        }
    }

    fn values(&self) -> Vec<String> {
        match self {
            Slot::Single(control) => control.answer_list(),
            Slot::Radios(_) => vec![self.text()],
        }
    }
}

fn slots<'a>(registry: &'a ControlRegistry, group: &ControlGroup) -> Vec<Slot<'a>> {
    let controls = registry.controls();
    let mut result: Vec<Slot<'a>> = Vec::new();
    let mut radio_slot: Option<usize> = None;
    for &index in &group.members {
        let control = &controls[index];
        if control.kind == ControlKind::Radio && !group.name.is_empty() {
            match radio_slot {
                Some(slot) => {
                    if let Slot::Radios(radios) = &mut result[slot] {
                        radios.push(control);
                    }
                }
                None => {
                    radio_slot = Some(result.len());
                    result.push(Slot::Radios(vec![control]));
                }
            }
        } else {
            result.push(Slot::Single(control));
        }
    }
    result
}

/// 把登记表序列化为答案列表
///
/// # 参数
/// - `registry`: 控件登记表
/// - `is_reached`: 判断元素是否进入过可视区域
///
/// # 返回
/// 每个分组一条答案，顺序与分组首次出现的文档顺序一致
pub fn serialize(registry: &ControlRegistry, is_reached: impl Fn(ElementId) -> bool) -> Vec<Answer> {
    let controls = registry.controls();
    registry
        .groups()
        .iter()
        .map(|group| {
            let slots = slots(registry, group);
            let value = match slots.as_slice() {
                [Slot::Single(control)] if control.kind == ControlKind::SelectMulti => {
                    AnswerValue::Multiple(control.answer_list())
                }
                [slot] => AnswerValue::Single(slot.text()),
                many => AnswerValue::Multiple(many.iter().flat_map(Slot::values).collect()),
            };

            let members = group.members.iter().map(|&i| &controls[i]);
            let changed = members.clone().any(Control::is_changed);
            let reached = members.clone().any(|c| is_reached(c.element));
            let status = if changed {
                AnswerStatus::ValueChanged
            } else if !reached {
                AnswerStatus::NotReached
            } else {
                AnswerStatus::Displayed
            };

            Answer {
                id: group.name.clone(),
                status,
                value,
            }
        })
        .collect()
}

/// 把答案写回新扫描的控件
///
/// 唯一位置是多选下拉框时接收整个列表。同一 id 有多个位置时按顺序消费列表：
/// 多选下拉框取紧随其后、按选项顺序递增且都属于它的那一段值（给后面的位置留够数量），
/// 其余位置各取一个。
/// 未知 id 会被跳过。写入不产生文档事件，写入后同步登记表，
/// 与初始值不同的控件以及状态为 `VALUE_CHANGED` 的分组视为已修改。
///
/// # 返回
/// 成功写入的答案条数
pub fn load(dom: &mut UnitDom, registry: &mut ControlRegistry, answers: &[Answer]) -> AppResult<usize> {
    let mut loaded = 0;
    let mut touched_groups = Vec::new();

    for answer in answers {
        let Some(group) = registry.group(&answer.id) else {
            warn!("⚠️ 答案 id '{}' 没有对应的控件，已跳过", answer.id);
            continue;
        };
        let slots = slots(registry, &group);
        let whole_list = matches!(
            slots.as_slice(),
            [Slot::Single(control)] if control.kind == ControlKind::SelectMulti
        );

        let values = answer.value.as_list();
        let mut cursor = 0;
        for (position, slot) in slots.iter().enumerate() {
            match slot {
                Slot::Single(control) if whole_list => {
                    dom.write_selected(control.element, &values)?;
                }
                Slot::Single(control) if control.kind == ControlKind::SelectMulti => {
                    let rest = values.get(cursor..).unwrap_or_default();
                    // 其余位置每个恰好占一个值
                    let reserved = slots[position + 1..]
                        .iter()
                        .filter(|s| !matches!(s, Slot::Single(c) if c.kind == ControlKind::SelectMulti))
                        .count();
                    let limit = rest.len().saturating_sub(reserved);
                    let run = option_run(dom, control, &rest[..limit])?;
                    dom.write_selected(control.element, &rest[..run])?;
                    cursor += run;
                }
                Slot::Single(control) => {
                    if let Some(value) = values.get(cursor) {
                        write_single(dom, control, value)?;
                    }
                    cursor += 1;
                }
                Slot::Radios(radios) => {
                    let value = values.get(cursor).map(String::as_str).unwrap_or_default();
                    for radio in radios {
                        let checked = !value.is_empty() && radio_value(radio) == value;
                        dom.write_checked(radio.element, checked)?;
                    }
                    cursor += 1;
                }
            }
        }
        if cursor < values.len() && !whole_list {
            debug!("答案 '{}' 有 {} 个多余的值", answer.id, values.len() - cursor);
        }

        if answer.status == AnswerStatus::ValueChanged {
            touched_groups.push(answer.id.clone());
        }
        loaded += 1;
    }

    registry.sync(dom);
    for name in &touched_groups {
        registry.mark_group_touched(name);
    }
    debug!("已加载 {} 条答案", loaded);
    Ok(loaded)
}

/// `values` 开头有多少个值可以属于这个多选下拉框
///
/// 序列化时选中项按选项顺序排列，所以这一段的选项下标严格递增。
fn option_run(dom: &UnitDom, control: &Control, values: &[String]) -> AppResult<usize> {
    let options = &dom.element(control.element)?.options;
    let mut last = None;
    let mut run = 0;
    for value in values {
        match options.iter().position(|o| &o.value == value) {
            Some(index) if last.map_or(true, |l| index > l) => {
                last = Some(index);
                run += 1;
            }
            _ => break,
        }
    }
    Ok(run)
}

fn radio_value(control: &Control) -> &str {
    match &control.current {
        ControlValue::Toggle { value, .. } => value,
        _ => "",
    }
}

fn write_single(dom: &mut UnitDom, control: &Control, value: &str) -> AppResult<()> {
    match control.kind {
        ControlKind::Checkbox | ControlKind::Radio => {
            let checked = !value.is_empty() && radio_value(control) == value;
            dom.write_checked(control.element, checked)
        }
        ControlKind::SelectMulti => dom.write_selected(control.element, &[value.to_string()]),
        _ => dom.write_value(control.element, value),
    }
}
