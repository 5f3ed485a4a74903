//! 进度计算 - 业务能力层
//!
//! 两个互相独立的维度：
//! - `presentationProgress`：页面覆盖情况 AND 所有呈现因子
//! - `responseProgress`：作答单位的有效性
//!
//! 以及导航被拒绝时给学生看的提示条目。

use tracing::debug;

use crate::infrastructure::unit_dom::UnitDom;
use crate::models::messages::DenialReason;
use crate::models::ui::{MessageBox, PointerMessage, PointerTarget, RegionEdge};
use crate::models::unit_state::{PresentationProgress, ResponseProgress};
use crate::services::control_registry::ControlRegistry;
use crate::services::extensions::FactorReport;
use crate::services::pager::{CoverageGap, GapKind, PageModel};

/// 作答有效性的判定方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseValidation {
    /// 按有效单位计数：全部有效为 complete，部分为 some，没有为 none
    #[default]
    Lenient,
    /// 区分"必填都已填写"和"全部有效"
    Strict,
}

impl ResponseValidation {
    pub fn from_flag(strict: bool) -> Self {
        if strict {
            ResponseValidation::Strict
        } else {
            ResponseValidation::Lenient
        }
    }
}

/// 计算作答进度
pub fn response_progress(registry: &ControlRegistry, validation: ResponseValidation) -> ResponseProgress {
    let units = registry.validity();
    match validation {
        ResponseValidation::Lenient => {
            let valid = units.iter().filter(|u| u.valid).count();
            if valid == units.len() {
                ResponseProgress::Complete
            } else if valid > 0 {
                ResponseProgress::Some
            } else {
                ResponseProgress::None
            }
        }
        ResponseValidation::Strict => {
            if units.is_empty() {
                return ResponseProgress::CompleteAndValid;
            }
            let any_filled = units.iter().any(|u| u.filled);
            let required_filled = units.iter().filter(|u| u.required).all(|u| u.filled);
            if !any_filled && units.iter().any(|u| u.required) {
                ResponseProgress::None
            } else if !required_filled {
                ResponseProgress::Some
            } else if units.iter().all(|u| u.valid) {
                ResponseProgress::CompleteAndValid
            } else {
                ResponseProgress::Complete
            }
        }
    }
}

/// 计算呈现进度
///
/// # 参数
/// - `pager`: 页面模型；尚未观察过视口时为 none
/// - `factors`: 所有呈现因子的报告，任何一个未完成都会否决 complete
pub fn presentation_progress(pager: &PageModel, factors: &[(String, FactorReport)]) -> PresentationProgress {
    if !pager.is_observed() {
        return PresentationProgress::None;
    }
    let coverage = pager.coverage();
    if coverage.all_seen && factors.iter().all(|(_, r)| r.complete) {
        PresentationProgress::Complete
    } else if coverage.any_seen || factors.iter().any(|(_, r)| r.some || r.complete) {
        PresentationProgress::Some
    } else {
        PresentationProgress::None
    }
}

/// 恢复的进度下限
///
/// 在同一个单元实例存续期间，上报的进度不会低于 Start 时带来的进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressFloor {
    pub presentation: Option<PresentationProgress>,
    pub response: Option<ResponseProgress>,
}

impl ProgressFloor {
    pub fn presentation(&self, computed: PresentationProgress) -> PresentationProgress {
        self.presentation.map_or(computed, |floor| floor.max(computed))
    }

    pub fn response(&self, computed: ResponseProgress) -> ResponseProgress {
        self.response.map_or(computed, |floor| floor.max(computed))
    }
}

// ========== 导航拒绝提示 ==========

fn page_name(page: Option<usize>) -> String {
    match page {
        Some(index) => format!("Page-{}", index + 1),
        None => "The unit".to_string(),
    }
}

fn gap_message(gap: &CoverageGap) -> PointerMessage {
    let (text, edge) = match gap.kind {
        GapKind::NotViewed => (format!("{} has not been viewed yet.", page_name(gap.page)), RegionEdge::Head),
        GapKind::NotScrolledToEnd => (
            format!("{} has not been scrolled to the end.", page_name(gap.page)),
            RegionEdge::Foot,
        ),
    };
    PointerMessage {
        text,
        target: PointerTarget::Region { page: gap.page, edge },
    }
}

/// 生成导航被拒绝后的消息框
///
/// # 参数
/// - `reasons`: 宿主给出的原因；为空时两种原因都检查
///
/// # 返回
/// 每个未完成的控件、区域或呈现因子提示各一个条目。两种原因同时检查时，
/// 位于已有区域条目的页面上的控件会并入那个区域条目。
pub fn denial_messages(
    reasons: &[DenialReason],
    dom: &UnitDom,
    registry: &ControlRegistry,
    pager: &PageModel,
    factors: &[(String, FactorReport)],
) -> MessageBox {
    let wants = |reason: DenialReason| reasons.is_empty() || reasons.contains(&reason);
    let mut entries: Vec<PointerMessage> = Vec::new();

    if wants(DenialReason::PresentationIncomplete) {
        entries.extend(pager.gaps().iter().map(gap_message));
        for (id, report) in factors.iter().filter(|(_, r)| !r.complete) {
            entries.extend(report.messages.iter().map(|text| PointerMessage {
                text: text.clone(),
                target: PointerTarget::Factor { id: id.clone() },
            }));
        }
    }

    if wants(DenialReason::ResponsesIncomplete) {
        for unit in registry.validity().iter().filter(|u| !u.valid) {
            let Some(control) = registry.get(unit.element) else {
                continue;
            };
            let label = dom
                .element(control.element)
                .map(|e| e.describe())
                .unwrap_or_else(|_| control.name.clone());
            let text = if unit.required && !unit.filled {
                format!("{} is required.", label)
            } else {
                format!("{} contains an invalid value.", label)
            };

            let region = entries.iter_mut().find(|entry| {
                matches!(entry.target, PointerTarget::Region { .. }) && entry.target.page() == control.page
            });
            match region {
                Some(entry) => {
                    entry.text.push(' ');
                    entry.text.push_str(&text);
                }
                None => entries.push(PointerMessage {
                    text,
                    target: PointerTarget::control(control.element, control.page),
                }),
            }
        }
    }

    debug!("导航拒绝提示 {} 条", entries.len());
    MessageBox { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::markup::render;
    use crate::infrastructure::unit_dom::Target;
    use crate::models::player_config::PagingMode;

    fn progress_of(definition: &str, validation: ResponseValidation) -> ResponseProgress {
        let dom = render(definition).unwrap();
        response_progress(&ControlRegistry::scan(&dom), validation)
    }

    #[test]
    fn test_lenient_counts_valid_units() {
        let lenient = ResponseValidation::Lenient;
        assert_eq!(progress_of("<input required>", lenient), ResponseProgress::None);
        assert_eq!(progress_of("<input required value='x'>", lenient), ResponseProgress::Complete);
        // 空的非必填字段是有效的
        assert_eq!(
            progress_of(
                "<pre contenteditable required name='must-have'></pre><pre contenteditable name='nice-2-have'></pre><pre contenteditable></pre>",
                lenient
            ),
            ResponseProgress::Some
        );
        assert_eq!(progress_of("<p>no controls</p>", lenient), ResponseProgress::Complete);
    }

    #[test]
    fn test_lenient_number_fields() {
        let mut dom = render("<input type='number' name='first' required><input type='number' name='second' required>")
            .unwrap();
        let mut registry = ControlRegistry::scan(&dom);
        let first = dom.resolve(&Target::name("first")).unwrap();
        let second = dom.resolve(&Target::name("second")).unwrap();
        let lenient = ResponseValidation::Lenient;

        dom.type_text(first, "not a number").unwrap();
        registry.sync(&dom);
        assert_eq!(response_progress(&registry, lenient), ResponseProgress::None);

        dom.type_text(second, "1").unwrap();
        registry.sync(&dom);
        assert_eq!(response_progress(&registry, lenient), ResponseProgress::Some);

        dom.clear_text(first).unwrap();
        dom.type_text(first, "1").unwrap();
        registry.sync(&dom);
        assert_eq!(response_progress(&registry, lenient), ResponseProgress::Complete);
    }

    #[test]
    fn test_strict_distinguishes_valid() {
        let strict = ResponseValidation::Strict;
        assert_eq!(progress_of("<input required>", strict), ResponseProgress::None);
        assert_eq!(
            progress_of("<input required value='a'><input required>", strict),
            ResponseProgress::Some
        );
        assert_eq!(
            progress_of("<input required value='a'><input type='number' value='x'>", strict),
            ResponseProgress::Complete
        );
        assert_eq!(
            progress_of("<input required value='a'><input type='number' value='4'>", strict),
            ResponseProgress::CompleteAndValid
        );
    }

    #[test]
    fn test_floor_never_lowers() {
        let floor = ProgressFloor {
            presentation: None,
            response: Some(ResponseProgress::Complete),
        };
        assert_eq!(floor.response(ResponseProgress::None), ResponseProgress::Complete);
        assert_eq!(floor.response(ResponseProgress::CompleteAndValid), ResponseProgress::CompleteAndValid);
        assert_eq!(floor.presentation(PresentationProgress::Some), PresentationProgress::Some);

        let restored_none = ProgressFloor {
            presentation: Some(PresentationProgress::None),
            response: Some(ResponseProgress::None),
        };
        assert_eq!(restored_none.response(ResponseProgress::Some), ResponseProgress::Some);
    }

    #[test]
    fn test_factor_vetoes_complete_presentation() {
        let dom = render("<input name='a'>").unwrap();
        let mut pager = PageModel::new(&dom, PagingMode::Separate);
        assert_eq!(presentation_progress(&pager, &[]), PresentationProgress::None);
        pager.observe(&dom);
        assert_eq!(presentation_progress(&pager, &[]), PresentationProgress::Complete);

        let pending = vec![("special".to_string(), FactorReport::pending(vec!["look".into()]))];
        assert_eq!(presentation_progress(&pager, &pending), PresentationProgress::Some);
    }

    #[test]
    fn test_one_entry_per_missing_required_field() {
        let dom = render("<input name='a' required><input name='b'>").unwrap();
        let registry = ControlRegistry::scan(&dom);
        let mut pager = PageModel::new(&dom, PagingMode::Buttons);
        pager.observe(&dom);
        let message_box = denial_messages(&[DenialReason::ResponsesIncomplete], &dom, &registry, &pager, &[]);
        assert_eq!(message_box.entries.len(), 1);
        assert!(matches!(message_box.entries[0].target, PointerTarget::Control { element: 0, .. }));
    }

    #[test]
    fn test_control_entries_merge_into_page_entries() {
        let mut dom = render(
            "<fieldset data-height='2000'><input name='a' required></fieldset>\
             <fieldset><input name='b' required></fieldset>",
        )
        .unwrap();
        dom.set_viewport_height(500.0);
        let registry = ControlRegistry::scan(&dom);
        let mut pager = PageModel::new(&dom, PagingMode::Buttons);
        pager.observe(&dom);

        let both = denial_messages(&[], &dom, &registry, &pager, &[]);
        // 第一页未滚动到底（并入 a），第二页未看过（并入 b）
        assert_eq!(both.entries.len(), 2);
        assert!(both.entries[0].text.contains("is required"));

        let responses_only = denial_messages(&[DenialReason::ResponsesIncomplete], &dom, &registry, &pager, &[]);
        assert_eq!(responses_only.entries.len(), 2);
        assert_eq!(responses_only.entries[1].target.page(), Some(1));
    }
}
