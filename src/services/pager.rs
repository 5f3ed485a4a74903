//! 页面模型 - 业务能力层
//!
//! 维护当前页、有效页面列表和可视区域覆盖情况。
//!
//! 每个区域（页面；没有页面时是整个单元）有头部和尾部两个锚点，
//! 两个锚点都进入过视口，这个区域才算"看过"。覆盖情况只增不减。

use tracing::debug;

use crate::error::{AppResult, DomError};
use crate::infrastructure::unit_dom::{ElementId, UnitDom};
use crate::models::player_config::PagingMode;
use crate::models::ui::{PageNavButtons, PointerTarget, RegionEdge};
use crate::models::unit_state::{PageRef, PlayerState};

/// 尚未覆盖的区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    /// 从未进入视口
    NotViewed,
    /// 看过开头，没有滚动到结尾
    NotScrolledToEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageGap {
    /// 页面序号；没有页面时为 `None`
    pub page: Option<usize>,
    pub kind: GapKind,
}

/// 覆盖情况汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub any_seen: bool,
    pub all_seen: bool,
}

/// 页面模型
///
/// 职责：
/// - 四种分页模式下的当前页与翻页
/// - 根据滚动位置记录锚点与元素是否进入过视口
/// - 不认识控件的值或协议
#[derive(Debug)]
pub struct PageModel {
    mode: PagingMode,
    page_count: usize,
    current: usize,
    head_seen: Vec<bool>,
    foot_seen: Vec<bool>,
    reached: Vec<bool>,
    observed: bool,
    last_window: Option<(f64, f64)>,
}

impl PageModel {
    pub fn new(dom: &UnitDom, mode: PagingMode) -> Self {
        let regions = dom.page_count().max(1);
        Self {
            mode,
            page_count: dom.page_count(),
            current: 0,
            head_seen: vec![false; regions],
            foot_seen: vec![false; regions],
            reached: vec![false; dom.len()],
            observed: false,
            last_window: None,
        }
    }

    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    /// 切换分页模式，覆盖情况保留
    pub fn set_mode(&mut self, dom: &mut UnitDom, mode: PagingMode) {
        if mode == self.mode {
            return;
        }
        debug!("分页模式 {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.last_window = None;
        let top = self.context_top(dom, self.current_page());
        dom.reset_scroll(top);
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// 当前页；没有页面时为 `None`
    pub fn current_page(&self) -> Option<usize> {
        (self.page_count > 0).then_some(self.current)
    }

    pub fn page_id(index: usize) -> String {
        (index + 1).to_string()
    }

    /// 按页面 id 查找序号
    pub fn page_index(&self, id: &str) -> Option<usize> {
        id.trim()
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=self.page_count).contains(n))
            .map(|n| n - 1)
    }

    pub fn player_state(&self) -> PlayerState {
        PlayerState {
            valid_pages: (0..self.page_count)
                .map(|i| PageRef {
                    id: Self::page_id(i),
                    label: format!("Page-{}", i + 1),
                })
                .collect(),
            current_page: self.current_page().map(Self::page_id).unwrap_or_default(),
        }
    }

    fn paged(&self) -> bool {
        self.mode.is_paged() && self.page_count > 0
    }

    /// 区域在当前滚动上下文中的顶部位置；不在上下文中时返回 `None`
    fn region_top(&self, dom: &UnitDom, page: Option<usize>) -> Option<f64> {
        match page {
            None => Some(0.0),
            Some(p) if self.paged() => (p == self.current).then_some(0.0),
            Some(p) => Some((0..p).map(|i| dom.page_height(i)).sum()),
        }
    }

    fn region_height(&self, dom: &UnitDom, page: Option<usize>) -> f64 {
        match page {
            Some(p) => dom.page_height(p),
            None => dom.unit_height(),
        }
    }

    fn context_top(&self, dom: &UnitDom, page: Option<usize>) -> f64 {
        self.region_top(dom, page).unwrap_or(0.0)
    }

    fn region_pages(&self) -> Vec<Option<usize>> {
        if self.page_count == 0 {
            vec![None]
        } else {
            (0..self.page_count).map(Some).collect()
        }
    }

    /// 根据当前滚动位置更新覆盖情况和当前页
    ///
    /// # 返回
    /// 覆盖情况或当前页是否有变化
    pub fn observe(&mut self, dom: &UnitDom) -> bool {
        let top = dom.scroll_top();
        let bottom = top + dom.viewport_height();
        // 吸附滚动一次可能跳过多个锚点，把上次视口到本次视口之间的范围都算作经过
        let (from, to) = match (self.mode, self.last_window) {
            (PagingMode::ConcatScrollSnap, Some((last_top, last_bottom))) => {
                (last_top.min(top), last_bottom.max(bottom))
            }
            _ => (top, bottom),
        };
        self.last_window = Some((top, bottom));
        let within = |y: f64| from <= y && y <= to;

        let mut changed = !self.observed;
        self.observed = true;

        for (slot, page) in self.region_pages().into_iter().enumerate() {
            let Some(region_top) = self.region_top(dom, page) else {
                continue;
            };
            let region_bottom = region_top + self.region_height(dom, page);
            if !self.head_seen[slot] && within(region_top) {
                self.head_seen[slot] = true;
                changed = true;
            }
            if !self.foot_seen[slot] && within(region_bottom) {
                self.foot_seen[slot] = true;
                changed = true;
            }
        }

        for (id, element) in dom.elements() {
            if self.reached.get(id.0).copied().unwrap_or(true) {
                continue;
            }
            let hit = match element.page {
                None if self.page_count > 0 => true,
                page => match self.region_top(dom, page) {
                    Some(region_top) => {
                        let y = region_top + element.offset;
                        y <= to && from <= y + element.height
                    }
                    None => false,
                },
            };
            if hit {
                self.reached[id.0] = true;
                changed = true;
            }
        }

        if !self.paged() && self.page_count > 0 {
            let mut best: Option<(usize, f64)> = None;
            for page in 0..self.page_count {
                let page_top = self.context_top(dom, Some(page));
                let overlap = (page_top + dom.page_height(page)).min(bottom) - page_top.max(top);
                if best.map_or(true, |(_, best_overlap)| overlap > best_overlap) {
                    best = Some((page, overlap));
                }
            }
            if let Some((page, overlap)) = best {
                if overlap > 0.0 && page != self.current {
                    self.current = page;
                    changed = true;
                }
            }
        }

        changed
    }

    /// 跳转到指定页面
    ///
    /// 单页模式切换可见页并回到页首；滚动模式滚动到页面顶部。调用方随后应调用 [`observe`](Self::observe)。
    pub fn go_to(&mut self, dom: &mut UnitDom, index: usize) -> AppResult<()> {
        if index >= self.page_count {
            return Err(DomError::PageOutOfRange {
                index,
                max_index: self.page_count.saturating_sub(1),
            }
            .into());
        }
        self.current = index;
        self.last_window = None;
        let top = self.context_top(dom, Some(index));
        dom.reset_scroll(top);
        debug!("跳转到第 {} 页", index + 1);
        Ok(())
    }

    pub fn next(&mut self, dom: &mut UnitDom) -> AppResult<bool> {
        if self.current + 1 >= self.page_count {
            return Ok(false);
        }
        self.go_to(dom, self.current + 1)?;
        Ok(true)
    }

    pub fn previous(&mut self, dom: &mut UnitDom) -> AppResult<bool> {
        if self.current == 0 || self.page_count == 0 {
            return Ok(false);
        }
        self.go_to(dom, self.current - 1)?;
        Ok(true)
    }

    /// 让提示指向的位置进入视口
    pub fn reveal(&mut self, dom: &mut UnitDom, target: &PointerTarget) -> AppResult<()> {
        if let (Some(page), true) = (target.page(), self.paged()) {
            if page != self.current {
                self.go_to(dom, page)?;
            }
        }
        let top = match target {
            PointerTarget::Control { element, page } => {
                let offset = dom.element(ElementId(*element))?.offset;
                self.context_top(dom, *page) + offset
            }
            PointerTarget::Region { page, edge: RegionEdge::Head } => self.context_top(dom, *page),
            PointerTarget::Region { page, edge: RegionEdge::Foot } => {
                let bottom = self.context_top(dom, *page) + self.region_height(dom, *page);
                (bottom - dom.viewport_height()).max(0.0)
            }
            PointerTarget::Factor { .. } => return Ok(()),
        };
        dom.scroll_to(top);
        Ok(())
    }

    /// 是否已经观察过至少一次视口（首次渲染之后）
    pub fn is_observed(&self) -> bool {
        self.observed
    }

    pub fn is_reached(&self, element: ElementId) -> bool {
        self.reached.get(element.0).copied().unwrap_or(false)
    }

    pub fn coverage(&self) -> Coverage {
        let seen = self.head_seen.iter().chain(self.foot_seen.iter());
        Coverage {
            any_seen: seen.clone().any(|s| *s),
            all_seen: seen.into_iter().all(|s| *s),
        }
    }

    pub fn gaps(&self) -> Vec<CoverageGap> {
        self.region_pages()
            .into_iter()
            .enumerate()
            .filter_map(|(slot, page)| {
                let kind = match (self.head_seen[slot], self.foot_seen[slot]) {
                    (false, _) => GapKind::NotViewed,
                    (true, false) => GapKind::NotScrolledToEnd,
                    (true, true) => return None,
                };
                Some(CoverageGap { page, kind })
            })
            .collect()
    }

    pub fn visible_pages(&self) -> Vec<usize> {
        if self.paged() {
            vec![self.current]
        } else {
            (0..self.page_count).collect()
        }
    }

    pub fn page_nav(&self) -> PageNavButtons {
        let visible = self.mode == PagingMode::Buttons && self.page_count > 0;
        PageNavButtons {
            visible,
            previous_enabled: visible && self.current > 0,
            next_enabled: visible && self.current + 1 < self.page_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::markup::render;

    fn paged_unit(mode: PagingMode, heights: &[f64], viewport: f64) -> (UnitDom, PageModel) {
        let markup: String = heights
            .iter()
            .map(|h| format!("<fieldset data-height='{}'>page</fieldset>", h))
            .collect();
        let mut dom = render(&markup).unwrap();
        dom.set_viewport_height(viewport);
        dom.drain_events();
        let model = PageModel::new(&dom, mode);
        (dom, model)
    }

    #[test]
    fn test_buttons_mode_coverage() {
        let (mut dom, mut model) = paged_unit(PagingMode::Buttons, &[0.0, 0.0], 0.0);
        model.observe(&dom);
        assert_eq!(model.coverage(), Coverage { any_seen: true, all_seen: false });
        assert_eq!(model.visible_pages(), vec![0]);
        assert!(model.page_nav().next_enabled && !model.page_nav().previous_enabled);

        assert!(model.next(&mut dom).unwrap());
        model.observe(&dom);
        assert!(model.coverage().all_seen);
        assert_eq!(model.player_state().current_page, "2");
        assert!(!model.next(&mut dom).unwrap());
    }

    #[test]
    fn test_separate_mode_has_no_buttons() {
        let (_, model) = paged_unit(PagingMode::Separate, &[0.0, 0.0], 0.0);
        assert!(!model.page_nav().visible);
        assert_eq!(model.player_state().valid_pages[1].label, "Page-2");
    }

    #[test]
    fn test_long_page_needs_scrolling_to_end() {
        let (mut dom, mut model) = paged_unit(PagingMode::Buttons, &[3000.0, 100.0], 800.0);
        model.observe(&dom);
        assert_eq!(
            model.gaps(),
            vec![
                CoverageGap { page: Some(0), kind: GapKind::NotScrolledToEnd },
                CoverageGap { page: Some(1), kind: GapKind::NotViewed },
            ]
        );
        dom.scroll_to(2500.0);
        model.observe(&dom);
        assert_eq!(model.gaps().len(), 1);
    }

    #[test]
    fn test_scroll_mode_current_page_by_largest_overlap() {
        let (mut dom, mut model) =
            paged_unit(PagingMode::ConcatScroll, &[2000.0, 1000.0, 25.0, 2000.0], 1000.0);
        model.observe(&dom);
        assert_eq!(model.current_page(), Some(0));
        assert_eq!(model.visible_pages(), vec![0, 1, 2, 3]);
        assert!(!model.page_nav().visible);

        let mut visited = Vec::new();
        for top in [4000.0, 1200.0, 2500.0, 2900.0] {
            dom.scroll_to(top);
            model.observe(&dom);
            visited.push(model.player_state().current_page);
        }
        // 2500..3500: 第二页 500、第三页 25、第四页 475
        assert_eq!(visited, vec!["4", "1", "2", "4"]);
    }

    #[test]
    fn test_equal_overlap_prefers_lower_page() {
        let (mut dom, mut model) = paged_unit(PagingMode::ConcatScroll, &[1000.0, 1000.0], 1000.0);
        dom.scroll_to(500.0);
        model.observe(&dom);
        assert_eq!(model.current_page(), Some(0));
    }

    #[test]
    fn test_snap_mode_sweeps_skipped_anchors() {
        let heights = [1000.0, 1000.0, 1000.0];
        let (mut snap_dom, mut snap) = paged_unit(PagingMode::ConcatScrollSnap, &heights, 500.0);
        let (mut plain_dom, mut plain) = paged_unit(PagingMode::ConcatScroll, &heights, 500.0);
        for (dom, model) in [(&mut snap_dom, &mut snap), (&mut plain_dom, &mut plain)] {
            model.observe(dom);
            dom.scroll_to(2500.0);
            model.observe(dom);
        }
        assert!(snap.coverage().all_seen);
        assert!(!plain.coverage().all_seen);
    }

    #[test]
    fn test_unit_without_pages_tracks_scroll_extent() {
        let mut dom = render("<input name='a' data-offset='1900'>").unwrap();
        dom.set_unit_height(2000.0);
        dom.set_viewport_height(600.0);
        let mut model = PageModel::new(&dom, PagingMode::Separate);
        model.observe(&dom);
        let a = dom.resolve(&crate::infrastructure::unit_dom::Target::name("a")).unwrap();
        assert!(!model.is_reached(a));
        assert_eq!(model.player_state().current_page, "");

        dom.scroll_to(1400.0);
        model.observe(&dom);
        assert!(model.is_reached(a));
        assert!(model.coverage().all_seen);
    }

    #[test]
    fn test_go_to_out_of_range() {
        let (mut dom, mut model) = paged_unit(PagingMode::Separate, &[0.0, 0.0], 0.0);
        assert!(model.go_to(&mut dom, 2).is_err());
        assert_eq!(model.page_index("2"), Some(1));
        assert_eq!(model.page_index("3"), None);
    }
}
