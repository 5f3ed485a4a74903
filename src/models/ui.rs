//! 渲染协作方看到的界面状态，以及它转交给播放器的界面操作

use serde::Serialize;

use crate::infrastructure::unit_dom::{ElementId, Target};
use crate::models::player_config::{NavigationTarget, PagingMode};
use crate::models::unit_state::LogLevel;

/// 区域的头部或尾部锚点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionEdge {
    Head,
    Foot,
}

/// 提示所指向的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PointerTarget {
    /// 某个控件
    Control {
        element: usize,
        page: Option<usize>,
    },
    /// 页面（无分页时为整个单元）的开头或结尾
    Region {
        page: Option<usize>,
        edge: RegionEdge,
    },
    /// 扩展的呈现因子
    Factor { id: String },
}

impl PointerTarget {
    pub fn control(element: ElementId, page: Option<usize>) -> Self {
        PointerTarget::Control {
            element: element.0,
            page,
        }
    }

    /// 目标所在的页面
    pub fn page(&self) -> Option<usize> {
        match self {
            PointerTarget::Control { page, .. } | PointerTarget::Region { page, .. } => *page,
            PointerTarget::Factor { .. } => None,
        }
    }
}

/// 消息框中的一条提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointerMessage {
    pub text: String,
    pub target: PointerTarget,
}

/// 导航被拒绝后显示的消息框
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageBox {
    pub entries: Vec<PointerMessage>,
}

/// 翻页按钮
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNavButtons {
    pub visible: bool,
    pub previous_enabled: bool,
    pub next_enabled: bool,
}

/// 单元导航按钮（五个按钮都显示，只有启用的可以点击）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitNavButtons {
    pub enabled: Vec<NavigationTarget>,
}

impl UnitNavButtons {
    pub fn is_enabled(&self, target: NavigationTarget) -> bool {
        self.enabled.contains(&target)
    }
}

/// 单元信息栏
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitInfo {
    pub unit_id: Option<String>,
    pub unit_title: Option<String>,
    pub unit_number: Option<String>,
    pub direct_download_url: Option<String>,
}

/// 界面状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// 停止时覆盖在单元上的遮罩
    pub overlay: bool,
    pub has_focus: bool,
    pub paging_mode: PagingMode,
    pub current_page: Option<usize>,
    pub visible_pages: Vec<usize>,
    pub page_nav: PageNavButtons,
    pub unit_nav: UnitNavButtons,
    pub unit_info: UnitInfo,
    pub break_after_pages: bool,
    /// `printMode=on-with-ids` 时每个表单元素的名字提示
    pub name_hints: Vec<String>,
    pub message_box: Option<MessageBox>,
    pub pointer: Option<PointerTarget>,
}

impl UiState {
    pub fn is_page_visible(&self, index: usize) -> bool {
        self.visible_pages.contains(&index)
    }
}

/// 渲染协作方转交的界面操作
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    /// 在文本类元素里输入
    TypeText { target: Target, text: String },
    /// 清空文本类元素
    ClearText { target: Target },
    /// 单元脚本直接赋值
    SetValue { target: Target, value: String },
    /// 点击 checkbox / radio
    Click { target: Target },
    /// 选中或取消下拉框的一项
    SelectOption {
        target: Target,
        value: String,
        selected: bool,
    },
    /// 滚动到指定位置
    Scroll { top: f64 },
    /// 视口高度变化
    Resize { viewport_height: f64 },
    NextPage,
    PreviousPage,
    /// 点击单元导航按钮
    UnitNavigation(NavigationTarget),
    /// 宿主窗口获得或失去焦点
    WindowFocus(bool),
    /// 单元脚本写日志
    Log {
        level: LogLevel,
        key: String,
        content: Option<String>,
    },
    /// 扩展（收集器或呈现因子）的内部状态变化
    ExtensionChanged,
    /// 点击消息框中的第 n 条提示
    FollowMessage(usize),
    /// 关闭消息框
    CloseMessage,
}

impl UiAction {
    pub fn type_text(target: Target, text: impl Into<String>) -> Self {
        UiAction::TypeText {
            target,
            text: text.into(),
        }
    }

    pub fn set_value(target: Target, value: impl Into<String>) -> Self {
        UiAction::SetValue {
            target,
            value: value.into(),
        }
    }

    pub fn click(target: Target) -> Self {
        UiAction::Click { target }
    }

    pub fn log(level: LogLevel, key: impl Into<String>) -> Self {
        UiAction::Log {
            level,
            key: key.into(),
            content: None,
        }
    }

    /// 停止状态下仍然允许的操作
    pub fn allowed_while_stopped(&self) -> bool {
        matches!(self, UiAction::WindowFocus(_) | UiAction::Resize { .. })
    }
}
