//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层是播放器的"指挥中心"：接收宿主命令和界面操作，调度下层能力，产出通知。
//!
//! ## 模块划分
//!
//! ### `player` - 协议分发器
//! - 会话闸门：只处理当前会话的命令
//! - 单元生命周期：版本校验、加载、替换
//! - 两级防抖：键盘事件与状态消息
//! - 差量状态上报与按需状态查询
//! - 界面状态快照（遮罩、翻页按钮、消息框）
//!
//! ### `runtime` - 运行循环
//! - 持有传输端口
//! - 在宿主消息、界面操作和定时器之间 `select!`
//! - 把发件箱写回宿主
//!
//! ## 层次关系
//!
//! ```text
//! runtime (事件源 + 传输)
//!     ↓
//! player (处理单条命令 / 单个操作)
//!     ↓
//! workflow::UnitCtx (一个已加载的单元)
//!     ↓
//! services (能力层：控件 / 页面 / 进度 / 扩展 / 日志 / 防抖)
//!     ↓
//! infrastructure (基础设施：UnitDom / Transport)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：runtime 管 I/O 和时间，player 管状态
//! 2. **资源隔离**：只有编排层持有传输端口
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **确定性**：player 的每个入口都显式接收当前时间

pub mod player;
pub mod runtime;

// 重新导出主要类型
pub use player::Player;
pub use runtime::{Runtime, UiHandle};
