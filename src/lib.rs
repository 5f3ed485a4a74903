//! # Item Player
//!
//! 题目播放器的状态跟踪与进度引擎：渲染题目单元、追踪作答与浏览进度，
//! 通过 JSON 消息与宿主（测评系统）通信。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `UnitDom` - 已渲染的单元文档（元素、页面、视口、事件队列）
//! - `MarkupRenderer` - 把单元定义渲染成 `UnitDom`
//! - `Transport` - 宿主消息通道（进程内通道 / 标准输入输出）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力只关心一个方面
//! - `ControlRegistry` / `answer_codec` - 表单控件登记与答案读写
//! - `PageModel` - 四种分页模式与浏览覆盖
//! - `progress` - 作答进度、呈现进度、导航拒绝提示
//! - `Extensions` - 数据收集器与呈现因子
//! - `UnitLog` / `Debouncer` - 单元日志与防抖
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个单元"从加载到出状态的完整流程
//! - `SessionGate` - 会话闸门
//! - `UnitCtx` - 单元实例（文档 + 控件 + 页面 + 扩展）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/player` - 协议分发器，管理会话、防抖和差量上报
//! - `orchestrator/runtime` - 运行循环，连接传输端口与定时器
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ChannelTransport, HostEndpoint, LineTransport, Transport, UnitDom};
pub use models::{Command, Notification, PlayerConfig, UiAction, UiState, UnitState};
pub use orchestrator::{Player, Runtime, UiHandle};
pub use workflow::{SessionGate, UnitCtx};
