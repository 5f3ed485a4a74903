//! 基础设施层
//!
//! 持有稀缺资源（已渲染的单元文档、宿主消息通道），只暴露能力

pub mod markup;
pub mod transport;
pub mod unit_dom;

pub use markup::MarkupRenderer;
pub use transport::{ChannelTransport, HostEndpoint, LineTransport, Transport};
pub use unit_dom::{DomEvent, Element, ElementId, Target, UnitDom};
