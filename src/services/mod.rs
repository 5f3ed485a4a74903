pub mod answer_codec;
pub mod control_registry;
pub mod debouncer;
pub mod extensions;
pub mod pager;
pub mod progress;
pub mod unit_log;

pub use control_registry::{Control, ControlKind, ControlRegistry};
pub use debouncer::Debouncer;
pub use extensions::{DataPartCollector, Extensions, FactorReport, PresentationFactor};
pub use pager::PageModel;
pub use progress::{ProgressFloor, ResponseValidation};
pub use unit_log::UnitLog;
