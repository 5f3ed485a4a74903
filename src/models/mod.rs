pub mod answer;
pub mod de;
pub mod messages;
pub mod player_config;
pub mod ui;
pub mod unit_state;
pub mod version;

pub use answer::{Answer, AnswerStatus, AnswerValue};
pub use messages::{Command, DenialReason, Notification, StartCommand, StateMessage};
pub use player_config::{
    LogPolicy, NavigationTarget, PagingMode, PlayerConfig, PlayerConfigPatch, PrintMode,
    StateReportPolicy,
};
pub use ui::{MessageBox, PointerMessage, PointerTarget, UiAction, UiState};
pub use unit_state::{
    LogEntry, LogLevel, PageRef, PlayerState, PresentationProgress, ResponseProgress, UnitState,
};
