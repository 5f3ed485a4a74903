pub mod session;
pub mod unit_ctx;

pub use session::{SessionGate, SessionState};
pub use unit_ctx::{ChangeSet, UnitCtx, UnitScript};
