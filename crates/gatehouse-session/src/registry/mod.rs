//! Active-session registry and heartbeat sweeper.

pub mod record;
pub mod store;
pub mod sweeper;

pub use record::{
    ActiveSessionRecord, CloseReason, SessionLaunch, SessionScope, SessionStatus, SessionSummary,
};
pub use store::{SessionLifecycleHook, SessionRegistry};
pub use sweeper::HeartbeatSweeper;
