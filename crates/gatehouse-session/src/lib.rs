//! # gatehouse-session
//!
//! Session coordination for Gatehouse:
//!
//! - Active-session registry with one live session per user and connection
//! - Heartbeat sweeper evicting sessions whose driver went silent
//! - Share invites and write delegation with a single writer per session
//! - Ephemeral per-session chat
//!
//! Every client-visible effect is published through the realtime hub.
//! [`CoordinationEngine`] wires the pieces together.

pub mod access;
pub mod collaboration;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;

pub use access::{GrantTable, StaticTeamDirectory};
pub use collaboration::{
    AccessMode, ChatMessage, CollaborationManager, LeaveReason, Participant, ParticipantRole,
    ParticipantsSnapshot, ShareTarget,
};
pub use engine::CoordinationEngine;
pub use error::SessionError;
pub use registry::{
    ActiveSessionRecord, CloseReason, HeartbeatSweeper, SessionLaunch, SessionRegistry,
    SessionScope, SessionStatus, SessionSummary,
};
