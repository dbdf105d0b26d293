//! Multi-viewer collaboration: participants, single-writer delegation and
//! ephemeral chat.

pub mod chat;
pub mod manager;
pub mod participant;
pub mod state;

pub use chat::{ChatBuffer, ChatMessage};
pub use manager::CollaborationManager;
pub use participant::{
    AccessMode, LeaveReason, Participant, ParticipantRole, ParticipantsSnapshot, ShareTarget,
};
pub use state::{ShareState, SharedSession, WriteTransition};
