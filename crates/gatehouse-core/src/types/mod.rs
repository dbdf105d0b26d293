//! Core type definitions used across the Gatehouse workspace.

pub mod id;
pub mod protocol;
pub mod role;

pub use id::*;
pub use protocol::Protocol;
pub use role::UserRole;
