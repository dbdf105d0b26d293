//! Traits defined in `gatehouse-core` for the core's external collaborators.

pub mod permission;
pub mod team;

pub use permission::{Permission, PermissionOracle};
pub use team::TeamDirectory;
