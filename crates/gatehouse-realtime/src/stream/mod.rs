//! Stream pub/sub: named streams multiplexed over one connection.

pub mod registry;
pub mod subscription;
pub mod types;

use async_trait::async_trait;

use gatehouse_core::types::UserId;

pub use registry::StreamRegistry;
pub use types::{StreamName, StreamPolicy};

/// Authorizes subscriptions to [`StreamPolicy::Delegated`] streams.
///
/// Registered once at startup by whichever component owns session-scoped
/// streams. Without a registered hook, delegated streams are refused.
#[async_trait]
pub trait StreamAccess: Send + Sync + 'static {
    /// Return whether `user_id` may subscribe to `stream`.
    async fn may_subscribe(&self, user_id: UserId, stream: &StreamName) -> bool;
}
