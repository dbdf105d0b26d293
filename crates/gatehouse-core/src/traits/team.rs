//! Team membership lookup.

use async_trait::async_trait;

use crate::types::id::{TeamId, UserId};

/// Resolves team membership for team-wide share invites.
#[async_trait]
pub trait TeamDirectory: Send + Sync + 'static {
    /// Return the current members of a team. Unknown teams have no members.
    async fn members(&self, team_id: TeamId) -> Vec<UserId>;
}
