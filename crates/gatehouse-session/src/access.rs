//! In-memory implementations of the external access collaborators.
//!
//! Production deployments plug the platform's RBAC engine and directory
//! service in behind [`PermissionOracle`] and [`TeamDirectory`]; these
//! tables serve tests and single-node setups.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;

use gatehouse_core::traits::{Permission, PermissionOracle, TeamDirectory};
use gatehouse_core::types::{ConnectionId, TeamId, UserId};

/// Permission grants keyed by user and connection.
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: DashMap<(UserId, ConnectionId), HashSet<Permission>>,
    /// Held by every user on every connection.
    defaults: HashSet<Permission>,
}

impl GrantTable {
    /// An empty table: nobody holds anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table where every user holds `defaults` on every connection.
    pub fn with_defaults(defaults: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            grants: DashMap::new(),
            defaults: defaults.into_iter().collect(),
        }
    }

    /// Grants a permission.
    pub fn grant(&self, user_id: UserId, permission: Permission, resource_id: ConnectionId) {
        self.grants
            .entry((user_id, resource_id))
            .or_default()
            .insert(permission);
    }

    /// Revokes a permission. Defaults cannot be revoked per user.
    pub fn revoke(&self, user_id: UserId, permission: Permission, resource_id: ConnectionId) {
        if let Some(mut held) = self.grants.get_mut(&(user_id, resource_id)) {
            held.remove(&permission);
        }
    }
}

#[async_trait]
impl PermissionOracle for GrantTable {
    async fn authorized(
        &self,
        user_id: UserId,
        permission: Permission,
        resource_id: ConnectionId,
    ) -> bool {
        self.defaults.contains(&permission)
            || self
                .grants
                .get(&(user_id, resource_id))
                .is_some_and(|held| held.contains(&permission))
    }
}

/// Team membership held in memory.
#[derive(Debug, Default)]
pub struct StaticTeamDirectory {
    teams: DashMap<TeamId, Vec<UserId>>,
}

impl StaticTeamDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a team's members.
    pub fn set_members(&self, team_id: TeamId, members: Vec<UserId>) {
        self.teams.insert(team_id, members);
    }

    /// Adds one member.
    pub fn add_member(&self, team_id: TeamId, user_id: UserId) {
        let mut members = self.teams.entry(team_id).or_default();
        if !members.contains(&user_id) {
            members.push(user_id);
        }
    }
}

#[async_trait]
impl TeamDirectory for StaticTeamDirectory {
    async fn members(&self, team_id: TeamId) -> Vec<UserId> {
        self.teams
            .get(&team_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}
