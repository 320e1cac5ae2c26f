//! Identity resolution for dispatched jobs.
//!
//! The organization and user attached to a job are resolved through the
//! [`Directory`] seam right before dispatch; jobs whose identities cannot
//! be resolved are skipped for the round.

use std::collections::HashMap;

use crate::config::IdentityConfig;

/// An organization known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// Stable organization id, sent with every dispatch.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A user known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Login name, sent with every dispatch.
    pub username: String,
    /// The organization the user belongs to.
    pub organization: String,
}

/// Resolves job identities to organizations and users.
pub trait Directory: Send + Sync {
    /// Looks an organization up by id.
    fn organization(&self, id: &str) -> Option<Organization>;

    /// Looks a user up by name.
    fn user(&self, username: &str) -> Option<User>;
}

/// In-memory [`Directory`] seeded from configuration.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    organizations: HashMap<String, Organization>,
    users: HashMap<String, User>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory containing the node's configured identity.
    pub fn from_identity(identity: &IdentityConfig) -> Self {
        let mut directory = Self::new();
        directory.add_organization(Organization {
            id: identity.organization.clone(),
            name: identity.organization.clone(),
        });
        directory.add_user(User {
            username: identity.user.clone(),
            organization: identity.organization.clone(),
        });
        directory
    }

    /// Registers an organization.
    pub fn add_organization(&mut self, organization: Organization) {
        self.organizations.insert(organization.id.clone(), organization);
    }

    /// Registers a user.
    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.username.clone(), user);
    }
}

impl Directory for StaticDirectory {
    fn organization(&self, id: &str) -> Option<Organization> {
        self.organizations.get(id).cloned()
    }

    fn user(&self, username: &str) -> Option<User> {
        self.users.get(username).cloned()
    }
}
