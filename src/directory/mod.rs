//! Directory service access
//!
//! The identity helper talks to the directory through [`DirectoryClient`] so
//! the LDAP implementation can be swapped for the in-memory one in tests.

pub mod ldap;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;

pub use ldap::LdapDirectory;
pub use memory::InMemoryDirectory;

/// A user entry to create under the users organizational unit.
#[derive(Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub uid: String,
    pub password: String,
    pub display_name: String,
    pub mail: String,
}

impl UserEntry {
    pub fn new(uid: &str, password: &str, mail_domain: &str) -> Self {
        Self {
            uid: uid.to_string(),
            password: password.to_string(),
            display_name: format!("Probe {}", uid),
            mail: format!("{}@{}", uid, mail_domain),
        }
    }
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("uid", &self.uid)
            .field("display_name", &self.display_name)
            .field("mail", &self.mail)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn add_user(&self, entry: &UserEntry) -> Result<()>;

    /// Returns `false` when the entry did not exist.
    async fn delete_user(&self, uid: &str) -> Result<bool>;

    async fn add_to_group(&self, uid: &str, group: &str) -> Result<()>;

    async fn remove_from_group(&self, uid: &str, group: &str) -> Result<()>;

    /// Names of the groups listing `uid` as a member.
    async fn groups_of(&self, uid: &str) -> Result<Vec<String>>;

    async fn user_exists(&self, uid: &str) -> Result<bool>;
}
