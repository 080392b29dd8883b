//! In-memory [`DirectoryClient`] for offline runs and tests

use super::{DirectoryClient, UserEntry};
use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

/// Groups must exist before members can be added, as in a real directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<BTreeMap<String, UserEntry>>,
    groups: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: &[&str]) -> Self {
        let map = groups.iter().map(|g| (g.to_string(), BTreeSet::new())).collect();
        Self { users: RwLock::new(BTreeMap::new()), groups: RwLock::new(map) }
    }

    /// Stored entry for `uid`, including its password.
    pub async fn entry(&self, uid: &str) -> Option<UserEntry> {
        self.users.read().await.get(uid).cloned()
    }

    pub async fn members(&self, group: &str) -> Vec<String> {
        self.groups
            .read()
            .await
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn add_user(&self, entry: &UserEntry) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&entry.uid) {
            return Err(ProbeError::Directory(format!("entry {} already exists", entry.uid)));
        }
        users.insert(entry.uid.clone(), entry.clone());
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> Result<bool> {
        Ok(self.users.write().await.remove(uid).is_some())
    }

    async fn add_to_group(&self, uid: &str, group: &str) -> Result<()> {
        let mut groups = self.groups.write().await;
        let members = groups
            .get_mut(group)
            .ok_or_else(|| ProbeError::Directory(format!("group {} does not exist", group)))?;
        members.insert(uid.to_string());
        Ok(())
    }

    async fn remove_from_group(&self, uid: &str, group: &str) -> Result<()> {
        if let Some(members) = self.groups.write().await.get_mut(group) {
            members.remove(uid);
        }
        Ok(())
    }

    async fn groups_of(&self, uid: &str) -> Result<Vec<String>> {
        Ok(self
            .groups
            .read()
            .await
            .iter()
            .filter(|(_, members)| members.contains(uid))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn user_exists(&self, uid: &str) -> Result<bool> {
        Ok(self.users.read().await.contains_key(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_membership_requires_existing_group() {
        let dir = InMemoryDirectory::with_groups(&["users"]);
        dir.add_user(&UserEntry::new("alice", "pw", "stack.local")).await.unwrap();

        dir.add_to_group("alice", "users").await.unwrap();
        assert!(dir.add_to_group("alice", "admins").await.is_err());
        assert_eq!(dir.groups_of("alice").await.unwrap(), vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_reports_missing_entries() {
        let dir = InMemoryDirectory::new();
        dir.add_user(&UserEntry::new("bob", "pw", "stack.local")).await.unwrap();

        assert!(dir.delete_user("bob").await.unwrap());
        assert!(!dir.delete_user("bob").await.unwrap());
        assert!(!dir.user_exists("bob").await.unwrap());
    }
}
