//! LDAP implementation of [`DirectoryClient`]
//!
//! Every operation opens a fresh connection, binds as the administrative
//! principal, performs its work and unbinds.

use super::{DirectoryClient, UserEntry};
use crate::config::ServiceEndpoints;
use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use ldap3::{dn_escape, ldap_escape, Ldap, LdapConnAsync, LdapResult, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use tracing::debug;

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_ALREADY_EXISTS: u32 = 68;
const RC_TYPE_OR_VALUE_EXISTS: u32 = 20;

#[derive(Clone)]
pub struct LdapDirectory {
    url: String,
    base_dn: String,
    admin_dn: String,
    admin_password: String,
    users_ou: String,
    groups_ou: String,
}

impl LdapDirectory {
    pub fn new(url: &str, base_dn: &str, admin_dn: &str, admin_password: &str) -> Self {
        Self {
            url: url.to_string(),
            base_dn: base_dn.to_string(),
            admin_dn: admin_dn.to_string(),
            admin_password: admin_password.to_string(),
            users_ou: "ou=users".to_string(),
            groups_ou: "ou=groups".to_string(),
        }
    }

    /// `None` when no admin password is configured.
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Option<Self> {
        let creds = &endpoints.credentials;
        creds.ldap_admin_password.as_ref().map(|password| {
            Self::new(&endpoints.ldap_url, &creds.ldap_base_dn, &creds.ldap_admin_dn, password)
        })
    }

    pub fn user_dn(&self, uid: &str) -> String {
        format!("uid={},{},{}", dn_escape(uid), self.users_ou, self.base_dn)
    }

    pub fn group_dn(&self, group: &str) -> String {
        format!("cn={},{},{}", dn_escape(group), self.groups_ou, self.base_dn)
    }

    fn groups_base(&self) -> String {
        format!("{},{}", self.groups_ou, self.base_dn)
    }

    async fn connect(&self) -> Result<Ldap> {
        let (conn, mut ldap) = LdapConnAsync::new(&self.url).await?;
        ldap3::drive!(conn);
        ldap.simple_bind(&self.admin_dn, &self.admin_password).await?.success()?;
        Ok(ldap)
    }

    async fn finish(mut ldap: Ldap) {
        if let Err(e) = ldap.unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("url", &self.url)
            .field("base_dn", &self.base_dn)
            .field("admin_dn", &self.admin_dn)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    async fn add_user(&self, entry: &UserEntry) -> Result<()> {
        let mut ldap = self.connect().await?;
        let dn = self.user_dn(&entry.uid);
        debug!("Adding LDAP entry {}", dn);

        let attrs = vec![
            ("objectClass", HashSet::from(["inetOrgPerson", "organizationalPerson", "person", "top"])),
            ("uid", HashSet::from([entry.uid.as_str()])),
            ("cn", HashSet::from([entry.display_name.as_str()])),
            ("sn", HashSet::from([entry.uid.as_str()])),
            ("displayName", HashSet::from([entry.display_name.as_str()])),
            ("mail", HashSet::from([entry.mail.as_str()])),
            ("userPassword", HashSet::from([entry.password.as_str()])),
        ];
        let result = ldap.add(&dn, attrs).await;
        Self::finish(ldap).await;

        let result = result?;
        match result.rc {
            RC_SUCCESS => Ok(()),
            RC_ALREADY_EXISTS => {
                Err(ProbeError::Directory(format!("entry {} already exists", dn)))
            }
            _ => Err(ProbeError::Directory(format!("add {} failed: {}", dn, describe(&result)))),
        }
    }

    async fn delete_user(&self, uid: &str) -> Result<bool> {
        let mut ldap = self.connect().await?;
        let dn = self.user_dn(uid);
        debug!("Deleting LDAP entry {}", dn);

        let result = ldap.delete(&dn).await;
        Self::finish(ldap).await;

        let result = result?;
        match result.rc {
            RC_SUCCESS => Ok(true),
            RC_NO_SUCH_OBJECT => Ok(false),
            _ => Err(ProbeError::Directory(format!("delete {} failed: {}", dn, describe(&result)))),
        }
    }

    async fn add_to_group(&self, uid: &str, group: &str) -> Result<()> {
        let mut ldap = self.connect().await?;
        let user_dn = self.user_dn(uid);
        let group_dn = self.group_dn(group);

        let result =
            ldap.modify(&group_dn, vec![Mod::Add("member", HashSet::from([user_dn.as_str()]))]).await;
        Self::finish(ldap).await;

        let result = result?;
        match result.rc {
            RC_SUCCESS | RC_TYPE_OR_VALUE_EXISTS => Ok(()),
            _ => Err(ProbeError::Directory(format!(
                "adding {} to {} failed: {}",
                uid,
                group_dn,
                describe(&result)
            ))),
        }
    }

    async fn remove_from_group(&self, uid: &str, group: &str) -> Result<()> {
        let mut ldap = self.connect().await?;
        let user_dn = self.user_dn(uid);
        let group_dn = self.group_dn(group);

        let result = ldap
            .modify(&group_dn, vec![Mod::Delete("member", HashSet::from([user_dn.as_str()]))])
            .await;
        Self::finish(ldap).await;

        let result = result?;
        match result.rc {
            RC_SUCCESS | RC_NO_SUCH_ATTRIBUTE | RC_NO_SUCH_OBJECT => Ok(()),
            _ => Err(ProbeError::Directory(format!(
                "removing {} from {} failed: {}",
                uid,
                group_dn,
                describe(&result)
            ))),
        }
    }

    async fn groups_of(&self, uid: &str) -> Result<Vec<String>> {
        let mut ldap = self.connect().await?;
        let filter = format!("(member={})", ldap_escape(self.user_dn(uid)));

        let search = ldap.search(&self.groups_base(), Scope::OneLevel, &filter, vec!["cn"]).await;
        Self::finish(ldap).await;

        let (entries, _) = search?.success()?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| entry.attrs.get("cn").and_then(|cn| cn.first().cloned()))
            .collect())
    }

    async fn user_exists(&self, uid: &str) -> Result<bool> {
        let mut ldap = self.connect().await?;
        let dn = self.user_dn(uid);

        let search = ldap.search(&dn, Scope::Base, "(objectClass=*)", vec!["uid"]).await;
        Self::finish(ldap).await;

        let search = search?;
        match search.1.rc {
            RC_SUCCESS => Ok(!search.0.is_empty()),
            RC_NO_SUCH_OBJECT => Ok(false),
            _ => Err(ProbeError::Directory(format!("lookup {} failed: {}", dn, describe(&search.1)))),
        }
    }
}

fn describe(result: &LdapResult) -> String {
    if result.text.is_empty() {
        format!("rc={}", result.rc)
    } else {
        format!("rc={} ({})", result.rc, result.text)
    }
}
