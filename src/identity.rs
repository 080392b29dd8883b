//! Ephemeral identity lifecycle
//!
//! Creates throwaway directory accounts for a single test and removes them
//! afterwards. Group membership and cleanup are best effort: their failures are
//! returned as warnings rather than errors.

use crate::config::ServiceEndpoints;
use crate::directory::{DirectoryClient, LdapDirectory, UserEntry};
use crate::error::{ProbeError, Result, WithWarnings};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_USERNAME_LENGTH: usize = 64;
const GENERATED_PASSWORD_LENGTH: usize = 20;
const USERNAME_PREFIX: &str = "probe";

/// Passwords rejected both when generating and before any login attempt.
pub const WEAK_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "qwerty123",
    "changeme",
    "admin123",
    "letmein1",
    "welcome1",
    "iloveyou",
    "testtest",
];

#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralIdentity {
    pub username: String,
    pub password: String,
    pub groups: Vec<String>,
}

impl std::fmt::Debug for EphemeralIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralIdentity")
            .field("username", &self.username)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// `<prefix>-<unix millis>-<6 random lowercase alphanumerics>`
pub fn generate_username() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", USERNAME_PREFIX, chrono::Utc::now().timestamp_millis(), suffix)
}

/// Random password with at least one lowercase, uppercase, digit and symbol.
pub fn generate_password() -> String {
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"23456789";
    const SYMBOLS: &[u8] = b"!@#%^*-_=+";

    let mut rng = rand::thread_rng();
    loop {
        let mut chars: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS]
            .iter()
            .map(|set| set[rng.gen_range(0..set.len())])
            .collect();
        let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
        while chars.len() < GENERATED_PASSWORD_LENGTH {
            chars.push(all[rng.gen_range(0..all.len())]);
        }
        chars.shuffle(&mut rng);

        let password = String::from_utf8_lossy(&chars).into_owned();
        if !is_weak_password(&password) {
            return password;
        }
    }
}

pub fn is_weak_password(password: &str) -> bool {
    let lowered = password.to_lowercase();
    WEAK_PASSWORDS.iter().any(|weak| *weak == lowered)
}

/// Local shape check run before any network call, so a broken test setup
/// fails fast with a clear message.
pub fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(ProbeError::InvalidCredentials("username is blank".to_string()));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ProbeError::InvalidCredentials(format!(
            "username longer than {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if password.trim().is_empty() {
        return Err(ProbeError::InvalidCredentials("password is blank".to_string()));
    }
    if password.len() < MIN_PASSWORD_LENGTH || password.len() > MAX_PASSWORD_LENGTH {
        return Err(ProbeError::InvalidCredentials(format!(
            "password length must be between {} and {}",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        )));
    }
    if is_weak_password(password) {
        return Err(ProbeError::InvalidCredentials("password is a known weak password".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct IdentityHelper {
    directory: std::result::Result<Arc<dyn DirectoryClient>, String>,
    mail_domain: String,
}

impl IdentityHelper {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory: Ok(directory), mail_domain: "stack.local".to_string() }
    }

    /// A helper whose every operation fails with a configuration error.
    pub fn disabled(reason: &str) -> Self {
        Self { directory: Err(reason.to_string()), mail_domain: "stack.local".to_string() }
    }

    /// LDAP-backed when the admin password is configured, disabled otherwise.
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Self {
        match LdapDirectory::from_endpoints(endpoints) {
            Some(ldap) => {
                let mut helper = Self::new(Arc::new(ldap));
                helper.mail_domain = mail_domain_from_base_dn(&endpoints.credentials.ldap_base_dn);
                helper
            }
            None => {
                warn!("LDAP_ADMIN_PASSWORD not set; ephemeral identities are disabled");
                Self::disabled("LDAP_ADMIN_PASSWORD is not set; ephemeral identities are disabled")
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.directory.is_ok()
    }

    fn directory(&self) -> Result<&Arc<dyn DirectoryClient>> {
        self.directory.as_ref().map_err(|reason| ProbeError::Configuration(reason.clone()))
    }

    /// Create a uniquely named account and add it to `groups`. A group that
    /// cannot be joined produces a warning, not a failure.
    pub async fn create_identity(&self, groups: &[&str]) -> Result<WithWarnings<EphemeralIdentity>> {
        let directory = self.directory()?;
        let username = generate_username();
        let password = generate_password();

        directory.add_user(&UserEntry::new(&username, &password, &self.mail_domain)).await?;
        info!("Created ephemeral identity {}", username);

        let mut joined = Vec::with_capacity(groups.len());
        let mut warnings = Vec::new();
        for group in groups {
            match directory.add_to_group(&username, group).await {
                Ok(()) => joined.push(group.to_string()),
                Err(e) => {
                    warn!("Could not add {} to group {}: {}", username, group, e);
                    warnings.push(format!("group '{}' not joined: {}", group, e));
                }
            }
        }

        Ok(WithWarnings {
            value: EphemeralIdentity { username, password, groups: joined },
            warnings,
        })
    }

    /// Remove memberships, then the entry. A missing entry counts as deleted.
    pub async fn delete_identity(&self, username: &str) -> Result<WithWarnings<()>> {
        let directory = self.directory()?;
        let mut outcome = WithWarnings::new(());

        match directory.groups_of(username).await {
            Ok(groups) => {
                for group in groups {
                    if let Err(e) = directory.remove_from_group(username, &group).await {
                        warn!("Could not remove {} from group {}: {}", username, group, e);
                        outcome.warn(format!("membership in '{}' not removed: {}", group, e));
                    }
                }
            }
            Err(e) => {
                warn!("Could not list groups of {}: {}", username, e);
                outcome.warn(format!("group lookup failed: {}", e));
            }
        }

        if directory.delete_user(username).await? {
            info!("Deleted ephemeral identity {}", username);
        } else {
            debug!("Identity {} was already absent", username);
        }
        Ok(outcome)
    }

    pub async fn identity_exists(&self, username: &str) -> Result<bool> {
        self.directory()?.user_exists(username).await
    }
}

fn mail_domain_from_base_dn(base_dn: &str) -> String {
    let parts: Vec<&str> = base_dn
        .split(',')
        .filter_map(|rdn| {
            let (key, value) = rdn.trim().split_once('=')?;
            key.eq_ignore_ascii_case("dc").then_some(value)
        })
        .collect();
    if parts.is_empty() {
        "stack.local".to_string()
    } else {
        parts.join(".")
    }
}
