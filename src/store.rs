//! User-store backend interface and a file-backed reference backend.
//!
//! DESIGN
//! ======
//! The router only sees [`UserStore`]; it is injected as `Arc<dyn UserStore>`
//! so tests and real deployments swap backends without a global accessor.
//! Calls may block on the backend; the connection awaits each one before
//! reading the next frame, which keeps responses in request order.
//!
//! [`StaticUserStore`] serves users from a JSON document. Passwords are
//! stored as SHA-256 hex digests, never in clear.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by user-store backends.
#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    /// The named user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The backend could not be loaded or initialized.
    #[error("user store load failed: {0}")]
    Load(String),

    /// The backend is reachable but failed to answer.
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for UserStoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "E_USER_NOT_FOUND",
            Self::Load(_) => "E_STORE_LOAD",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Capabilities the operation router needs from a user store.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Check a username/password pair. Unknown users authenticate as `false`.
    async fn authenticate(&self, username: &str, password: &str) -> Result<bool, UserStoreError>;

    /// Look up the named attributes of a user. Absent attributes are omitted.
    async fn user_attributes(
        &self,
        username: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, String>, UserStoreError>;

    /// Roles assigned to a user.
    async fn user_roles(&self, username: &str) -> Result<Vec<String>, UserStoreError>;

    /// All role names matching `pattern` (`*` wildcard), at most `limit` of them.
    async fn roles(&self, pattern: &str, limit: usize) -> Result<Vec<String>, UserStoreError>;
}

// =============================================================================
// STATIC STORE
// =============================================================================

#[derive(Debug, Deserialize)]
struct UsersDocument {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    roles: Vec<String>,
}

/// One user entry of the JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_sha256: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// In-memory user store loaded once from a JSON document.
#[derive(Debug, Clone)]
pub struct StaticUserStore {
    users: HashMap<String, UserRecord>,
    roles: BTreeSet<String>,
}

impl StaticUserStore {
    /// Build a store from user records and extra role names.
    ///
    /// # Errors
    ///
    /// Returns [`UserStoreError::Load`] if a username appears twice.
    pub fn new(records: Vec<UserRecord>, extra_roles: Vec<String>) -> Result<Self, UserStoreError> {
        let mut roles: BTreeSet<String> = extra_roles.into_iter().collect();
        let mut users = HashMap::with_capacity(records.len());
        for record in records {
            roles.extend(record.roles.iter().cloned());
            let username = record.username.clone();
            if users.insert(username.clone(), record).is_some() {
                return Err(UserStoreError::Load(format!("duplicate username: {username}")));
            }
        }
        Ok(Self { users, roles })
    }

    /// Parse a store from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`UserStoreError::Load`] for invalid JSON or duplicate users.
    pub fn from_json(text: &str) -> Result<Self, UserStoreError> {
        let doc: UsersDocument = serde_json::from_str(text).map_err(|e| UserStoreError::Load(e.to_string()))?;
        Self::new(doc.users, doc.roles)
    }

    /// Load a store from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`UserStoreError::Load`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, UserStoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| UserStoreError::Load(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn user(&self, username: &str) -> Result<&UserRecord, UserStoreError> {
        self.users
            .get(username)
            .ok_or_else(|| UserStoreError::UserNotFound(username.to_owned()))
    }
}

#[async_trait::async_trait]
impl UserStore for StaticUserStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<bool, UserStoreError> {
        let Some(record) = self.users.get(username) else {
            return Ok(false);
        };
        Ok(record.password_sha256.eq_ignore_ascii_case(&hash_password(password)))
    }

    async fn user_attributes(
        &self,
        username: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, String>, UserStoreError> {
        let record = self.user(username)?;
        Ok(names
            .iter()
            .filter_map(|name| record.attributes.get(name).map(|v| (name.clone(), v.clone())))
            .collect())
    }

    async fn user_roles(&self, username: &str) -> Result<Vec<String>, UserStoreError> {
        Ok(self.user(username)?.roles.clone())
    }

    async fn roles(&self, pattern: &str, limit: usize) -> Result<Vec<String>, UserStoreError> {
        Ok(self
            .roles
            .iter()
            .filter(|role| wildcard_match(pattern, role))
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// SHA-256 hex digest of a password, as stored in `password_sha256`.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let bytes = hasher.finalize();
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

/// Match `name` against a pattern where `*` stands for any run of characters.
#[must_use]
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return name.is_empty();
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No `*` at all: exact match.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
