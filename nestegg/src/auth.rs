//! User credentials loaded from a TOML file.
//!
//! ## Users file format
//!
//! **Single user (flat):**
//! ```toml
//! username = "alice"
//! password = "secret"
//! ```
//!
//! **Multiple users (array):**
//! ```toml
//! [[users]]
//! username = "alice"
//! password = "pw1"
//!
//! [[users]]
//! username = "root"
//! password = "pw2"
//! admin = true
//! ```
//!
//! Both styles can be combined. Duplicate usernames are deduplicated (last
//! wins). Entries with an empty username or password are skipped. Only admins
//! may read the notes debug dump.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone)]
struct Credential {
    password: String,
    admin: bool,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    users: BTreeMap<String, Credential>,
}

impl AuthSettings {
    pub fn from_users(users: Vec<AuthUser>) -> Self {
        let mut mapped = BTreeMap::new();

        for user in users {
            let username = user.username.trim().to_string();
            let password = user.password.trim().to_string();
            if username.is_empty() || password.is_empty() {
                continue;
            }
            mapped.insert(
                username,
                Credential {
                    password,
                    admin: user.admin,
                },
            );
        }

        Self { users: mapped }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn is_authorized(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|known| {
            let a = password.as_bytes();
            let b = known.password.as_bytes();
            a.ct_eq(b).into()
        })
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.users.get(username).is_some_and(|known| known.admin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
    pub password: String,
    pub admin: bool,
}

impl AuthUser {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            admin: false,
        }
    }

    pub fn admin(username: &str, password: &str) -> Self {
        Self {
            admin: true,
            ..Self::new(username, password)
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthFileError {
    #[error("failed to read users file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid users file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("users file {path} does not define valid credentials")]
    EmptyCredentials { path: String },
}

#[derive(Debug, Default, Deserialize)]
struct UsersFile {
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    admin: bool,
    users: Option<Vec<UserEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct UserEntry {
    username: String,
    password: String,
    #[serde(default)]
    admin: bool,
}

/// Load credentials from the users file. Warns if the file is
/// world-readable (Unix only).
pub fn load_auth(path: &Path) -> Result<AuthSettings, AuthFileError> {
    check_users_file_permissions(path);
    let users = load_users_from_file(path)?;
    Ok(AuthSettings::from_users(users))
}

#[cfg(unix)]
fn check_users_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                "users file is world-readable; consider chmod 600"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_users_file_permissions(_path: &Path) {}

/// Parse the users file. At least one valid credential is required.
pub fn load_users_from_file(path: &Path) -> Result<Vec<AuthUser>, AuthFileError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AuthFileError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let parsed: UsersFile = toml::from_str(&raw).map_err(|source| AuthFileError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let mut users = Vec::new();

    if let (Some(username), Some(password)) = (parsed.username, parsed.password) {
        users.push(AuthUser {
            username,
            password,
            admin: parsed.admin,
        });
    }

    if let Some(more) = parsed.users {
        users.extend(more.into_iter().map(|entry| AuthUser {
            username: entry.username,
            password: entry.password,
            admin: entry.admin,
        }));
    }

    let settings = AuthSettings::from_users(users);
    if settings.user_count() == 0 {
        return Err(AuthFileError::EmptyCredentials {
            path: path.display().to_string(),
        });
    }

    Ok(settings
        .users
        .into_iter()
        .map(|(username, credential)| AuthUser {
            username,
            password: credential.password,
            admin: credential.admin,
        })
        .collect::<Vec<_>>())
}
