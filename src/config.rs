use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::UserRole;

/// Application-level constants
pub const APP_NAME: &str = "Carelink";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "carelink.db";

/// Get the application data directory (~/Carelink/), falling back to the
/// working directory when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the path of the network database
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "carelink_lib=info,warn"
}

/// How the duplicate check treats identifiers that resolve to different patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMatchPolicy {
    /// Take the highest-priority hit and ignore the rest.
    FirstMatchWins,
    /// Refuse with a conflict when supplied identifiers disagree.
    FailClosed,
}

/// Tunables for the identity and synchronization core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Roles allowed to mint a new global identity.
    pub privileged_roles: Vec<UserRole>,
    /// Number of most recent vitals readings merged per visit.
    pub vitals_sync_limit: u32,
    /// Failed merge attempts after which a visit is parked until reset.
    pub max_sync_attempts: u32,
    pub identity_match_policy: IdentityMatchPolicy,
    /// Shortest normalized phone fragment accepted for substring matching.
    pub min_phone_substring_digits: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            privileged_roles: vec![UserRole::Manager, UserRole::SuperAdmin],
            vitals_sync_limit: 10,
            max_sync_attempts: 5,
            identity_match_policy: IdentityMatchPolicy::FailClosed,
            min_phone_substring_digits: 7,
        }
    }
}

impl EngineConfig {
    pub fn can_mint_identity(&self, role: Option<UserRole>) -> bool {
        role.is_some_and(|r| self.privileged_roles.contains(&r))
    }
}
