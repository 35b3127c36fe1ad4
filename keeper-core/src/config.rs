//! Vault configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::backup::MergePolicy;
use crate::crypto::KdfParams;
use crate::events::DEFAULT_EVENT_CAPACITY;

/// Deployment environment. Selects defaults and gates developer-only operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Real user data.
    #[default]
    Production,
    /// Local development.
    Development,
    /// Automated tests.
    Test,
}

impl Environment {
    /// Returns `true` for environments where developer-only operations are allowed.
    #[must_use]
    pub const fn is_dev(self) -> bool {
        matches!(self, Self::Development | Self::Test)
    }
}

/// Tunables of a [`crate::Vault`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Environment the vault runs in.
    pub environment: Environment,
    /// Argon2 cost parameters.
    pub kdf: KdfParams,
    /// Conflict resolution when importing backups.
    pub merge_policy: MergePolicy,
    /// Whether operations are recorded in the history.
    pub history_enabled: bool,
    /// Events buffered per subscriber before slow subscribers lag.
    pub event_capacity: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Production)
    }
}

impl VaultConfig {
    /// Defaults for `environment`. Tests get fast, insecure key derivation.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        let kdf = match environment {
            Environment::Test => KdfParams::insecure_fast(),
            Environment::Production | Environment::Development => KdfParams::default(),
        };
        Self {
            environment,
            kdf,
            merge_policy: MergePolicy::default(),
            history_enabled: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Overrides the Argon2 parameters.
    #[must_use]
    pub const fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Overrides the backup merge policy.
    #[must_use]
    pub const fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    /// Enables or disables history tracking.
    #[must_use]
    pub const fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_str("test").expect("parse"), Environment::Test);
        assert_eq!(
            Environment::from_str("development").expect("parse"),
            Environment::Development
        );
        assert!(Environment::from_str("staging").is_err());
        assert_eq!(Environment::Production.to_string(), "production");
    }

    #[test]
    fn test_defaults_per_environment() {
        assert_eq!(VaultConfig::default().kdf, KdfParams::default());
        assert_eq!(
            VaultConfig::for_environment(Environment::Test).kdf,
            KdfParams::insecure_fast()
        );
        assert!(!Environment::Production.is_dev());
        assert!(Environment::Test.is_dev());
    }

    #[test]
    fn test_builders() {
        let config = VaultConfig::for_environment(Environment::Test)
            .with_merge_policy(MergePolicy::PreserveExisting)
            .with_history(false);
        assert_eq!(config.merge_policy, MergePolicy::PreserveExisting);
        assert!(!config.history_enabled);
    }
}
