// crates/gait-core/src/config.rs
// ============================================================================
// Module: Core Configuration
// Description: Profile selection and strict TOML configuration loading.
// Purpose: Give every Gait binary one consistent, fail-closed way to load
//          its operating profile and core settings.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Gait runs under one of two profiles. `dev` tolerates ephemeral
//! signing keys and relaxed policy obligations so a developer can
//! iterate locally. `oss-prod` is fail-closed: it refuses to start
//! against a dev-mode signer, an unset signing key, or a policy
//! document missing a required obligation. Configuration is loaded
//! from an optional TOML file merged with environment overrides;
//! unknown keys in the file are rejected rather than silently ignored.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The operating profile a Gait process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Local development: ephemeral keys, relaxed obligations allowed.
    Dev,
    /// Fail-closed production profile for open-source deployments.
    OssProd,
}

impl Profile {
    /// Returns `true` for the fail-closed production profile.
    #[must_use]
    pub fn is_fail_closed(self) -> bool {
        matches!(self, Profile::OssProd)
    }
}

impl std::str::FromStr for Profile {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dev" => Ok(Profile::Dev),
            "oss-prod" => Ok(Profile::OssProd),
            other => Err(ConfigError::UnknownProfile(other.to_owned())),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Dev
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file contained invalid TOML, or an unknown key.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// The `profile` value was not a recognized profile name.
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    /// `oss-prod` requires a setting that was left at its dev default.
    #[error("oss-prod profile requires {0}")]
    FailClosed(&'static str),
}

/// Core settings shared by every Gait component: which profile to run
/// under, where the signing key lives, and where durable state is
/// rooted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Operating profile.
    #[serde(default)]
    pub profile: Profile,
    /// Path to an Ed25519 signing key seed file. Required under
    /// `oss-prod` unless `GAIT_SIGNING_KEY` is set in the environment.
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
    /// Root directory for durable state: session journals, job event
    /// logs, and trace output.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".gait")
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            signing_key_path: None,
            state_dir: default_state_dir(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration from `path`, rejecting unknown keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read or
    /// [`ConfigError::Parse`] if it contains invalid TOML or an
    /// unrecognized field.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates the configuration against its declared profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FailClosed`] when `oss-prod` is selected
    /// without a usable signing key source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.is_fail_closed()
            && self.signing_key_path.is_none()
            && std::env::var_os(crate::signer::ProdSigner::ENV_VAR).is_none()
        {
            return Err(ConfigError::FailClosed(
                "signing_key_path or GAIT_SIGNING_KEY must be set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_dev_profile() {
        let config = CoreConfig::default();
        assert_eq!(config.profile, Profile::Dev);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oss_prod_without_key_source_fails_closed() {
        let config = CoreConfig {
            profile: Profile::OssProd,
            signing_key_path: None,
            state_dir: default_state_dir(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::FailClosed(_))));
    }

    #[test]
    fn oss_prod_with_key_path_validates() {
        let config = CoreConfig {
            profile: Profile::OssProd,
            signing_key_path: Some(PathBuf::from("/tmp/key")),
            state_dir: default_state_dir(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let toml_text = "profile = \"dev\"\nbogus_field = true\n";
        let parsed: Result<CoreConfig, toml::de::Error> = toml::from_str(toml_text);
        assert!(parsed.is_err());
    }

    #[test]
    fn profile_from_str_rejects_unknown_names() {
        assert!("staging".parse::<Profile>().is_err());
        assert_eq!("oss-prod".parse::<Profile>().unwrap(), Profile::OssProd);
    }
}
