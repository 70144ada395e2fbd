use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the registry used when a context does not select one.
pub const DEFAULT_REGISTRY: &str = "default";

/// How rollback treats a compensation that fails or panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    /// Each compensation runs behind its own failure boundary. Failures are
    /// recorded and the remaining compensations still run.
    #[default]
    Guarded,
    /// The first compensation panic is recorded, the remaining compensations
    /// are skipped, and the panic escapes `abort_with_error` and `dispatch`.
    /// Returned errors are recorded as under `Guarded`.
    Unguarded,
}

/// Engine settings, usually read from a `hookchain.toml` file:
///
/// ```toml
/// default-registry = "orders"
/// rollback-policy = "guarded"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    default_registry: String,
    rollback_policy: RollbackPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_registry: String::from(DEFAULT_REGISTRY),
            rollback_policy: RollbackPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown fields and
    /// `ConfigError::EmptyRegistryName` for a blank default registry.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        if config.default_registry.trim().is_empty() {
            return Err(ConfigError::EmptyRegistryName);
        }
        Ok(config)
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise the
    /// errors of [`EngineConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn default_registry(&self) -> &str {
        &self.default_registry
    }

    #[must_use]
    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.rollback_policy
    }

    #[must_use]
    pub fn with_default_registry(mut self, name: impl Into<String>) -> Self {
        self.default_registry = name.into();
        self
    }

    #[must_use]
    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_use_default_registry_and_guarded_rollback() {
        let config = EngineConfig::default();
        assert_eq!(config.default_registry(), "default");
        assert_eq!(config.rollback_policy(), RollbackPolicy::Guarded);
    }

    #[test]
    fn empty_toml_yields_defaults() -> anyhow::Result<()> {
        let config = EngineConfig::from_toml_str("")?;
        assert_eq!(config, EngineConfig::default());
        Ok(())
    }

    #[test]
    fn parses_all_fields() -> anyhow::Result<()> {
        let config = EngineConfig::from_toml_str(
            "default-registry = \"orders\"\nrollback-policy = \"unguarded\"\n",
        )?;
        assert_eq!(config.default_registry(), "orders");
        assert_eq!(config.rollback_policy(), RollbackPolicy::Unguarded);
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = EngineConfig::from_toml_str("retries = 3\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_blank_registry_name() {
        let result = EngineConfig::from_toml_str("default-registry = \"  \"\n");
        assert!(matches!(result, Err(ConfigError::EmptyRegistryName)));
    }

    #[test]
    fn load_reads_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "default-registry = \"payments\"")?;

        let config = EngineConfig::load(file.path())?;
        assert_eq!(config.default_registry(), "payments");
        Ok(())
    }

    #[test]
    fn load_reports_missing_file() {
        let result = EngineConfig::load(Path::new("/nonexistent/hookchain.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
