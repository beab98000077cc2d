//! Addressable configuration keys (`section.key`).

use std::str::FromStr;

use super::{ConfigError, ConfigFile};

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    CoordinatorUrl,
    CoordinatorTimeoutSecs,
    AbrReservoirMs,
    AbrCushionMs,
    AbrBitrates,
    OrchestratorPool,
    OrchestratorMaxAttempts,
    OrchestratorFetchTimeoutSecs,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::CoordinatorUrl,
            ConfigKey::CoordinatorTimeoutSecs,
            ConfigKey::AbrReservoirMs,
            ConfigKey::AbrCushionMs,
            ConfigKey::AbrBitrates,
            ConfigKey::OrchestratorPool,
            ConfigKey::OrchestratorMaxAttempts,
            ConfigKey::OrchestratorFetchTimeoutSecs,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingFile,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::CoordinatorUrl | ConfigKey::CoordinatorTimeoutSecs => "coordinator",
            ConfigKey::AbrReservoirMs | ConfigKey::AbrCushionMs | ConfigKey::AbrBitrates => "abr",
            ConfigKey::OrchestratorPool
            | ConfigKey::OrchestratorMaxAttempts
            | ConfigKey::OrchestratorFetchTimeoutSecs => "orchestrator",
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
        }
    }

    /// Key name within its section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::CoordinatorUrl => "url",
            ConfigKey::CoordinatorTimeoutSecs => "timeout_secs",
            ConfigKey::AbrReservoirMs => "reservoir_ms",
            ConfigKey::AbrCushionMs => "cushion_ms",
            ConfigKey::AbrBitrates => "bitrates",
            ConfigKey::OrchestratorPool => "pool",
            ConfigKey::OrchestratorMaxAttempts => "max_attempts",
            ConfigKey::OrchestratorFetchTimeoutSecs => "fetch_timeout_secs",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Fully qualified `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value rendered as in the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let ini = config.to_ini();
        ini.get_from(Some(self.section()), self.key_name())
            .unwrap_or_default()
            .to_string()
    }

    /// Set a value, validating it the same way loading does.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let mut ini = config.to_ini();
        ini.with_section(Some(self.section()))
            .set(self.key_name(), value);
        *config = ConfigFile::from_ini(&ini)?;
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
