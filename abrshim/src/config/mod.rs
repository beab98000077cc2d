//! INI configuration file.
//!
//! ```ini
//! [coordinator]
//! url = https://www.example.org/request
//! timeout_secs = 30
//!
//! [abr]
//! reservoir_ms = 5000
//! cushion_ms = 10000
//! bitrates = 300,750,1200,1850,2850,4300
//!
//! [orchestrator]
//! pool = 5
//! max_attempts = 3
//! fetch_timeout_secs = 30
//!
//! [logging]
//! level = info
//! file = /var/log/abrshim.log
//! ```
//!
//! Missing keys keep their defaults and unknown keys are ignored. A value
//! that does not parse is reported with its section and key.

mod keys;

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::abr::{BbConfig, BitrateLadder, DEFAULT_CUSHION_MS, DEFAULT_RESERVOIR_MS};
use crate::coordinator::{CoordinatorConfig, DEFAULT_COORDINATOR_URL};
use crate::orchestrator::{
    OrchestratorConfig, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_POOL_SIZE,
};

pub use keys::ConfigKey;

/// Default bitrate ladder in kbps.
pub const DEFAULT_BITRATES: [u32; 6] = [300, 750, 1200, 1850, 2850, 4300];

/// Default log level directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const SECTION_COORDINATOR: &str = "coordinator";
const SECTION_ABR: &str = "abr";
const SECTION_ORCHESTRATOR: &str = "orchestrator";
const SECTION_LOGGING: &str = "logging";

/// Errors from loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid INI.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value could not be interpreted.
    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Not a known `section.key`.
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[coordinator]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_COORDINATOR_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// `[abr]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct AbrSettings {
    pub reservoir_ms: f64,
    pub cushion_ms: f64,
    /// Ascending ladder in kbps.
    pub bitrates: Vec<u32>,
}

impl Default for AbrSettings {
    fn default() -> Self {
        Self {
            reservoir_ms: DEFAULT_RESERVOIR_MS,
            cushion_ms: DEFAULT_CUSHION_MS,
            bitrates: DEFAULT_BITRATES.to_vec(),
        }
    }
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub pool: usize,
    pub max_attempts: u32,
    pub fetch_timeout_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            pool: DEFAULT_POOL_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fetch_timeout_secs: 30,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `abrshim=debug`.
    pub level: String,
    /// Optional log file written in addition to the terminal.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// The complete configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub coordinator: CoordinatorSettings,
    pub abr: AbrSettings,
    pub orchestrator: OrchestratorSettings,
    pub logging: LoggingSettings,
}

/// Default configuration file location: `<config dir>/abrshim/config.ini`.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("abrshim")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse(e.to_string()),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = ini.get_from(Some(SECTION_COORDINATOR), "url") {
            config.coordinator.url = url.trim().to_string();
        }
        if let Some(v) = parse_value(ini, SECTION_COORDINATOR, "timeout_secs")? {
            config.coordinator.timeout_secs = v;
        }

        if let Some(v) = parse_value(ini, SECTION_ABR, "reservoir_ms")? {
            config.abr.reservoir_ms = v;
        }
        if let Some(v) = parse_value(ini, SECTION_ABR, "cushion_ms")? {
            config.abr.cushion_ms = v;
        }
        if let Some(raw) = ini.get_from(Some(SECTION_ABR), "bitrates") {
            config.abr.bitrates = parse_bitrates(raw)?;
        }

        if let Some(v) = parse_value::<usize>(ini, SECTION_ORCHESTRATOR, "pool")? {
            if v == 0 {
                return Err(invalid(SECTION_ORCHESTRATOR, "pool", "0", "must be at least 1"));
            }
            config.orchestrator.pool = v;
        }
        if let Some(v) = parse_value::<u32>(ini, SECTION_ORCHESTRATOR, "max_attempts")? {
            if v == 0 {
                return Err(invalid(
                    SECTION_ORCHESTRATOR,
                    "max_attempts",
                    "0",
                    "must be at least 1",
                ));
            }
            config.orchestrator.max_attempts = v;
        }
        if let Some(v) = parse_value(ini, SECTION_ORCHESTRATOR, "fetch_timeout_secs")? {
            config.orchestrator.fetch_timeout_secs = v;
        }

        if let Some(level) = ini.get_from(Some(SECTION_LOGGING), "level") {
            config.logging.level = level.trim().to_string();
        }
        if let Some(file) = ini.get_from(Some(SECTION_LOGGING), "file") {
            let file = file.trim();
            config.logging.file = (!file.is_empty()).then(|| PathBuf::from(file));
        }

        Ok(config)
    }

    /// Render as INI.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some(SECTION_COORDINATOR))
            .set("url", self.coordinator.url.as_str())
            .set("timeout_secs", self.coordinator.timeout_secs.to_string());
        ini.with_section(Some(SECTION_ABR))
            .set("reservoir_ms", self.abr.reservoir_ms.to_string())
            .set("cushion_ms", self.abr.cushion_ms.to_string())
            .set("bitrates", join_bitrates(&self.abr.bitrates));
        ini.with_section(Some(SECTION_ORCHESTRATOR))
            .set("pool", self.orchestrator.pool.to_string())
            .set("max_attempts", self.orchestrator.max_attempts.to_string())
            .set(
                "fetch_timeout_secs",
                self.orchestrator.fetch_timeout_secs.to_string(),
            );
        ini.with_section(Some(SECTION_LOGGING))
            .set("level", self.logging.level.as_str());
        if let Some(file) = &self.logging.file {
            ini.with_section(Some(SECTION_LOGGING))
                .set("file", file.display().to_string());
        }
        ini
    }

    /// Render as INI text.
    pub fn to_ini_string(&self) -> Result<String, ConfigError> {
        let mut buf = Vec::new();
        self.to_ini().write_to(&mut buf)?;
        String::from_utf8(buf).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_url(self.coordinator.url.clone())
            .with_timeout(Duration::from_secs(self.coordinator.timeout_secs))
    }

    pub fn bb_config(&self) -> BbConfig {
        BbConfig::default()
            .with_reservoir_ms(self.abr.reservoir_ms)
            .with_cushion_ms(self.abr.cushion_ms)
    }

    /// The configured ladder, validated.
    pub fn ladder(&self) -> Result<BitrateLadder, ConfigError> {
        BitrateLadder::new(self.abr.bitrates.clone()).map_err(|e| ConfigError::InvalidValue {
            section: SECTION_ABR.to_string(),
            key: "bitrates".to_string(),
            value: join_bitrates(&self.abr.bitrates),
            reason: e.to_string(),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_pool(self.orchestrator.pool)
            .with_retry(RetryPolicy::exponential(self.orchestrator.max_attempts))
            .with_fetch_timeout(Duration::from_secs(self.orchestrator.fetch_timeout_secs))
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(ini: &Ini, section: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match ini.get_from(Some(section), key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| invalid(section, key, raw, e)),
    }
}

fn parse_bitrates(raw: &str) -> Result<Vec<u32>, ConfigError> {
    let bitrates = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(SECTION_ABR, "bitrates", raw, e))?;

    BitrateLadder::new(bitrates.clone()).map_err(|e| invalid(SECTION_ABR, "bitrates", raw, e))?;
    Ok(bitrates)
}

fn join_bitrates(bitrates: &[u32]) -> String {
    bitrates
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.coordinator.url, "https://www.example.org/request");
        assert_eq!(config.coordinator.timeout_secs, 30);
        assert_eq!(config.abr.reservoir_ms, 5000.0);
        assert_eq!(config.abr.cushion_ms, 10000.0);
        assert_eq!(config.abr.bitrates, vec![300, 750, 1200, 1850, 2850, 4300]);
        assert_eq!(config.orchestrator.pool, 5);
        assert_eq!(config.orchestrator.max_attempts, 3);
        assert_eq!(config.orchestrator.fetch_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ConfigFile::from_ini_str(
            "[abr]\nbitrates = 300, 750, 1200\n\n[orchestrator]\npool = 2\n[unknown]\nfoo = bar\n",
        )
        .unwrap();
        assert_eq!(config.abr.bitrates, vec![300, 750, 1200]);
        assert_eq!(config.orchestrator.pool, 2);
        assert_eq!(config.orchestrator.max_attempts, 3);
        assert_eq!(config.coordinator, CoordinatorSettings::default());
    }

    #[test]
    fn test_invalid_number_names_key() {
        let err = ConfigFile::from_ini_str("[orchestrator]\npool = many\n").unwrap_err();
        match err {
            ConfigError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "orchestrator");
                assert_eq!(key, "pool");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_pool_rejected() {
        assert!(matches!(
            ConfigFile::from_ini_str("[orchestrator]\npool = 0\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_descending_bitrates_rejected() {
        let err = ConfigFile::from_ini_str("[abr]\nbitrates = 750,300\n").unwrap_err();
        assert!(err.to_string().contains("abr.bitrates"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.coordinator.url = "http://localhost:8080/abr".to_string();
        config.abr.cushion_ms = 4000.0;
        config.logging.file = Some(PathBuf::from("/tmp/abrshim.log"));
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_converters() {
        let config = ConfigFile::from_ini_str(
            "[coordinator]\ntimeout_secs = 5\n[abr]\nreservoir_ms = 2000\n[orchestrator]\nmax_attempts = 4\nfetch_timeout_secs = 12\n",
        )
        .unwrap();

        assert_eq!(config.coordinator_config().timeout, Duration::from_secs(5));
        assert_eq!(config.bb_config().reservoir_ms, 2000.0);
        assert_eq!(config.ladder().unwrap().len(), 6);

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.retry.max_attempts(), 4);
        assert_eq!(orchestrator.fetch_timeout, Duration::from_secs(12));
        assert_eq!(orchestrator.pool, 5);
    }

    #[test]
    fn test_to_ini_string_contains_sections() {
        let text = ConfigFile::default().to_ini_string().unwrap();
        assert!(text.contains("[coordinator]"));
        assert!(text.contains("bitrates=300,750,1200,1850,2850,4300"));
        assert!(!text.contains("file="));
    }
}
