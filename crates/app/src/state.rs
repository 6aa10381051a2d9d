use std::{fs, path::PathBuf};

use common::crypto::{CryptoError, KeySet, S2kParams};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "grendel";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEYS_DIR_NAME: &str = "keys";
pub const KEY_SET_EXTENSION: &str = "keyset";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where key sets live (defaults to <grendel dir>/keys)
    #[serde(default)]
    pub keys_dir: Option<PathBuf>,
    /// Argon2 cost used when locking newly generated key sets
    #[serde(default)]
    pub s2k: S2kParams,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            keys_dir: None,
            s2k: S2kParams::default(),
        }
    }
}

impl AppConfig {
    /// The configured level, falling back to `info` if it doesn't parse.
    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the grendel directory (~/.grendel)
    pub grendel_dir: PathBuf,
    /// Path to the key set directory
    pub keys_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the grendel directory path (custom or default ~/.grendel)
    pub fn grendel_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new grendel state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let grendel_dir = Self::grendel_dir(custom_path)?;
        if grendel_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&grendel_dir)?;

        let config = config.unwrap_or_default();
        let config_path = grendel_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        let keys_path = Self::keys_path(&grendel_dir, &config);
        fs::create_dir_all(&keys_path)?;

        Ok(Self {
            grendel_dir,
            keys_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the grendel directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let grendel_dir = Self::grendel_dir(custom_path)?;
        if !grendel_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = grendel_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        let keys_path = Self::keys_path(&grendel_dir, &config);
        if !keys_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", KEYS_DIR_NAME)));
        }

        Ok(Self {
            grendel_dir,
            keys_path,
            config_path,
            config,
        })
    }

    fn keys_path(grendel_dir: &std::path::Path, config: &AppConfig) -> PathBuf {
        config
            .keys_dir
            .clone()
            .unwrap_or_else(|| grendel_dir.join(KEYS_DIR_NAME))
    }

    pub fn key_set_path(&self, name: &str) -> Result<PathBuf, StateError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(StateError::InvalidName(name.to_string()));
        }
        Ok(self
            .keys_path
            .join(format!("{}.{}", name, KEY_SET_EXTENSION)))
    }

    /// Store a key set under `name`, refusing to overwrite unless `replace`.
    pub fn save_key_set(
        &self,
        name: &str,
        key_set: &KeySet,
        replace: bool,
    ) -> Result<PathBuf, StateError> {
        let path = self.key_set_path(name)?;
        if path.exists() && !replace {
            return Err(StateError::KeySetExists(name.to_string()));
        }
        // atomic replace
        let tmp = path.with_extension(format!("{}.tmp", KEY_SET_EXTENSION));
        fs::write(&tmp, key_set.to_bytes())?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn load_key_set(&self, name: &str) -> Result<KeySet, StateError> {
        let path = self.key_set_path(name)?;
        if !path.exists() {
            return Err(StateError::UnknownKeySet(name.to_string()));
        }
        let file = fs::File::open(&path)?;
        Ok(KeySet::load_from_reader(std::io::BufReader::new(file))?)
    }

    /// Names of all stored key sets, sorted.
    pub fn key_set_names(&self) -> Result<Vec<String>, StateError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.keys_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_SET_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine home directory")]
    NoHomeDirectory,

    #[error("grendel directory already initialized")]
    AlreadyInitialized,

    #[error("grendel directory not initialized. Run 'grendel init' first")]
    NotInitialized,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key set name: {0:?}")]
    InvalidName(String),

    #[error("key set already exists: {0}")]
    KeySetExists(String),

    #[error("no key set named {0}")]
    UnknownKeySet(String),

    #[error("key set error: {0}")]
    KeySet(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_state() -> (TempDir, AppState) {
        let temp = TempDir::new().unwrap();
        let state = AppState::init(Some(temp.path().join("grendel")), None).unwrap();
        (temp, state)
    }

    #[test]
    fn test_init_then_load() {
        let (temp, state) = temp_state();
        assert!(state.config_path.exists());
        assert!(state.keys_path.is_dir());

        let loaded = AppState::load(Some(temp.path().join("grendel"))).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
        assert_eq!(loaded.keys_path, state.keys_path);
    }

    #[test]
    fn test_init_twice_fails() {
        let (temp, _state) = temp_state();
        assert!(matches!(
            AppState::init(Some(temp.path().join("grendel")), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized_fails() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("nope"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_config_fields_default() {
        let config: AppConfig = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.s2k, S2kParams::INTERACTIVE);
        assert!(config.keys_dir.is_none());

        let config: AppConfig = toml::from_str("log_level = \"loud\"").unwrap();
        assert_eq!(config.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_config_roundtrip_with_s2k() {
        let config = AppConfig {
            s2k: S2kParams::SENSITIVE,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<AppConfig>(&text).unwrap(), config);
    }

    #[test]
    fn test_key_set_names_are_validated() {
        let (_temp, state) = temp_state();
        assert!(state.key_set_path("alice").is_ok());
        assert!(state.key_set_path("work-2024.main").is_ok());
        for bad in ["", "../alice", ".hidden", "a/b", "a b"] {
            assert!(matches!(
                state.key_set_path(bad),
                Err(StateError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_unknown_key_set() {
        let (_temp, state) = temp_state();
        assert!(matches!(
            state.load_key_set("ghost"),
            Err(StateError::UnknownKeySet(_))
        ));
        assert!(state.key_set_names().unwrap().is_empty());
    }
}
