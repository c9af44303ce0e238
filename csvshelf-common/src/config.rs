//! Configuration loading and root folder resolution
//!
//! Resolution order, highest priority first:
//! 1. Command-line argument (handled by the binary)
//! 2. Environment variable (`CSVSHELF_ROOT_FOLDER`, then `CSVSHELF_ROOT`)
//! 3. TOML config file (`<config_dir>/csvshelf/<module>.toml`)
//! 4. OS-dependent compiled default
//!
//! A missing or unreadable TOML file never stops startup; it is logged and
//! the compiled defaults are used instead.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Primary root folder environment variable
pub const ENV_ROOT_FOLDER: &str = "CSVSHELF_ROOT_FOLDER";

/// Alternative root folder environment variable
pub const ENV_ROOT: &str = "CSVSHELF_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "csvshelf.db";

/// Default upload size limit (1 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
    /// Maximum time spent retrying a write on "database is locked"
    pub lock_wait_ms: u64,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was compiled for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5780,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            lock_wait_ms: 5000,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/csvshelf (or /var/lib/csvshelf for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("csvshelf"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/csvshelf"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("csvshelf"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/csvshelf"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("csvshelf"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\csvshelf"))
    } else {
        PathBuf::from("./csvshelf_data")
    }
}

/// `[logging]` section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[server]` section of the TOML file; unset keys fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_upload_bytes: Option<u64>,
    pub lock_wait_ms: Option<u64>,
}

/// On-disk TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

impl TomlConfig {
    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Like [`TomlConfig::load`], but a missing file is `Ok(None)`
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }
}

/// Settings after merging the TOML file over compiled defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
    pub lock_wait_ms: u64,
}

impl ResolvedSettings {
    /// Overlay an optional TOML file on top of compiled defaults
    pub fn from_layers(defaults: &CompiledDefaults, file: Option<&TomlConfig>) -> Self {
        let server = file.map(|c| &c.server);
        Self {
            log_level: file
                .map(|c| c.logging.level.clone())
                .unwrap_or_else(|| defaults.log_level.clone()),
            host: server
                .and_then(|s| s.host.clone())
                .unwrap_or_else(|| defaults.host.clone()),
            port: server.and_then(|s| s.port).unwrap_or(defaults.port),
            max_upload_bytes: server
                .and_then(|s| s.max_upload_bytes)
                .unwrap_or(defaults.max_upload_bytes),
            lock_wait_ms: server
                .and_then(|s| s.lock_wait_ms)
                .unwrap_or(defaults.lock_wait_ms),
        }
    }
}

/// Resolves the root folder for a module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }

    /// Module-specific TOML path, e.g. `~/.config/csvshelf/server.toml`
    pub fn config_file_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("csvshelf").join(format!("{}.toml", self.module_name)))
    }

    /// Config file path for log messages
    pub fn display_config_path(&self) -> String {
        self.config_file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("<no config dir>/csvshelf/{}.toml", self.module_name))
    }

    /// Read the module TOML file without logging
    ///
    /// For callers that run before a tracing subscriber exists and report
    /// the error themselves. A missing file is `Ok(None)`.
    pub fn read_config(&self) -> Result<Option<TomlConfig>> {
        match self.config_file_path() {
            Some(path) => TomlConfig::load_optional(&path),
            None => Ok(None),
        }
    }

    /// Load the module TOML file if present and valid
    pub fn load_config(&self) -> Option<TomlConfig> {
        match self.read_config() {
            Ok(None) => {
                debug!("No config file for module {}", self.module_name);
                None
            }
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file {}: {}", self.display_config_path(), e);
                None
            }
        }
    }

    /// Resolve root folder (environment, then TOML, then compiled default)
    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(|| self.load_config())
    }

    /// Resolve using an already loaded TOML file for the third layer
    pub fn resolve_with_config(&self, file: Option<&TomlConfig>) -> PathBuf {
        self.resolve_with(|| file.cloned())
    }

    fn resolve_with(&self, file: impl FnOnce() -> Option<TomlConfig>) -> PathBuf {
        if let Ok(path) = std::env::var(ENV_ROOT_FOLDER) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Ok(path) = std::env::var(ENV_ROOT) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(root_folder) = file().and_then(|c| c.root_folder) {
            return root_folder;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout and hands out paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder (and parents) if missing; idempotent
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder).map_err(|e| {
            Error::Config(format!(
                "Failed to create root folder {}: {}",
                self.root_folder.display(),
                e
            ))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Directory holding staged uploads while they are processed
    pub fn upload_dir(&self) -> PathBuf {
        self.root_folder.join("uploads").join("csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_settings_without_file_use_defaults() {
        let defaults = CompiledDefaults::for_current_platform();
        let settings = ResolvedSettings::from_layers(&defaults, None);

        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 5780);
        assert_eq!(settings.max_upload_bytes, 1024 * 1024);
        assert_eq!(settings.lock_wait_ms, 5000);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_resolved_settings_partial_file_overrides_only_given_keys() {
        let defaults = CompiledDefaults::for_current_platform();
        let file = TomlConfig::parse(
            r#"
            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let settings = ResolvedSettings::from_layers(&defaults, Some(&file));
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.host, defaults.host);
        assert_eq!(settings.max_upload_bytes, defaults.max_upload_bytes);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = TomlConfig::parse("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
