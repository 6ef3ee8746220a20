//! Configuration loader with multi-source merging

use super::file_config::{ConfigError, FileConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};
use tracing::debug;

const PROJECT_CONFIG_FILE: &str = "toolchat.toml";

/// Well-known Azure variables and the settings they feed.
const AZURE_ENV_KEYS: &[(&str, &str)] = &[
    ("AZURE_OPENAI_ENDPOINT", "completion.endpoint"),
    ("AZURE_OPENAI_MODEL", "completion.model"),
    ("AZURE_OPENAI_API_VERSION", "completion.api_version"),
    ("AZURE_TENANT_ID", "auth.tenant_id"),
];

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `AZURE_OPENAI_*` / `AZURE_TENANT_ID`
    /// 2. `TOOLCHAT_*` variables (`__` separates sections)
    /// 3. Explicit config path (if provided)
    /// 4. Project root: `./toolchat.toml`
    /// 5. Global: `$XDG_CONFIG_HOME/toolchat/config.toml`
    /// 6. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(project_path) = Self::project_config_path() {
            debug!("Loading project config {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::Invalid {
                    key: "--config",
                    reason: format!("{} does not exist", path.display()),
                });
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::extract(Self::with_env(figment))
    }

    /// Defaults plus environment only (for `--no-config`)
    pub fn load_without_files() -> Result<FileConfig, ConfigError> {
        let figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));
        Self::extract(Self::with_env(figment))
    }

    /// Load `.env` from the working directory (or a parent) into the process
    /// environment. Existing variables win.
    pub fn load_dotenv() -> Option<PathBuf> {
        dotenvy::dotenv().ok()
    }

    fn with_env(figment: Figment) -> Figment {
        let keys: Vec<&str> = AZURE_ENV_KEYS.iter().map(|(env, _)| *env).collect();
        figment
            .merge(Env::prefixed("TOOLCHAT_").split("__"))
            .merge(Env::raw().only(&keys).map(|key| {
                AZURE_ENV_KEYS
                    .iter()
                    .find(|(env, _)| key == *env)
                    .map(|(_, setting)| (*setting).into())
                    .unwrap_or_else(|| key.as_str().into())
            }))
    }

    fn extract(figment: Figment) -> Result<FileConfig, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("toolchat").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        let path = PathBuf::from(PROJECT_CONFIG_FILE);
        path.exists().then_some(path)
    }

    /// Describe the configuration sources (for `--show-config`)
    pub fn describe_sources(config_path: Option<&Path>) -> String {
        let mut out = String::from("Configuration sources (highest priority first):\n");

        for (env, setting) in AZURE_ENV_KEYS {
            let mark = if std::env::var_os(env).is_some() { "SET" } else { "   " };
            out.push_str(&format!("  [{}] Env:     {} -> {}\n", mark, env, setting));
        }
        out.push_str("  [   ] Env:     TOOLCHAT_<SECTION>__<KEY>\n");

        if let Some(path) = config_path {
            let mark = if path.exists() { "FOUND" } else { "MISSING" };
            out.push_str(&format!("  [{}] --config: {}\n", mark, path.display()));
        }

        match Self::project_config_path() {
            Some(path) => out.push_str(&format!("  [FOUND] Project: {}\n", path.display())),
            None => out.push_str(&format!("  [     ] Project: ./{}\n", PROJECT_CONFIG_FILE)),
        }

        if let Some(path) = Self::global_config_path() {
            let mark = if path.exists() { "FOUND" } else { "     " };
            out.push_str(&format!("  [{}] Global:  {}\n", mark, path.display()));
        }

        out.push_str("  [     ] Default: built-in defaults\n");
        out
    }
}
