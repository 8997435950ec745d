//! Configuration management
//!
//! Manages where the metrics documents live and the thresholds the analyzer
//! classifies skills with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metrics::analysis::AnalysisConfig;
use crate::metrics::trials::DEFAULT_ITERATIONS;

/// Environment variable naming the cache directory directly
pub const CACHE_DIR_ENV: &str = "CACHE_DIR";
/// Environment variable naming the project root; the cache lives under it
pub const PROJECT_ROOT_ENV: &str = "MAS_PROJECT_ROOT";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pattern analysis thresholds
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// A/B trial settings
    #[serde(default)]
    pub trials: TrialsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Cache directory override; environment variables still take precedence
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialsConfig {
    /// Iterations recorded when a test does not specify any
    #[serde(default = "default_iterations")]
    pub default_iterations: u32,
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self {
            default_iterations: default_iterations(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Cache directory from the environment, this config, or the working directory
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(resolve_cache_dir(
            std::env::var(CACHE_DIR_ENV).ok(),
            std::env::var(PROJECT_ROOT_ENV).ok(),
            self.storage.cache_dir.as_deref(),
            &cwd,
        ))
    }
}

/// `CACHE_DIR`, then `MAS_PROJECT_ROOT/_bmad/_cache`, then the configured
/// directory, then `<cwd>/_bmad/_cache`. Empty variables are ignored.
pub fn resolve_cache_dir(
    cache_dir_env: Option<String>,
    project_root_env: Option<String>,
    configured: Option<&Path>,
    cwd: &Path,
) -> PathBuf {
    if let Some(dir) = cache_dir_env.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(root) = project_root_env.filter(|r| !r.is_empty()) {
        return Path::new(&root).join("_bmad").join("_cache");
    }
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    cwd.join("_bmad").join("_cache")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "mas", "mas-evolution")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Show current configuration
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration ({})", config_path()?.display());
    println!("  cache directory:           {}", config.cache_dir()?.display());
    println!("  frequent after:            {} invocations", config.analysis.frequent_min_invocations);
    println!("  failing below:             {:.0}% success", config.analysis.failing_success_rate * 100.0);
    println!("  slow above:                {:.1}s average", config.analysis.slow_avg_time_secs);
    println!("  missing capability after:  {} requests", config.analysis.missing_capability_min);
    println!("  trend window:              {} events", config.analysis.trend_window);
    println!("  default A/B iterations:    {}", config.trials.default_iterations);

    Ok(())
}

/// Reset configuration to defaults
pub fn reset_config() -> Result<()> {
    let config = Config::default();
    config.save()?;
    println!("Configuration reset to defaults.");
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
