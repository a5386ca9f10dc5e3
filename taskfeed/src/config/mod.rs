//! Configuration for the `taskfeed` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskfeed/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use taskfeed_proto::category::{Category, ViewingContext};

use crate::feed::DEFAULT_PAGE_SIZE;
use crate::registry::{DEFAULT_BASE_URL, RegistryConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No viewer was configured, so no viewing context can be built.
    #[error("no viewer configured (use --viewer or TASKFEED_VIEWER)")]
    MissingViewer,

    /// A category name in the config file is not recognised.
    #[error("unknown category in config: {0}")]
    UnknownCategory(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    service: ServiceFileConfig,
    feed: FeedFileConfig,
    /// Category name to endpoint template.
    endpoints: HashMap<String, String>,
}

/// `[service]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServiceFileConfig {
    base_url: Option<String>,
    viewer: Option<String>,
}

/// `[feed]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FeedFileConfig {
    page_size: Option<usize>,
    poll_interval_secs: Option<u64>,
    categories: Option<Vec<String>>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Service --
    /// Base URL endpoint templates are resolved against.
    pub base_url: String,
    /// Identity of the viewing user.
    pub viewer: Option<String>,
    /// Second party for a pair view.
    pub subject: Option<String>,

    // -- Feed --
    /// Tasks requested per page.
    pub page_size: usize,
    /// How often the active category is refreshed.
    pub poll_interval: Duration,
    /// Categories callers may activate, in activation order.
    pub categories: Vec<Category>,
    /// Buffer size for the observer event channel.
    pub event_buffer: usize,
    /// Per-category endpoint templates.
    pub endpoints: HashMap<Category, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            viewer: None,
            subject: None,
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: Duration::from_secs(30),
            categories: Category::ALL.to_vec(),
            event_buffer: 64,
            endpoints: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/taskfeed/config.toml`)
    /// is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or names a category that does not exist.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let categories = match &file.feed.categories {
            Some(names) => parse_categories(names)?,
            None => defaults.categories,
        };
        let endpoints = file
            .endpoints
            .iter()
            .map(|(name, template)| Ok((parse_category(name)?, template.clone())))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;

        Ok(Self {
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.service.base_url.clone())
                .unwrap_or(defaults.base_url),
            viewer: cli.viewer.clone().or_else(|| file.service.viewer.clone()),
            subject: cli.subject.clone(),
            page_size: cli
                .page_size
                .or(file.feed.page_size)
                .unwrap_or(defaults.page_size)
                .max(1),
            poll_interval: file
                .feed
                .poll_interval_secs
                .map_or(defaults.poll_interval, Duration::from_secs),
            categories,
            event_buffer: file.feed.event_buffer.unwrap_or(defaults.event_buffer),
            endpoints,
        })
    }

    /// Build the [`RegistryConfig`] for a feed registry.
    #[must_use]
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            base_url: self.base_url.clone(),
            page_size: self.page_size,
            categories: self.categories.clone(),
            endpoints: self.endpoints.clone(),
        }
    }

    /// Build the viewing context: a pair view when a subject is set,
    /// otherwise a personal view.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingViewer`] if no viewer is configured.
    pub fn to_context(&self) -> Result<ViewingContext, ConfigError> {
        let viewer = self
            .viewer
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingViewer)?;
        Ok(match self.subject.clone().filter(|s| !s.is_empty()) {
            Some(subject) => ViewingContext::pair(viewer, subject),
            None => ViewingContext::personal(viewer),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Optimistic task-feed synchronization demo")]
pub struct CliArgs {
    /// Identity of the viewing user.
    #[arg(long, env = "TASKFEED_VIEWER")]
    pub viewer: Option<String>,

    /// Second user for a pair view.
    #[arg(long)]
    pub subject: Option<String>,

    /// Base URL of the task service.
    #[arg(long, env = "TASKFEED_BASE_URL")]
    pub base_url: Option<String>,

    /// Tasks requested per page.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Path to config file (default: `~/.config/taskfeed/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKFEED_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskfeed.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_category(name: &str) -> Result<Category, ConfigError> {
    name.parse()
        .map_err(|_| ConfigError::UnknownCategory(name.to_string()))
}

fn parse_categories(names: &[String]) -> Result<Vec<Category>, ConfigError> {
    let mut categories = Vec::with_capacity(names.len());
    for name in names {
        let category = parse_category(name)?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(categories)
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskfeed").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
