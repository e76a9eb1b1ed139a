//! Configuration management for the context engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (context-engine.toml)
//! - Environment variables (CONTEXT_ENGINE__*)
//!
//! ## Example config file (context-engine.toml):
//! ```toml
//! [repository]
//! root = "../context-repo"
//! contexts_dir = "contexts"
//! schemas_dir = ".context-kit/schemas"
//!
//! [loader]
//! parallel = true
//! include_kinds = ["feature", "user-story"]
//!
//! [impact]
//! rules_path = ".context-kit/rules.yaml"
//! max_depth = 4
//! direction = "outgoing"
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactKind;
use crate::graph::TraversalDirection;

/// Main configuration for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Repository layout
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Document discovery and parsing
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Impact analysis defaults
    #[serde(default)]
    pub impact: ImpactConfig,

    /// Report rendering
    #[serde(default)]
    pub output: OutputConfig,
}

/// Repository layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository root
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory (relative to root) holding one sub-directory per kind
    #[serde(default = "default_contexts_dir")]
    pub contexts_dir: PathBuf,

    /// Directory (relative to root) with per-kind schema overrides
    #[serde(default = "default_schemas_dir")]
    pub schemas_dir: PathBuf,

    /// File extensions treated as artifact documents
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Parse documents on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Only load these kinds (empty = all)
    #[serde(default)]
    pub include_kinds: Vec<ArtifactKind>,

    /// Skip documents whose path (relative to the contexts dir) starts with any of these
    #[serde(default)]
    pub skip_prefixes: Vec<String>,
}

/// Impact analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactConfig {
    /// Rule table document (relative to root unless absolute)
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Traversal depth cap (None = full transitive closure)
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Edge direction followed when computing stale artifacts
    #[serde(default)]
    pub direction: TraversalDirection,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_contexts_dir() -> PathBuf {
    PathBuf::from("contexts")
}

fn default_schemas_dir() -> PathBuf {
    PathBuf::from(".context-kit/schemas")
}

fn default_rules_path() -> PathBuf {
    PathBuf::from(".context-kit/rules.yaml")
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string(), "json".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            contexts_dir: default_contexts_dir(),
            schemas_dir: default_schemas_dir(),
            extensions: default_extensions(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            include_kinds: Vec::new(),
            skip_prefixes: Vec::new(),
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            max_depth: None,
            direction: TraversalDirection::default(),
        }
    }
}

impl RepositoryConfig {
    /// Directory scanned for artifact documents
    pub fn contexts_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.contexts_dir)
    }

    /// Directory searched for schema overrides
    pub fn schemas_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.schemas_dir)
    }
}

impl EngineConfig {
    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "context-engine.toml",
            ".context-engine.toml",
            "config/context-engine.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "context-kit", "context-engine") {
            let xdg_config = config_dir.config_dir().join("context-engine.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CONTEXT_ENGINE__IMPACT__MAX_DEPTH=3 etc.
        builder = builder.add_source(
            Environment::with_prefix("CONTEXT_ENGINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = self
            .to_toml()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Rule table document
    pub fn rules_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.impact.rules_path)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
