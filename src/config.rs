use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Default capacity of the action history
pub const DEFAULT_MAX_RECENCY_ENTRIES: usize = 50;

/// Context key whose mappings apply to every source
pub const GLOBAL_MAPPINGS: &str = "global";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Command namespace; the dispatch command is "<namespace>.doCodeAction"
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Focus-change handling
    #[serde(default)]
    pub focus: FocusConfig,

    /// Action history used to rank the action menu
    #[serde(default)]
    pub recency: RecencyConfig,

    /// Floating window used to show the action menu
    #[serde(default)]
    pub floating: FloatingConfig,

    /// Built-in buffer list source
    #[serde(default)]
    pub buffer: BufferSourceConfig,

    /// Key mappings by context type ("global" applies everywhere).
    /// Mapping a key to null removes an inherited mapping.
    #[serde(default = "default_mappings")]
    pub mappings: HashMap<String, ModeMappings>,
}

fn default_namespace() -> String {
    "explorer".to_string()
}

fn default_throttle_ms() -> u64 {
    200
}

fn default_recency_key() -> String {
    "actionMru".to_string()
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_RECENCY_ENTRIES
}

fn default_close_delay_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FocusConfig {
    /// Throttle window for focus-change events in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Log every admitted focus event
    #[serde(default)]
    pub debug: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecencyConfig {
    /// Database file (default: <data dir>/canopy/db.json)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Dotted key under which the history is stored, below the namespace
    #[serde(default = "default_recency_key")]
    pub key: String,

    /// Maximum number of remembered identifiers
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            path: None,
            key: default_recency_key(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FloatingConfig {
    /// Delay before a transient floating window closes itself
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
}

impl Default for FloatingConfig {
    fn default() -> Self {
        Self {
            close_delay_ms: default_close_delay_ms(),
        }
    }
}

/// Where the explorer panel is placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PanelPosition {
    #[default]
    Left,
    Right,
    Tab,
    Floating,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BufferSourceConfig {
    /// Close the panel after opening a buffer
    #[serde(default)]
    pub quit_on_open: bool,

    #[serde(default)]
    pub position: PanelPosition,
}

/// Forward key -> action maps for one context type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModeMappings {
    #[serde(default)]
    pub normal: BTreeMap<String, Option<String>>,

    #[serde(default)]
    pub visual: BTreeMap<String, Option<String>>,
}

fn mode(pairs: &[(&str, &str)]) -> BTreeMap<String, Option<String>> {
    pairs
        .iter()
        .map(|(key, action)| (key.to_string(), Some(action.to_string())))
        .collect()
}

fn default_mappings() -> HashMap<String, ModeMappings> {
    let mut mappings = HashMap::new();
    mappings.insert(
        GLOBAL_MAPPINGS.to_string(),
        ModeMappings {
            normal: mode(&[
                (".", "actionMenu"),
                ("<cr>", "open"),
                ("o", "open"),
                ("s", "open:split"),
                ("v", "open:vsplit"),
                ("t", "open:tab"),
                ("h", "collapse"),
                ("l", "expand"),
            ]),
            visual: mode(&[(".", "actionMenu")]),
        },
    );
    mappings.insert(
        "buffer".to_string(),
        ModeMappings {
            normal: mode(&[("d", "delete"), ("D", "deleteForever"), ("<c-o>", "drop")]),
            visual: mode(&[("d", "delete"), ("D", "deleteForever")]),
        },
    );
    mappings
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            focus: FocusConfig::default(),
            recency: RecencyConfig::default(),
            floating: FloatingConfig::default(),
            buffer: BufferSourceConfig::default(),
            mappings: default_mappings(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("canopy").join("config.json"))
    }

    /// Load configuration from the default location, falling back to defaults if not found
    pub fn load_or_default() -> Self {
        if let Some(config_path) = Self::default_config_path() {
            if config_path.exists() {
                match Self::load_from_file(&config_path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to load config from {}: {}, using defaults",
                            config_path.display(),
                            e
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Load configuration from a JSON file.
    ///
    /// User mappings are layered over the default mappings key by key, so a
    /// config that rebinds one key keeps every other default binding.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Config =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.merge_default_mappings();
        config.validate()?;

        Ok(config)
    }

    fn merge_default_mappings(&mut self) {
        let user = std::mem::take(&mut self.mappings);
        self.mappings = default_mappings();
        for (context, overrides) in user {
            let merged = self.mappings.entry(context).or_default();
            merged.normal.extend(overrides.normal);
            merged.visual.extend(overrides.visual);
        }
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Database file for the action history
    pub fn db_path(&self) -> PathBuf {
        self.recency.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("canopy")
                .join("db.json")
        })
    }

    /// Full dotted key of the action history, e.g. "explorer.actionMru"
    pub fn recency_key(&self) -> String {
        format!("{}.{}", self.namespace, self.recency.key)
    }

    /// JSON Schema of the configuration file
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() || self.namespace.contains('.') {
            return Err(ConfigError::Validation(
                "namespace must be non-empty and must not contain '.'".to_string(),
            ));
        }

        if self.focus.throttle_ms == 0 {
            return Err(ConfigError::Validation(
                "focus.throttle_ms must be greater than 0".to_string(),
            ));
        }

        if self.recency.key.is_empty() || self.recency.key.split('.').any(str::is_empty) {
            return Err(ConfigError::Validation(
                "recency.key must be a non-empty dotted key".to_string(),
            ));
        }

        if self.recency.max_entries == 0 {
            return Err(ConfigError::Validation(
                "recency.max_entries must be greater than 0".to_string(),
            ));
        }

        for (context, modes) in &self.mappings {
            let keys = modes.normal.iter().chain(modes.visual.iter());
            for (key, action) in keys {
                if key.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "mappings.{context}: key cannot be empty"
                    )));
                }
                if matches!(action, Some(action) if action.is_empty()) {
                    return Err(ConfigError::Validation(format!(
                        "mappings.{context}: action for '{key}' cannot be empty"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
