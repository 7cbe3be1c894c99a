// Configuration loading and parsing (server.toml, draft.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::draft::roster::Rules;
use crate::draft::ruleset::{self, Ruleset, RulesetError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },

    #[error("failed to load rulesets: {0}")]
    RulesetLoad(#[from] RulesetError),
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    /// Database file path. Empty means the platform data directory.
    pub db_path: String,
    /// Default `tracing` filter, used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub rulesets_dir: String,
    pub draft: DraftSettings,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    websocket: WebsocketSection,
    database: DatabaseSection,
    #[serde(default)]
    logging: LoggingSection,
    data: DataSection,
}

#[derive(Debug, Clone, Deserialize)]
struct WebsocketSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingSection {
    filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "pokedraft=info,warn".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DataSection {
    rulesets_dir: String,
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[draft]` table in draft.toml.
#[derive(Debug, Clone, Deserialize)]
struct DraftFile {
    draft: DraftSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftSettings {
    /// Game generation that rulesets loaded from disk are tagged with.
    pub generation: u32,
    /// Privilege level at or above which a member may reject any trade.
    pub owner_privilege: u32,
    /// Limits given to participants who join without explicit rules.
    pub default_rules: Rules,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml` and
/// `config/draft.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let server_path = config_dir.join("server.toml");
    let server_file: ServerFile = parse_file(&server_path)?;

    let draft_path = config_dir.join("draft.toml");
    let draft_file: DraftFile = parse_file(&draft_path)?;

    let config = Config {
        ws_port: server_file.websocket.port,
        db_path: server_file.database.path,
        log_filter: server_file.logging.filter,
        rulesets_dir: server_file.data.rulesets_dir,
        draft: draft_file.draft,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

impl Config {
    /// The database path to open. An empty `database.path` resolves to
    /// `pokedraft.db` inside the platform data directory, which is created
    /// if needed.
    pub fn resolved_db_path(&self) -> Result<PathBuf, ConfigError> {
        if !self.db_path.is_empty() {
            return Ok(PathBuf::from(&self.db_path));
        }
        let dirs = directories::ProjectDirs::from("", "", "pokedraft").ok_or_else(|| {
            ConfigError::ValidationError {
                field: "database.path".into(),
                message: "empty and no platform data directory is available".into(),
            }
        })?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::ValidationError {
            field: "database.path".into(),
            message: format!("failed to create {}: {e}", data_dir.display()),
        })?;
        Ok(data_dir.join("pokedraft.db"))
    }

    /// Load every ruleset CSV from `data.rulesets_dir`, resolved against
    /// `base_dir` when relative.
    pub fn load_rulesets(&self, base_dir: &Path) -> Result<Vec<Ruleset>, ConfigError> {
        let dir = base_dir.join(&self.rulesets_dir);
        Ok(ruleset::load_dir(&dir, self.draft.generation)?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.ws_port == 0 {
        return Err(ConfigError::ValidationError {
            field: "websocket.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    let rules = &config.draft.default_rules;
    let rule_fields: &[(&str, u32)] = &[
        ("draft.default_rules.max_points", rules.max_points),
        ("draft.default_rules.max_team_size", rules.max_team_size),
    ];
    for (name, val) in rule_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be greater than 0".into(),
            });
        }
    }

    if config.rulesets_dir.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "data.rulesets_dir".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
