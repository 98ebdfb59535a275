// Configuration loading and parsing (vidhidesk.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

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
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub db_path: String,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// vidhidesk.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire vidhidesk.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AppFile {
    llm: LlmConfig,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Candidate Gemini model identifiers, in priority order. The resolver
    /// tries each in turn and stops at the first success.
    pub models: Vec<String>,
    /// When true, query the service's model listing and prefer the first
    /// candidate it reports as available. Probe failures fall back to the
    /// static priority order.
    #[serde(default)]
    pub probe_available: bool,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub gemini_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/vidhidesk.toml` and
/// (optionally) `config/credentials.toml`, both relative to `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization
/// automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- vidhidesk.toml (required) ---
    let app_path = config_dir.join("vidhidesk.toml");
    let app_text = read_file(&app_path)?;
    let app_file: AppFile = toml::from_str(&app_text).map_err(|e| ConfigError::ParseError {
        path: app_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        llm: app_file.llm,
        db_path: app_file.database.path,
        credentials,
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
        // If config/ also doesn't exist, the app will fail to load config.
        // Return an error with a clear message about the missing defaults directory.
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

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

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

        // Skip .example template files
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
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, skip it
            }
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

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.llm.models.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "llm.models".into(),
            message: "at least one candidate model identifier is required".into(),
        });
    }

    for (i, model) in config.llm.models.iter().enumerate() {
        if model.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("llm.models[{i}]"),
                message: "model identifier must not be blank".into(),
            });
        }
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID_APP_TOML: &str = r#"
[llm]
models = ["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash-exp"]
probe_available = false

[database]
path = "vidhidesk.db"
"#;

    /// Helper: create a fresh temp base dir with config/vidhidesk.toml.
    fn setup_base(name: &str, app_toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("vidhidesk_config_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/vidhidesk.toml"), app_toml).unwrap();
        tmp
    }

    #[test]
    fn load_valid_config() {
        let tmp = setup_base("valid", VALID_APP_TOML);

        let config = load_config_from(&tmp).expect("should load valid config");
        assert_eq!(
            config.llm.models,
            vec!["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash-exp"]
        );
        assert!(!config.llm.probe_available);
        assert_eq!(config.db_path, "vidhidesk.db");
        assert!(config.credentials.gemini_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn probe_available_defaults_to_false() {
        let toml = r#"
[llm]
models = ["gemini-1.5-flash"]

[database]
path = "x.db"
"#;
        let tmp = setup_base("probe_default", toml);
        let config = load_config_from(&tmp).unwrap();
        assert!(!config.llm.probe_available);
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_api_key() {
        let tmp = setup_base("with_creds", VALID_APP_TOML);
        fs::write(
            tmp.join("config/credentials.toml"),
            "gemini_api_key = \"AIza-test-key\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).expect("should load with credentials.toml");
        assert_eq!(
            config.credentials.gemini_api_key.as_deref(),
            Some("AIza-test-key")
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_credentials_toml_is_ok() {
        let tmp = setup_base("no_creds", VALID_APP_TOML);
        let config = load_config_from(&tmp).expect("should load without credentials.toml");
        assert!(config.credentials.gemini_api_key.is_none());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_model_list() {
        let toml = r#"
[llm]
models = []

[database]
path = "x.db"
"#;
        let tmp = setup_base("empty_models", toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "llm.models"),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_blank_model_identifier() {
        let toml = r#"
[llm]
models = ["gemini-1.5-flash", "  "]

[database]
path = "x.db"
"#;
        let tmp = setup_base("blank_model", toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "llm.models[1]"),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_db_path() {
        let toml = r#"
[llm]
models = ["gemini-1.5-flash"]

[database]
path = ""
"#;
        let tmp = setup_base("empty_db_path", toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "database.path"),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_app_toml() {
        let tmp = std::env::temp_dir().join("vidhidesk_config_missing_app");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with("vidhidesk.toml"));
            }
            other => panic!("expected FileNotFound, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = setup_base("invalid_toml", "this is not valid [[[ toml");
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => {
                assert!(path.ends_with("vidhidesk.toml"));
            }
            other => panic!("expected ParseError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_files() {
        let tmp = std::env::temp_dir().join("vidhidesk_config_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);

        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::write(defaults_dir.join("vidhidesk.toml"), VALID_APP_TOML).unwrap();
        // Add an example file that should NOT be copied
        fs::write(
            defaults_dir.join("credentials.toml.example"),
            "gemini_api_key = \"AIza...\"\n",
        )
        .unwrap();

        assert!(!tmp.join("config").exists());

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);

        assert!(tmp.join("config/vidhidesk.toml").exists());
        assert!(!tmp.join("config/credentials.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_skips_existing() {
        let tmp = std::env::temp_dir().join("vidhidesk_config_ensure_skips");
        let _ = fs::remove_dir_all(&tmp);

        let defaults_dir = tmp.join("defaults");
        let config_dir = tmp.join("config");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::create_dir_all(&config_dir).unwrap();

        fs::write(defaults_dir.join("vidhidesk.toml"), VALID_APP_TOML).unwrap();
        // Pre-create vidhidesk.toml in config/ with custom content
        fs::write(config_dir.join("vidhidesk.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert!(copied.is_empty());

        // Original custom content should be preserved
        let content = fs::read_to_string(config_dir.join("vidhidesk.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("vidhidesk_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }
}
