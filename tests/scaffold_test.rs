// Integration tests for the project scaffold.

use std::path::Path;

/// Verify that defaults/vidhidesk.toml is valid TOML.
#[test]
fn default_app_toml_is_valid() {
    let content = std::fs::read_to_string("defaults/vidhidesk.toml")
        .expect("defaults/vidhidesk.toml should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(
        parsed.is_ok(),
        "defaults/vidhidesk.toml is not valid TOML: {:?}",
        parsed.err()
    );
}

/// Verify that defaults/credentials.toml.example is valid TOML.
#[test]
fn credentials_example_is_valid_toml() {
    let content = std::fs::read_to_string("defaults/credentials.toml.example")
        .expect("defaults/credentials.toml.example should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(
        parsed.is_ok(),
        "defaults/credentials.toml.example is not valid TOML: {:?}",
        parsed.err()
    );
}

/// Verify that all expected source files exist.
#[test]
fn source_files_exist() {
    let expected_files = [
        "src/main.rs",
        "src/lib.rs",
        "src/app.rs",
        "src/config.rs",
        "src/db.rs",
        "src/session.rs",
        "src/llm/mod.rs",
        "src/llm/client.rs",
        "src/llm/prompt.rs",
    ];
    for file in expected_files {
        assert!(Path::new(file).is_file(), "Expected source file '{}' to exist", file);
    }
}

/// Verify the default config carries the expected model priority list.
#[test]
fn default_toml_has_expected_settings() {
    let content = std::fs::read_to_string("defaults/vidhidesk.toml").unwrap();
    let config: toml::Value = toml::from_str(&content).unwrap();

    let llm = config.get("llm").expect("llm section should exist");
    let models: Vec<&str> = llm
        .get("models")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(
        models,
        vec!["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash-exp"]
    );
    assert!(!llm.get("probe_available").unwrap().as_bool().unwrap());

    let database = config.get("database").expect("database section should exist");
    assert_eq!(database.get("path").unwrap().as_str().unwrap(), "vidhidesk.db");
}

/// The example credentials file must never carry a real key, and the real
/// credentials file must never be committed.
#[test]
fn no_committed_credentials() {
    let content = std::fs::read_to_string("defaults/credentials.toml.example").unwrap();
    let parsed: toml::Value = toml::from_str(&content).unwrap();
    let key = parsed.get("gemini_api_key").unwrap().as_str().unwrap();
    assert_eq!(key, "AIza...", "example file should hold a placeholder only");

    assert!(
        !Path::new("defaults/credentials.toml").exists(),
        "a real credentials file must not ship in defaults/"
    );
}
