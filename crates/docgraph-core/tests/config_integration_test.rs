use docgraph_core::{DependantStrategy, LoggingConfig, Settings};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.analysis.dependant_strategy, DependantStrategy::Graph);
}

#[test]
fn test_missing_files_fall_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::load_from_sources(temp_dir.path(), "test").unwrap();
    assert_eq!(settings.analysis.max_concurrent_analyses, 16);
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn test_layered_files_override_in_order() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("default.toml"),
        r#"
[analysis]
max_concurrent_analyses = 4

[logging]
level = "warn"
"#,
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("staging.toml"),
        r#"
[analysis]
dependant_strategy = "inverted_index"
"#,
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("local.toml"),
        r#"
[logging]
level = "debug"
"#,
    )
    .unwrap();

    let settings = Settings::load_from_sources(temp_dir.path(), "staging").unwrap();
    assert_eq!(settings.analysis.max_concurrent_analyses, 4);
    assert_eq!(
        settings.analysis.dependant_strategy,
        DependantStrategy::InvertedIndex
    );
    assert_eq!(settings.logging.level, "debug");

    // a different environment skips staging.toml
    let prod = Settings::load_from_sources(temp_dir.path(), "production").unwrap();
    assert_eq!(prod.analysis.dependant_strategy, DependantStrategy::Graph);
}

#[test]
fn test_invalid_values_rejected() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("default.toml"),
        r#"
[analysis]
max_concurrent_analyses = 0
"#,
    )
    .unwrap();
    assert!(Settings::load_from_sources(temp_dir.path(), "test").is_err());

    let mut settings = Settings::default();
    settings.logging = LoggingConfig {
        level: "  ".to_string(),
    };
    assert!(settings.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let settings = Settings::default();
    let raw = toml::to_string(&settings).unwrap();
    let parsed = Settings::from_toml_str(&raw).unwrap();
    assert_eq!(
        parsed.analysis.dependant_strategy,
        settings.analysis.dependant_strategy
    );
    assert_eq!(parsed.logging.level, settings.logging.level);
}
