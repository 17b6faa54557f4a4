//! Integration tests for configuration loading and validation

use dataflow::config::{
    LoadType, TransformationConfig, load_pipeline_config, parse_pipeline_config, validate,
};
use dataflow::WriteMode;
use eyre::Result;
use serial_test::serial;
use tempfile::TempDir;

const NIGHTLY: &str = r#"
globals:
  retry_delay: 5
  max_retries: 1
  write_mode: overwrite
pipeline:
  pipeline_name: nightly
  max_retries: 2
mappings:
  - mapping:
      mapping_name: orders_to_lake
      write_mode: append
      from:
        store: { type: relational, connection_url: "sqlite://${NIGHTLY_DATA_DIR}/shop.db" }
        entity: { include: [orders, customers] }
      to:
        store: { type: file, path: "./lake/{entity}/" }
        data_format: { type: parquet }
      transformations:
        - type: filter
          conditions: [{ column: total, operator: greater_equal, value: 10 }]
        - type: cleanup
          remove_duplicates: true
  - mapping:
      mapping_name: refresh_dims
      load_type: incremental
      retry_delay: 0.5
      from:
        store: { type: file, path: "./exports/${entity}$.csv" }
        entity: { include: [regions] }
      to:
        store: { type: relational, connection_url: "sqlite:${UNSET_DATAFLOW_VAR}/dw.db" }
"#;

#[test]
#[serial]
fn test_load_file_with_inheritance_and_env() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nightly.yml");
    std::fs::write(&path, NIGHTLY)?;
    unsafe {
        std::env::set_var("NIGHTLY_DATA_DIR", "/srv/data");
    }

    let config = load_pipeline_config(&path)?;
    assert_eq!(config.name, "nightly");
    assert_eq!(config.mappings.len(), 2);

    let orders = &config.mappings[0];
    assert_eq!(orders.write_mode, WriteMode::Append);
    assert_eq!(orders.max_retries, 2);
    assert_eq!(orders.retry_delay, 5.0);
    assert_eq!(
        orders.source.store.connection_url.as_deref(),
        Some("sqlite:///srv/data/shop.db")
    );
    assert_eq!(orders.target.store.path.as_deref(), Some("./lake/{entity}/"));
    assert_eq!(orders.source.entity.include, vec!["orders", "customers"]);
    assert!(matches!(
        &orders.transformations[1],
        TransformationConfig::Cleanup(c) if c.remove_duplicates && c.trim_whitespace
    ));

    let dims = &config.mappings[1];
    assert_eq!(dims.write_mode, WriteMode::Overwrite);
    assert_eq!(dims.load_type, LoadType::Incremental);
    assert_eq!(dims.retry_delay, 0.5);
    assert_eq!(dims.source.store.path.as_deref(), Some("./exports/${entity}$.csv"));
    assert_eq!(
        dims.target.store.connection_url.as_deref(),
        Some("sqlite:${UNSET_DATAFLOW_VAR}/dw.db")
    );

    unsafe {
        std::env::remove_var("NIGHTLY_DATA_DIR");
    }
    Ok(())
}

#[test]
#[serial]
fn test_validation_of_loaded_config() -> Result<()> {
    let config = parse_pipeline_config(NIGHTLY)?;
    let report = validate(&config);
    assert!(report.is_valid(), "{:?}", report.errors);
    assert!(report.warnings.iter().any(|w| w.contains("incremental")));
    Ok(())
}

#[test]
fn test_invalid_config_collects_every_error() -> Result<()> {
    let yaml = r#"
pipeline: {}
mappings:
  - mapping:
      write_mode: upsert_only
      max_retries: 0
      from: { store: { type: ftp } }
      to: { store: { type: file }, data_format: { type: xml } }
"#;
    let report = validate(&parse_pipeline_config(yaml)?);
    assert!(!report.is_valid());
    let all = report.errors.join("\n");
    for needle in [
        "pipeline_name",
        "mapping_name",
        "merge_keys",
        "max_retries",
        "ftp",
        "path",
        "xml",
    ] {
        assert!(all.contains(needle), "missing '{}' in:\n{}", needle, all);
    }
    Ok(())
}

#[test]
fn test_missing_file_has_context() {
    let err = load_pipeline_config("/definitely/not/here.yml").unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read configuration file"));
}

#[test]
fn test_unknown_transformation_type_still_loads() -> Result<()> {
    let yaml = r#"
pipeline: { pipeline_name: lenient }
mappings:
  - mapping:
      mapping_name: copy
      from:
        store: { type: file, path: ./in }
        entity: { include: [a] }
      to:
        store: { type: file, path: ./out }
      transformations:
        - type: cleanup
        - type: deduplicate
          columns: [id]
"#;
    let config = parse_pipeline_config(yaml)?;
    let transformations = &config.mappings[0].transformations;
    assert_eq!(transformations.len(), 2);
    assert_eq!(
        transformations[1],
        TransformationConfig::Unknown("deduplicate".to_string())
    );

    let report = validate(&config);
    assert!(report.is_valid(), "{:?}", report.errors);
    assert!(report.warnings.iter().any(|w| w.contains("deduplicate")));
    Ok(())
}
