//! Execution of a single mapping
//!
//! For each configured entity the engine reads from the source store, runs
//! the transformation chain and writes to the target store. The first
//! entity that fails stops the mapping; entities already written stay
//! written.

use super::TransformChain;
use crate::config::{LoadType, MappingConfig};
use crate::error::{ErrorKind, FlowError};
use crate::logger::Logger;
use crate::storage::{DefaultStoreFactory, Store, StoreFactory, WriteOptions};
use log::Level;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where an entity got to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Pending,
    Extracted,
    Transformed,
    Loaded,
    /// Source had nothing to read; counts as success
    Skipped,
    Failed,
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Extracted => "extracted",
            Self::Transformed => "transformed",
            Self::Loaded => "loaded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Outcome for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReport {
    pub entity: String,
    pub state: EntityState,
    pub rows_read: usize,
    pub rows_written: usize,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl EntityReport {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            state: EntityState::Pending,
            rows_read: 0,
            rows_written: 0,
            error_kind: None,
            error: None,
        }
    }

    fn fail(mut self, error: &FlowError) -> Self {
        self.state = EntityState::Failed;
        self.error_kind = Some(error.kind());
        self.error = Some(error.to_string());
        self
    }

    pub fn failed(&self) -> bool {
        self.state == EntityState::Failed
    }
}

/// Outcome of one mapping execution
#[derive(Debug, Clone, PartialEq)]
pub struct MappingReport {
    pub mapping: String,
    pub success: bool,
    pub entities: Vec<EntityReport>,
    /// Kind of the failure that stopped the mapping
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl MappingReport {
    pub fn rows_written(&self) -> usize {
        self.entities.iter().map(|e| e.rows_written).sum()
    }

    pub fn failed_entity(&self) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.failed())
    }
}

/// Runs mappings against stores built by a [`StoreFactory`]
#[derive(Clone)]
pub struct Engine {
    factory: Arc<dyn StoreFactory>,
    logger: Logger,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine using the default store factory
    pub fn new(logger: Logger) -> Self {
        Self::with_factory(Arc::new(DefaultStoreFactory), logger)
    }

    pub fn with_factory(factory: Arc<dyn StoreFactory>, logger: Logger) -> Self {
        Self { factory, logger }
    }

    /// Execute one mapping; failures are reported, never returned
    pub fn execute_mapping(&self, mapping: &MappingConfig) -> MappingReport {
        let started = Instant::now();
        let mut report = MappingReport {
            mapping: mapping.name.clone(),
            success: false,
            entities: Vec::new(),
            error_kind: None,
            error: None,
            elapsed: Duration::ZERO,
        };

        self.logger.event(
            Level::Info,
            &format!("Executing mapping: {}", mapping.name),
            &[
                ("event_type", "mapping_start".to_string()),
                ("mapping", mapping.name.clone()),
                ("write_mode", mapping.write_mode.to_string()),
            ],
        );

        let entities = &mapping.source.entity.include;
        if entities.is_empty() {
            self.logger
                .warn(format!("No entities configured for mapping: {}", mapping.name));
            report.success = true;
            report.elapsed = started.elapsed();
            return report;
        }

        let stores = self
            .factory
            .create(&mapping.source, &self.logger)
            .and_then(|source| {
                let target = self.factory.create(&mapping.target, &self.logger)?;
                Ok((source, target))
            });
        let (source, target) = match stores {
            Ok(stores) => stores,
            Err(e) => {
                self.logger
                    .error(format!("Error executing mapping {}: {}", mapping.name, e));
                report.error_kind = Some(e.kind());
                report.error = Some(e.to_string());
                report.elapsed = started.elapsed();
                return report;
            }
        };

        let chain = TransformChain::from_configs(&mapping.transformations, &self.logger);
        let options = WriteOptions::new(mapping.write_mode.clone())
            .with_merge_keys(mapping.merge_keys.clone());

        report.success = true;
        for entity in entities {
            let entity_report = self.process_entity(
                entity,
                mapping,
                source.as_ref(),
                target.as_ref(),
                &chain,
                &options,
            );
            let failed = entity_report.failed();
            if failed {
                self.logger
                    .error(format!("Failed to process entity: {}", entity));
                report.success = false;
                report.error_kind = entity_report.error_kind;
                report.error = entity_report.error.clone();
            }
            report.entities.push(entity_report);
            if failed {
                break;
            }
        }

        report.elapsed = started.elapsed();
        self.logger.event(
            if report.success { Level::Info } else { Level::Error },
            &format!(
                "Mapping {}: {}",
                if report.success { "completed successfully" } else { "failed" },
                mapping.name
            ),
            &[
                ("event_type", "mapping_end".to_string()),
                ("mapping", mapping.name.clone()),
                ("rows_written", report.rows_written().to_string()),
                ("elapsed_ms", report.elapsed.as_millis().to_string()),
            ],
        );
        report
    }

    fn process_entity(
        &self,
        entity: &str,
        mapping: &MappingConfig,
        source: &dyn Store,
        target: &dyn Store,
        chain: &TransformChain,
        options: &WriteOptions,
    ) -> EntityReport {
        let mut report = EntityReport::new(entity);
        self.logger.event(
            Level::Info,
            &format!("Processing entity: {}", entity),
            &[
                ("event_type", "entity_start".to_string()),
                ("entity", entity.to_string()),
            ],
        );

        if mapping.load_type == LoadType::Incremental {
            self.logger.warn(format!(
                "Incremental load not yet implemented, using full load for {}",
                entity
            ));
        }

        let data = match source.read_entity(entity) {
            Ok(Some(data)) => data,
            Ok(None) => {
                self.logger
                    .warn(format!("No data extracted for entity: {}", entity));
                report.state = EntityState::Skipped;
                return report;
            }
            Err(e) => return report.fail(&e),
        };
        report.state = EntityState::Extracted;
        report.rows_read = data.row_count();
        self.logger
            .info(format!("Extracted {} rows for entity: {}", report.rows_read, entity));

        let transformed = chain.apply(data);
        report.state = EntityState::Transformed;

        match target.write_entity(entity, &transformed, options) {
            Ok(written) => {
                report.state = EntityState::Loaded;
                report.rows_written = written;
                self.logger.event(
                    Level::Info,
                    &format!("Successfully processed entity: {}", entity),
                    &[
                        ("event_type", "entity_end".to_string()),
                        ("entity", entity.to_string()),
                        ("rows_read", report.rows_read.to_string()),
                        ("rows_written", written.to_string()),
                    ],
                );
                report
            }
            Err(e) => report.fail(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, StoreKind, TransformationConfig, WriteMode};
    use crate::dataset::Dataset;
    use crate::error::Result;
    use crate::logger::CaptureSink;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store shared by source and target
    #[derive(Default)]
    struct MemoryStore {
        tables: Mutex<std::collections::HashMap<String, Dataset>>,
    }

    impl Store for Arc<MemoryStore> {
        fn kind(&self) -> StoreKind {
            StoreKind::File
        }

        fn read_entity(&self, entity: &str) -> Result<Option<Dataset>> {
            Ok(self.tables.lock().unwrap().get(entity).cloned())
        }

        fn write_entity(
            &self,
            entity: &str,
            data: &Dataset,
            options: &WriteOptions,
        ) -> Result<usize> {
            options.check(StoreKind::File)?;
            self.tables
                .lock()
                .unwrap()
                .insert(format!("out_{}", entity), data.clone());
            Ok(data.row_count())
        }

        fn list_entities(&self) -> Result<Vec<String>> {
            Ok(self.tables.lock().unwrap().keys().cloned().collect())
        }

        fn entity_exists(&self, entity: &str) -> bool {
            self.tables.lock().unwrap().contains_key(entity)
        }

        fn connection_descriptor(&self) -> String {
            "memory".into()
        }
    }

    struct MemoryFactory {
        store: Arc<MemoryStore>,
        created: AtomicUsize,
    }

    impl StoreFactory for MemoryFactory {
        fn create(&self, _config: &StoreConfig, _logger: &Logger) -> Result<Box<dyn Store>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(self.store.clone()))
        }
    }

    fn setup(tables: &[(&str, Dataset)]) -> (Engine, Arc<MemoryFactory>, Arc<CaptureSink>) {
        let store = Arc::new(MemoryStore::default());
        for (name, data) in tables {
            store
                .tables
                .lock()
                .unwrap()
                .insert(name.to_string(), data.clone());
        }
        let factory = Arc::new(MemoryFactory {
            store,
            created: AtomicUsize::new(0),
        });
        let sink = Arc::new(CaptureSink::new());
        let engine = Engine::with_factory(factory.clone(), Logger::new(sink.clone()));
        (engine, factory, sink)
    }

    fn mapping(entities: &[&str]) -> MappingConfig {
        MappingConfig::new(
            "copy",
            StoreConfig::file("./in", "csv").with_entities(entities),
            StoreConfig::file("./out", "csv"),
        )
    }

    fn ages() -> Dataset {
        Dataset::from_rows(
            vec!["age".into()],
            vec![vec![json!(17)], vec![json!(18)], vec![json!(25)]],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_entity_list_touches_no_store() {
        let (engine, factory, _) = setup(&[]);
        let report = engine.execute_mapping(&mapping(&[]));
        assert!(report.success);
        assert!(report.entities.is_empty());
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_entities_flow_through_chain() {
        let (engine, factory, _) = setup(&[("people", ages())]);
        let config = mapping(&["people"]).with_transformations(vec![TransformationConfig::Filter(
            crate::config::FilterConfig {
                conditions: vec![crate::config::FilterCondition::new(
                    "age",
                    "greater_equal",
                    json!(18),
                )],
            },
        )]);

        let report = engine.execute_mapping(&config);
        assert!(report.success);
        assert_eq!(report.entities[0].state, EntityState::Loaded);
        assert_eq!(report.entities[0].rows_read, 3);
        assert_eq!(report.rows_written(), 2);
        let written = factory.store.read_entity("out_people").unwrap().unwrap();
        assert_eq!(written.column("age").unwrap().values, vec![json!(18), json!(25)]);
    }

    #[test]
    fn test_incremental_load_reads_everything() {
        let (engine, factory, sink) = setup(&[("people", ages())]);
        let config = mapping(&["people"]).with_load_type(LoadType::Incremental);

        let report = engine.execute_mapping(&config);
        assert!(report.success);
        assert_eq!(report.entities[0].state, EntityState::Loaded);
        assert_eq!(report.entities[0].rows_read, 3);
        assert_eq!(report.rows_written(), 3);
        let written = factory.store.read_entity("out_people").unwrap().unwrap();
        assert_eq!(written, ages());
        assert!(sink.contains(
            log::Level::Warn,
            "Incremental load not yet implemented, using full load for people"
        ));
    }

    #[test]
    fn test_full_load_does_not_warn() {
        let (engine, _, sink) = setup(&[("people", ages())]);
        let report = engine.execute_mapping(&mapping(&["people"]));
        assert!(report.success);
        assert!(!sink.contains(log::Level::Warn, "Incremental load"));
    }

    #[test]
    fn test_absent_entity_is_skipped() {
        let (engine, _, sink) = setup(&[]);
        let report = engine.execute_mapping(&mapping(&["ghost"]));
        assert!(report.success);
        assert_eq!(report.entities[0].state, EntityState::Skipped);
        assert!(sink.contains(Level::Warn, "No data extracted for entity: ghost"));
    }

    #[test]
    fn test_unknown_write_mode_fails_fast() {
        let (engine, _, _) = setup(&[("a", ages()), ("b", ages())]);
        let config = mapping(&["a", "b"]).with_write_mode(WriteMode::from("merge"));

        let report = engine.execute_mapping(&config);
        assert!(!report.success);
        assert_eq!(report.error_kind, Some(ErrorKind::UnsupportedMode));
        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.failed_entity().unwrap().entity, "a");
        assert_eq!(report.entities[0].state, EntityState::Failed);
    }

    #[test]
    fn test_store_construction_failure() {
        let sink = Arc::new(CaptureSink::new());
        let engine = Engine::new(Logger::new(sink.clone()));
        let config = MappingConfig::new(
            "bad",
            StoreConfig::file("./in", "xlsx").with_entities(&["a"]),
            StoreConfig::file("./out", "csv"),
        );

        let report = engine.execute_mapping(&config);
        assert!(!report.success);
        assert_eq!(report.error_kind, Some(ErrorKind::UnsupportedFormat));
        assert!(sink.contains(Level::Error, "Error executing mapping bad"));
    }
}
