//! Store abstraction
//!
//! A store reads and writes named entities (tables or files) as
//! [`Dataset`]s. Two variants exist:
//! - [`RelationalStore`]: tables in a SQL database
//! - [`FileStore`]: one file per entity under a path template
//!
//! Stores are built from a [`StoreConfig`] through a [`StoreFactory`] so the
//! engine can be handed test doubles.

mod file;
mod format;
mod relational;

pub use file::FileStore;
pub use relational::{RelationalStore, mask_credentials, resolve_connection_url};

use crate::config::{StoreConfig, StoreKind, WriteMode};
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::logger::Logger;

/// How a write combines incoming rows with what the target already holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub mode: WriteMode,
    /// Key columns for upsert modes
    pub merge_keys: Vec<String>,
}

impl WriteOptions {
    pub fn new(mode: WriteMode) -> Self {
        Self {
            mode,
            merge_keys: Vec::new(),
        }
    }

    pub fn with_merge_keys(mut self, keys: Vec<String>) -> Self {
        self.merge_keys = keys;
        self
    }

    /// Reject modes no store can carry out before any data is touched
    pub fn check(&self, store: StoreKind) -> Result<()> {
        match &self.mode {
            WriteMode::Overwrite | WriteMode::Append => Ok(()),
            WriteMode::Upsert | WriteMode::UpsertOnly if self.merge_keys.is_empty() => Err(
                FlowError::unsupported_mode(self.mode.as_str(), "merge_keys must be configured"),
            ),
            WriteMode::Upsert | WriteMode::UpsertOnly => Ok(()),
            WriteMode::AppendDelete => Err(FlowError::unsupported_mode(
                "append_delete",
                format!("not implemented by the {} store", store),
            )),
            WriteMode::Unknown(mode) => {
                Err(FlowError::unsupported_mode(mode.as_str(), "unknown write mode"))
            }
        }
    }
}

/// Rows to persist and the count to report for a write
#[derive(Debug)]
pub(crate) struct Combined {
    pub dataset: Dataset,
    pub rows_written: usize,
}

/// Combine `incoming` with the target's current contents according to the
/// write mode. `existing` is `None` when the target does not exist yet.
pub(crate) fn combine(
    existing: Option<Dataset>,
    incoming: &Dataset,
    options: &WriteOptions,
) -> Result<Combined> {
    let written = incoming.row_count();
    match (&options.mode, existing) {
        (WriteMode::Overwrite, _) | (WriteMode::Append, None) => Ok(Combined {
            dataset: incoming.clone(),
            rows_written: written,
        }),
        (WriteMode::Append, Some(existing)) => Ok(Combined {
            dataset: existing.concat(incoming),
            rows_written: written,
        }),
        (WriteMode::Upsert, None) => {
            check_keys(incoming, &options.merge_keys, &options.mode)?;
            Ok(Combined {
                dataset: incoming.clone(),
                rows_written: written,
            })
        }
        // Nothing to update yet; keep the schema, drop the rows
        (WriteMode::UpsertOnly, None) => {
            check_keys(incoming, &options.merge_keys, &options.mode)?;
            Ok(Combined {
                dataset: incoming.retain_rows(&vec![false; incoming.row_count()]),
                rows_written: 0,
            })
        }
        (mode @ (WriteMode::Upsert | WriteMode::UpsertOnly), Some(existing)) => {
            check_keys(incoming, &options.merge_keys, mode)?;
            if !existing.is_empty() {
                check_keys(&existing, &options.merge_keys, mode)?;
            }
            let insert_new = *mode == WriteMode::Upsert;
            let outcome = existing.merge(incoming, &options.merge_keys, insert_new)?;
            Ok(Combined {
                dataset: outcome.dataset,
                rows_written: outcome.updated + outcome.inserted,
            })
        }
        (mode, _) => Err(FlowError::unsupported_mode(
            mode.as_str(),
            "cannot combine rows for this mode",
        )),
    }
}

fn check_keys(data: &Dataset, keys: &[String], mode: &WriteMode) -> Result<()> {
    match keys.iter().find(|key| !data.has_column(key)) {
        Some(missing) => Err(FlowError::unsupported_mode(
            mode.as_str(),
            format!("merge key '{}' is not a column of the data", missing),
        )),
        None => Ok(()),
    }
}

/// Uniform access to an entity-oriented data store
pub trait Store: Send + Sync {
    /// Variant of this store
    fn kind(&self) -> StoreKind;

    /// Read an entity; `Ok(None)` when it does not exist or holds no rows
    fn read_entity(&self, entity: &str) -> Result<Option<Dataset>>;

    /// Write an entity, returning the number of rows written
    fn write_entity(&self, entity: &str, data: &Dataset, options: &WriteOptions) -> Result<usize>;

    /// Entity names currently present, sorted
    fn list_entities(&self) -> Result<Vec<String>>;

    fn entity_exists(&self, entity: &str) -> bool;

    /// Human readable location with credentials masked
    fn connection_descriptor(&self) -> String;
}

/// Builds stores from configuration
pub trait StoreFactory: Send + Sync {
    fn create(&self, config: &StoreConfig, logger: &Logger) -> Result<Box<dyn Store>>;
}

/// Factory that dispatches on the configured store type
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStoreFactory;

impl StoreFactory for DefaultStoreFactory {
    fn create(&self, config: &StoreConfig, logger: &Logger) -> Result<Box<dyn Store>> {
        create_store(config, logger)
    }
}

/// Construct the store variant named by `config.store.type`
pub fn create_store(config: &StoreConfig, logger: &Logger) -> Result<Box<dyn Store>> {
    let store: Box<dyn Store> = match config.kind()? {
        StoreKind::File => Box::new(FileStore::from_config(
            config,
            logger.scoped("dataflow::store::file"),
        )?),
        StoreKind::Relational => Box::new(RelationalStore::from_config(
            config,
            logger.scoped("dataflow::store::relational"),
        )?),
    };
    logger.debug(format!("Created store: {}", store.connection_descriptor()));
    Ok(store)
}
