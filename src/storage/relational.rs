//! Relational store over SQLite
//!
//! The connection URL is resolved from configuration and environment; only
//! `sqlite:` URLs have a driver in this build. Each table is one entity.

use super::format::exceeds_i64;
use super::{Store, WriteOptions, combine};
use crate::config::{StoreConfig, StoreKind, StoreSettings, WriteMode};
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::logger::Logger;
use base64::Engine;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Transaction};
use serde_json::{Number, Value};
use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard};

/// Pick the connection URL: explicit URL, then `PG*` variables, then
/// `DATABASE_URL`, then the individual connection fields
pub fn resolve_connection_url(
    settings: &StoreSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    if let Some(url) = settings
        .connection_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
    {
        return Ok(url.to_string());
    }

    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let (Some(host), Some(database), Some(user), Some(password)) = (
        var("PGHOST"),
        var("PGDATABASE"),
        var("PGUSER"),
        var("PGPASSWORD"),
    ) {
        let port = var("PGPORT").unwrap_or_else(|| "5432".to_string());
        return Ok(format!(
            "postgresql://{}:{}@{}:{}/{}",
            user, password, host, port, database
        ));
    }

    if let Some(url) = var("DATABASE_URL") {
        return Ok(url);
    }

    let db_type = settings
        .db_type
        .as_deref()
        .unwrap_or("postgresql")
        .to_lowercase();
    let database = settings.db_name.as_deref().filter(|d| !d.is_empty());

    if matches!(db_type.as_str(), "sqlite" | "sqlite3") {
        let database = database
            .ok_or_else(|| FlowError::Config("SQLite store requires 'db_name'".into()))?;
        return Ok(format!("sqlite:{}", database));
    }

    let (Some(database), Some(user), Some(password)) = (
        database,
        settings.username.as_deref(),
        settings.password.as_deref(),
    ) else {
        return Err(FlowError::Config(
            "Insufficient database connection parameters: set connection_url, PG* or DATABASE_URL, or db_name/username/password".into(),
        ));
    };

    let host = settings.host.as_deref().unwrap_or("localhost");
    let (scheme, default_port) = match db_type.as_str() {
        "postgresql" | "postgres" => ("postgresql", "5432"),
        "mysql" => ("mysql", "3306"),
        other => {
            return Err(FlowError::Config(format!(
                "Unsupported database type: {}",
                other
            )));
        }
    };
    let port = settings.port.as_deref().unwrap_or(default_port);
    Ok(format!(
        "{}://{}:{}@{}:{}/{}",
        scheme, user, password, host, port, database
    ))
}

/// Replace the password in a URL with `***`
pub fn mask_credentials(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("***")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}

/// Database file named by a `sqlite:` URL
fn sqlite_target(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite3:")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    Some(rest.strip_prefix("//").unwrap_or(rest))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Tables in a SQL database, one entity per table
pub struct RelationalStore {
    conn: Mutex<Connection>,
    descriptor: String,
    logger: Logger,
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl RelationalStore {
    /// Resolve the URL against the process environment and connect
    pub fn from_config(config: &StoreConfig, logger: Logger) -> Result<Self> {
        let url = resolve_connection_url(&config.store, |name| std::env::var(name).ok())
            .inspect_err(|e| logger.error(e))?;
        Self::connect(&url, logger)
    }

    /// Open and verify a connection with `SELECT 1`
    pub fn connect(url: &str, logger: Logger) -> Result<Self> {
        let descriptor = mask_credentials(url);
        logger.info(format!("Connecting to database: {}", descriptor));

        let conn = Self::open(url).inspect_err(|e| {
            logger.error(format!("Failed to establish database connection: {}", e));
        })?;

        logger.info("Database connection established successfully");
        Ok(Self {
            conn: Mutex::new(conn),
            descriptor,
            logger,
        })
    }

    fn open(url: &str) -> Result<Connection> {
        let Some(target) = sqlite_target(url) else {
            let scheme = url.split_once(':').map(|(scheme, _)| scheme).ok_or_else(|| {
                FlowError::Config(format!("Invalid connection URL: {}", mask_credentials(url)))
            })?;
            return Err(FlowError::Connection(format!(
                "No driver available for '{}' connections; only sqlite is supported",
                scheme
            )));
        };

        let conn = if target.is_empty() || target == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(target)?
        };
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FlowError::Connection("Database connection lock poisoned".into()))
    }

    fn write_inner(&self, entity: &str, data: &Dataset, options: &WriteOptions) -> Result<usize> {
        options.check(StoreKind::Relational)?;
        let mut conn = self.lock()?;
        let exists = table_exists(&conn, entity)?;

        let (rows, replace, written): (Cow<'_, Dataset>, bool, usize) = match options.mode {
            WriteMode::Overwrite => (Cow::Borrowed(data), true, data.row_count()),
            WriteMode::Append => (Cow::Borrowed(data), !exists, data.row_count()),
            _ => {
                let existing = if exists {
                    Some(read_table(&conn, entity)?)
                } else {
                    None
                };
                let combined = combine(existing, data, options)?;
                (Cow::Owned(combined.dataset), true, combined.rows_written)
            }
        };

        let tx = conn.transaction()?;
        if replace {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(entity)), [])?;
            create_table(&tx, entity, &rows)?;
        } else {
            add_missing_columns(&tx, entity, &rows)?;
        }
        insert_rows(&tx, entity, &rows)?;
        tx.commit()?;

        self.logger.info(format!(
            "Wrote {} rows to table {} (mode: {})",
            written, entity, options.mode
        ));
        Ok(written)
    }
}

impl Store for RelationalStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    fn read_entity(&self, entity: &str) -> Result<Option<Dataset>> {
        self.logger.debug(format!("Reading table: {}", entity));
        let result = self.lock().and_then(|conn| {
            if !table_exists(&conn, entity)? {
                return Ok(None);
            }
            read_table(&conn, entity).map(Some)
        });

        match result {
            Ok(Some(data)) if !data.is_empty() => {
                self.logger
                    .info(format!("Read {} rows from table: {}", data.row_count(), entity));
                Ok(Some(data))
            }
            Ok(_) => {
                self.logger
                    .debug(format!("Table {} is missing or empty", entity));
                Ok(None)
            }
            Err(e) => {
                self.logger
                    .error(format!("Database error reading table {}: {}", entity, e));
                Err(e)
            }
        }
    }

    fn write_entity(&self, entity: &str, data: &Dataset, options: &WriteOptions) -> Result<usize> {
        self.write_inner(entity, data, options).inspect_err(|e| {
            self.logger
                .error(format!("Database error writing to table {}: {}", entity, e));
        })
    }

    fn list_entities(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn entity_exists(&self, entity: &str) -> bool {
        match self.lock().and_then(|conn| table_exists(&conn, entity)) {
            Ok(exists) => exists,
            Err(e) => {
                self.logger
                    .error(format!("Error checking if table {} exists: {}", entity, e));
                false
            }
        }
    }

    fn connection_descriptor(&self) -> String {
        self.descriptor.clone()
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn read_table(conn: &Connection, name: &str) -> Result<Dataset> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(name)))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = names.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Dataset::from_rows(names, rows)
}

fn create_table(tx: &Transaction<'_>, name: &str, data: &Dataset) -> Result<()> {
    if data.column_count() == 0 {
        return Err(FlowError::Data(format!(
            "Cannot create table {} without columns",
            name
        )));
    }
    let columns = data
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(&c.values)))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!("CREATE TABLE {} ({})", quote_ident(name), columns),
        [],
    )?;
    Ok(())
}

fn add_missing_columns(tx: &Transaction<'_>, name: &str, data: &Dataset) -> Result<()> {
    let existing: Vec<String> = {
        let mut stmt = tx.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
        stmt.query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    for column in data.columns() {
        if !existing.contains(&column.name) {
            tx.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(name),
                    quote_ident(&column.name),
                    sql_type(&column.values)
                ),
                [],
            )?;
        }
    }
    Ok(())
}

fn insert_rows(tx: &Transaction<'_>, name: &str, data: &Dataset) -> Result<()> {
    if data.is_empty() || data.column_count() == 0 {
        return Ok(());
    }
    let columns = data
        .column_names()
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=data.column_count())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(name),
        columns,
        placeholders
    ))?;
    for row in data.rows() {
        stmt.execute(rusqlite::params_from_iter(row.into_iter().map(to_sql)))?;
    }
    Ok(())
}

fn sql_type(values: &[Value]) -> &'static str {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() || present.iter().any(|v| exceeds_i64(v)) {
        "TEXT"
    } else if present.iter().all(|v| v.is_i64() || v.is_boolean()) {
        "INTEGER"
    } else if present.iter().all(|v| v.is_number()) {
        "REAL"
    } else {
        "TEXT"
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) if n.is_u64() && !n.is_i64() => SqlValue::Text(n.to_string()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}
