use crate::{
    DocumentStore, Filter, ReplaceOutcome, StoreError, ensure_object, validate_collection,
    validate_field,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Documents kept in a SQLite database, one table per collection.
///
/// A table holds the JSON text of each document in insertion order. Filters
/// are pushed down as `json_extract` comparisons, which use an index when one
/// was created for the field, and every candidate row is then checked against
/// the filter itself.
///
/// Every operation runs as a single statement or transaction, so a write that
/// is interrupted leaves the collection as it was before.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")?;
        tracing::info!(path = %path.display(), "Opened SQLite document store");

        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        SqliteDocumentStore {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `op` on the blocking pool with exclusive use of the connection.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || op(&mut conn.lock())).await?
    }
}

fn table_name(collection: &str) -> String {
    format!("doc_{collection}")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `json_extract` over the document body for a top-level field. Index
/// definitions and queries must render the same text for the index to apply.
fn extract_expr(field: &str) -> String {
    let path = format!("$.\"{field}\"").replace('\'', "''");
    format!("json_extract(body, '{path}')")
}

fn table_exists(conn: &Connection, collection: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name(collection)],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn ensure_table(conn: &Connection, collection: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (seq INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL)",
        quote_ident(&table_name(collection))
    ))?;
    Ok(())
}

/// SQL condition narrowing rows to candidates for `filter`, with its bound values.
fn where_clause(filter: &Filter) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    for (field, expected) in filter.fields() {
        if validate_field(field).is_err() {
            continue;
        }
        let expr = extract_expr(field);
        let bound = match expected {
            Value::Null => {
                conditions.push(format!("{expr} IS NULL"));
                continue;
            }
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => SqlValue::Integer(i),
                (None, Some(f)) => SqlValue::Real(f),
                (None, None) => continue,
            },
            // Compared in full against the decoded document.
            Value::Array(_) | Value::Object(_) => continue,
        };
        conditions.push(format!("{expr} = ?"));
        values.push(bound);
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

/// First matching document in insertion order, with its row id.
fn find_first(
    conn: &Connection,
    collection: &str,
    filter: &Filter,
) -> Result<Option<(i64, Value)>, StoreError> {
    let (clause, values) = where_clause(filter);
    let mut stmt = conn.prepare(&format!(
        "SELECT seq, body FROM {}{clause} ORDER BY seq",
        quote_ident(&table_name(collection))
    ))?;
    let mut rows = stmt.query(params_from_iter(values))?;

    while let Some(row) = rows.next()? {
        let body: String = row.get(1)?;
        let document: Value = serde_json::from_str(&body)?;
        if filter.matches(&document) {
            return Ok(Some((row.get(0)?, document)));
        }
    }
    Ok(None)
}

fn insert(conn: &Connection, collection: &str, document: &Value) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO {} (body) VALUES (?1)",
            quote_ident(&table_name(collection))
        ),
        params![serde_json::to_string(document)?],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();
        let filter = filter.clone();

        self.run(move |conn| {
            if !table_exists(conn, &collection)? {
                return Ok(None);
            }
            Ok(find_first(conn, &collection, &filter)?.map(|(_, document)| document))
        })
        .await
    }

    async fn insert_one(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        validate_collection(collection)?;
        ensure_object(&document)?;
        let collection = collection.to_string();

        self.run(move |conn| {
            ensure_table(conn, &collection)?;
            insert(conn, &collection, &document)
        })
        .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Value,
        upsert: bool,
    ) -> Result<ReplaceOutcome, StoreError> {
        validate_collection(collection)?;
        ensure_object(&document)?;
        let collection = collection.to_string();
        let filter = filter.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            ensure_table(&tx, &collection)?;

            let outcome = match find_first(&tx, &collection, &filter)? {
                Some((seq, _)) => {
                    tx.execute(
                        &format!(
                            "UPDATE {} SET body = ?1 WHERE seq = ?2",
                            quote_ident(&table_name(&collection))
                        ),
                        params![serde_json::to_string(&document)?, seq],
                    )?;
                    ReplaceOutcome::Replaced
                }
                None if upsert => {
                    insert(&tx, &collection, &document)?;
                    ReplaceOutcome::Inserted
                }
                None => ReplaceOutcome::NotFound,
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn clear_collection(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();

        self.run(move |conn| {
            if table_exists(conn, &collection)? {
                let removed = conn.execute(
                    &format!("DELETE FROM {}", quote_ident(&table_name(&collection))),
                    [],
                )?;
                tracing::info!(%collection, removed, "Cleared collection");
            }
            Ok(())
        })
        .await
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();

        self.run(move |conn| {
            conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {}",
                quote_ident(&table_name(&collection))
            ))?;
            tracing::info!(%collection, "Dropped collection");
            Ok(())
        })
        .await
    }

    async fn create_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        validate_field(field)?;
        let collection = collection.to_string();
        let field = field.to_string();

        self.run(move |conn| {
            ensure_table(conn, &collection)?;
            let table = table_name(&collection);
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("{table}_{field}")),
                quote_ident(&table),
                extract_expr(&field)
            ))?;
            Ok(())
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        validate_collection(collection)?;
        let collection = collection.to_string();

        self.run(move |conn| {
            if !table_exists(conn, &collection)? {
                return Ok(0);
            }
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {}",
                    quote_ident(&table_name(&collection))
                ),
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}
