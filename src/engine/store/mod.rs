//! Document store: a pool of SQLite connections holding one `{path, metadata}` document per
//! indexed file, keyed by a unique index on `path`.

mod documents;
mod pool;

pub use documents::{count_documents, find_by_field, find_document};
pub use pool::{PooledConnection, StoragePool};

use crate::{DocumentRecord, Result};

/// Write side of the index used by indexing tasks.
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the document for `record.path`.
    fn upsert(&self, record: &DocumentRecord) -> Result<()>;

    /// Remove the document for `path`. Returns whether one existed; absent paths are not an error.
    fn delete(&self, path: &str) -> Result<bool>;

    /// Remove every document stored under the directory `dir`. Returns how many were removed.
    fn delete_tree(&self, dir: &str) -> Result<usize>;
}

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// SQL text for one collection. The collection name is validated by
/// [`is_valid_collection_name`](crate::utils::config::is_valid_collection_name) before it gets here
/// and is always quoted, so keywords such as `order` are usable.
#[derive(Clone, Debug)]
pub(crate) struct CollectionSql {
    pub schema: String,
    pub drop: String,
    pub upsert: String,
    pub delete: String,
    pub delete_tree: String,
    pub find: String,
    pub count: String,
    pub find_by_field: String,
}

impl CollectionSql {
    pub fn new(collection: &str) -> Self {
        let c = collection;
        CollectionSql {
            schema: format!(
                r#"
CREATE TABLE IF NOT EXISTS "{c}" (
    path TEXT NOT NULL,
    metadata TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS "idx_{c}_path" ON "{c}"(path);
"#
            ),
            drop: format!(r#"DROP TABLE IF EXISTS "{c}""#),
            upsert: format!(
                r#"INSERT INTO "{c}" (path, metadata) VALUES (?1, ?2)
                   ON CONFLICT(path) DO UPDATE SET metadata = excluded.metadata"#
            ),
            delete: format!(r#"DELETE FROM "{c}" WHERE path = ?1"#),
            // substr rather than LIKE: '%' and '_' are legal in file names.
            delete_tree: format!(
                r#"DELETE FROM "{c}" WHERE substr(path, 1, length(?1)) = ?1"#
            ),
            find: format!(r#"SELECT path, metadata FROM "{c}" WHERE path = ?1"#),
            count: format!(r#"SELECT COUNT(*) FROM "{c}""#),
            find_by_field: format!(
                r#"SELECT path, metadata FROM "{c}" WHERE json_extract(metadata, ?1) = ?2 ORDER BY path"#
            ),
        }
    }
}
