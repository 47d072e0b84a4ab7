//! Document reads and writes on a single connection.

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{DocumentRecord, Metadata, Result};

use super::CollectionSql;

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn decode(path: String, metadata: String) -> Result<DocumentRecord> {
    let metadata: Metadata = serde_json::from_str(&metadata)
        .with_context(|| format!("decode metadata for {path}"))?;
    Ok(DocumentRecord { path, metadata })
}

pub(crate) fn upsert_document(
    conn: &Connection,
    sql: &CollectionSql,
    record: &DocumentRecord,
) -> Result<()> {
    let metadata = serde_json::to_string(&record.metadata).context("encode metadata")?;
    let mut stmt = conn.prepare_cached(&sql.upsert).context("prepare upsert")?;
    stmt.execute((record.path.as_str(), metadata.as_str()))
        .context("upsert document")?;
    Ok(())
}

pub(crate) fn delete_document(conn: &Connection, sql: &CollectionSql, path: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached(&sql.delete).context("prepare delete")?;
    let n = stmt.execute([path]).context("delete document")?;
    Ok(n > 0)
}

/// Delete the documents strictly below `dir` (a `/`-separated stored path).
pub(crate) fn delete_documents_under(
    conn: &Connection,
    sql: &CollectionSql,
    dir: &str,
) -> Result<usize> {
    let prefix = if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    };
    let mut stmt = conn
        .prepare_cached(&sql.delete_tree)
        .context("prepare delete tree")?;
    let n = stmt.execute([prefix.as_str()]).context("delete documents")?;
    Ok(n)
}

/// Load the document stored for `path`, if any.
pub fn find_document(
    conn: &Connection,
    collection: &str,
    path: &str,
) -> Result<Option<DocumentRecord>> {
    let sql = CollectionSql::new(collection);
    let row = conn
        .query_row(&sql.find, [path], row_to_record)
        .optional()
        .context("find document")?;
    row.map(|(p, m)| decode(p, m)).transpose()
}

pub fn count_documents(conn: &Connection, collection: &str) -> Result<usize> {
    let sql = CollectionSql::new(collection);
    let n: i64 = conn
        .query_row(&sql.count, [], |row| row.get(0))
        .context("count documents")?;
    Ok(n.max(0) as usize)
}

/// All documents whose metadata field `field` equals `value`, ordered by path.
pub fn find_by_field(
    conn: &Connection,
    collection: &str,
    field: &str,
    value: &str,
) -> Result<Vec<DocumentRecord>> {
    if field.contains('"') {
        anyhow::bail!("field name must not contain '\"': {field}");
    }
    let sql = CollectionSql::new(collection);
    let json_path = format!("$.\"{field}\"");
    let mut stmt = conn.prepare(&sql.find_by_field).context("prepare query")?;
    let rows = stmt.query_map((json_path.as_str(), value), row_to_record)?;
    let mut out = Vec::new();
    for row in rows {
        let (p, m) = row?;
        out.push(decode(p, m)?);
    }
    Ok(out)
}
