//! Database catalog extraction
//!
//! Reads table and column metadata from DuckDB's information_schema once at
//! startup. The rendered catalog is the grounding context for SQL generation,
//! so produced queries reference real tables and columns.

use duckdb::{AccessMode, Config, Connection, Result as DuckResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCatalog {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCatalog {
    pub database_path: String,
    pub tables: Vec<TableCatalog>,
}

impl DatabaseCatalog {
    /// Extract catalog information from a DuckDB database.
    ///
    /// Opens its own read-only connection; runs once at startup, before any
    /// request path is live.
    pub fn from_database<P: AsRef<Path>>(db_path: P) -> DuckResult<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(&db_path, config)?;

        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<DuckResult<Vec<_>>>()?;

        let mut tables = Vec::new();
        for table_name in table_names {
            tables.push(Self::extract_table_info(&conn, &table_name)?);
        }

        Ok(DatabaseCatalog {
            database_path: path_str,
            tables,
        })
    }

    fn extract_table_info(conn: &Connection, table_name: &str) -> DuckResult<TableCatalog> {
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_name = ? \
             ORDER BY ordinal_position",
        )?;

        let columns: Vec<ColumnInfo> = stmt
            .query_map([table_name], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    is_nullable: row.get::<_, String>(2)? == "YES",
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;

        Ok(TableCatalog {
            name: table_name.to_string(),
            columns,
        })
    }

    /// Render the catalog as grounding context for the generation prompt.
    ///
    /// One line per table: `table_name(column TYPE, other_column TYPE NOT NULL)`.
    pub fn to_prompt_context(&self) -> String {
        let mut lines = Vec::with_capacity(self.tables.len());

        for table in &self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|col| {
                    if col.is_nullable {
                        format!("{} {}", col.name, col.data_type)
                    } else {
                        format!("{} {} NOT NULL", col.name, col.data_type)
                    }
                })
                .collect();

            lines.push(format!("{}({})", table.name, columns.join(", ")));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_db(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("askdb_catalog_test_{}.duckdb", name));
        std::fs::remove_file(&path).ok();

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE artists (id INTEGER NOT NULL, name VARCHAR);
             CREATE TABLE albums (id INTEGER NOT NULL, artist_id INTEGER, title VARCHAR);",
        )
        .unwrap();
        drop(conn);

        path
    }

    #[test]
    fn test_catalog_lists_tables_and_columns() {
        let path = fixture_db("introspect");

        let catalog = DatabaseCatalog::from_database(&path).unwrap();
        assert_eq!(catalog.tables.len(), 2);

        let artists = catalog
            .tables
            .iter()
            .find(|t| t.name == "artists")
            .unwrap();
        assert_eq!(artists.columns.len(), 2);
        assert_eq!(artists.columns[0].name, "id");
        assert!(!artists.columns[0].is_nullable);
        assert!(artists.columns[1].is_nullable);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_prompt_context_mentions_every_table() {
        let path = fixture_db("prompt");

        let catalog = DatabaseCatalog::from_database(&path).unwrap();
        let context = catalog.to_prompt_context();

        assert!(context.contains("artists("));
        assert!(context.contains("albums("));
        assert!(context.contains("id INTEGER NOT NULL"));
        assert!(context.contains("title VARCHAR"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_broken_database_path_fails() {
        let result = DatabaseCatalog::from_database("/nonexistent/askdb/missing.duckdb");
        assert!(result.is_err());
    }
}
