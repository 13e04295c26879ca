//! Join Catalog - persisted record of accepted joins
//!
//! One row per directional column pair
//! `(left source, left table, left column, right source, right table, right column)`.
//! Re-saving a pair increments `usage_count` in a single upsert statement, so
//! concurrent writers never lose an increment.
//!
//! Architecture: SQLite (bundled) behind a `Mutex<Connection>`

use crate::error::{AdvisorError, Result};
use crate::join_suggester::{JoinSuggestion, JoinType};
use crate::schema::TableDescriptor;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

pub const CATALOG_DB_FILE: &str = "join_catalog.db";

/// A join the caller wants recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinDefinition {
    pub left_data_source_id: i64,
    pub left_schema: String,
    pub left_table: String,
    pub left_column: String,
    pub right_data_source_id: i64,
    pub right_schema: String,
    pub right_table: String,
    pub right_column: String,
    pub join_type: JoinType,

    /// Confidence at acceptance time (0-100); hand-written joins use 100
    pub confidence: u8,

    pub created_by_user_id: i64,
}

impl JoinDefinition {
    /// Turn an accepted suggestion into a catalog write
    pub fn from_suggestion(
        suggestion: &JoinSuggestion,
        left: &TableDescriptor,
        right: &TableDescriptor,
        created_by_user_id: i64,
    ) -> Self {
        Self {
            left_data_source_id: left.data_source_id,
            left_schema: left.schema.clone(),
            left_table: suggestion.left_table.clone(),
            left_column: suggestion.left_column.clone(),
            right_data_source_id: right.data_source_id,
            right_schema: right.schema.clone(),
            right_table: suggestion.right_table.clone(),
            right_column: suggestion.right_column.clone(),
            join_type: suggestion.suggested_join_type,
            confidence: suggestion.confidence,
            created_by_user_id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("left_table", &self.left_table),
            ("left_column", &self.left_column),
            ("right_table", &self.right_table),
            ("right_column", &self.right_column),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AdvisorError::InvalidInput(format!("{} must not be empty", field)));
            }
        }
        if self.confidence > 100 {
            return Err(AdvisorError::InvalidInput(format!(
                "confidence must be within 0-100, got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A persisted catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCatalogEntry {
    pub id: i64,
    pub left_data_source_id: i64,
    pub left_schema: String,
    pub left_table: String,
    pub left_column: String,
    pub right_data_source_id: i64,
    pub right_schema: String,
    pub right_table: String,
    pub right_column: String,
    pub join_type: JoinType,
    pub confidence: u8,

    /// Times this exact directional pair was saved; never decreases
    pub usage_count: u32,

    pub created_by_user_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl JoinCatalogEntry {
    /// Same join seen from the other side: sides swapped, LEFT and RIGHT exchanged
    pub fn reversed(&self) -> Self {
        let join_type = match self.join_type {
            JoinType::Left => JoinType::Right,
            JoinType::Right => JoinType::Left,
            other => other,
        };

        Self {
            left_data_source_id: self.right_data_source_id,
            left_schema: self.right_schema.clone(),
            left_table: self.right_table.clone(),
            left_column: self.right_column.clone(),
            right_data_source_id: self.left_data_source_id,
            right_schema: self.left_schema.clone(),
            right_table: self.left_table.clone(),
            right_column: self.left_column.clone(),
            join_type,
            ..self.clone()
        }
    }

    /// Reverse the entry unless its left side already is `(data_source_id, table)`
    pub fn oriented_to(self, data_source_id: i64, table: &str) -> Self {
        if self.left_data_source_id == data_source_id && self.left_table == table {
            self
        } else {
            self.reversed()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    /// >= 90 high, 70-89 medium, below 70 low
    pub fn from_confidence(confidence: u8) -> Self {
        match confidence {
            90..=u8::MAX => ConfidenceBand::High,
            70..=89 => ConfidenceBand::Medium,
            _ => ConfidenceBand::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Statistics about the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_joins: u32,
    pub total_usage: u64,

    /// Joins touching each schema (an entry counts once per distinct schema it spans)
    pub by_schema: BTreeMap<String, u32>,

    pub by_confidence: ConfidenceBreakdown,
}

/// Storage seam for the join catalog
pub trait JoinCatalogStore: Send + Sync {
    /// Insert the directional pair with `usage_count = 1`, or increment it if present
    fn record_join(&self, join: &JoinDefinition) -> Result<JoinCatalogEntry>;

    /// Entries between two data sources in either direction, most used first
    fn popular_joins(
        &self,
        left_data_source_id: i64,
        right_data_source_id: i64,
        limit: usize,
    ) -> Result<Vec<JoinCatalogEntry>>;

    /// Entries between two exact tables in either direction, most used first
    fn joins_between_tables(
        &self,
        left_data_source_id: i64,
        left_table: &str,
        right_data_source_id: i64,
        right_table: &str,
        limit: usize,
    ) -> Result<Vec<JoinCatalogEntry>>;

    fn stats(&self) -> Result<CatalogStats>;
}

const ENTRY_COLUMNS: &str = "id, left_data_source_id, left_schema, left_table, left_column, \
     right_data_source_id, right_schema, right_table, right_column, \
     join_type, confidence, usage_count, created_by_user_id, created_at, updated_at";

const POPULARITY_ORDER: &str = "ORDER BY usage_count DESC, created_at DESC, id DESC";

/// SQLite-backed join catalog
pub struct SqliteJoinCatalog {
    path: Option<PathBuf>,
    db: Mutex<Connection>,
}

impl SqliteJoinCatalog {
    /// Open (or create) `join_catalog.db` inside `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let db_path = dir.join(CATALOG_DB_FILE);
        let db = Connection::open(&db_path).map_err(|e| {
            AdvisorError::Catalog(format!("Failed to open {}: {}", db_path.display(), e))
        })?;
        db.busy_timeout(Duration::from_secs(5))?;

        let catalog = Self {
            path: Some(db_path),
            db: Mutex::new(db),
        };
        catalog.init_schema()?;

        info!("Opened join catalog at {}", dir.display());
        Ok(catalog)
    }

    /// Catalog that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        let catalog = Self {
            path: None,
            db: Mutex::new(db),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| AdvisorError::Catalog("catalog connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.conn()?;

        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS join_catalog (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                left_data_source_id INTEGER NOT NULL,
                left_schema TEXT NOT NULL,
                left_table TEXT NOT NULL,
                left_column TEXT NOT NULL,
                right_data_source_id INTEGER NOT NULL,
                right_schema TEXT NOT NULL,
                right_table TEXT NOT NULL,
                right_column TEXT NOT NULL,
                join_type TEXT NOT NULL,
                confidence INTEGER NOT NULL DEFAULT 100,
                usage_count INTEGER NOT NULL DEFAULT 1,
                created_by_user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(left_data_source_id, left_table, left_column,
                       right_data_source_id, right_table, right_column)
            );
            CREATE INDEX IF NOT EXISTS idx_join_catalog_sources
                ON join_catalog(left_data_source_id, right_data_source_id);
            CREATE INDEX IF NOT EXISTS idx_join_catalog_tables
                ON join_catalog(left_table, right_table);
            "#,
        )
        .map_err(|e| AdvisorError::Catalog(format!("Failed to create join_catalog: {}", e)))?;

        Ok(())
    }

    fn query_entries(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<JoinCatalogEntry>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map(params, entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<JoinCatalogEntry> {
    let join_type: String = row.get(9)?;
    let join_type = join_type
        .parse::<JoinType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(JoinCatalogEntry {
        id: row.get(0)?,
        left_data_source_id: row.get(1)?,
        left_schema: row.get(2)?,
        left_table: row.get(3)?,
        left_column: row.get(4)?,
        right_data_source_id: row.get(5)?,
        right_schema: row.get(6)?,
        right_table: row.get(7)?,
        right_column: row.get(8)?,
        join_type,
        confidence: row.get(10)?,
        usage_count: row.get(11)?,
        created_by_user_id: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl JoinCatalogStore for SqliteJoinCatalog {
    fn record_join(&self, join: &JoinDefinition) -> Result<JoinCatalogEntry> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            r#"
            INSERT INTO join_catalog
                (left_data_source_id, left_schema, left_table, left_column,
                 right_data_source_id, right_schema, right_table, right_column,
                 join_type, confidence, usage_count, created_by_user_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12, ?12)
            ON CONFLICT(left_data_source_id, left_table, left_column,
                        right_data_source_id, right_table, right_column)
            DO UPDATE SET usage_count = usage_count + 1, updated_at = excluded.updated_at
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        let db = self.conn()?;
        let entry = db
            .query_row(
                &sql,
                params![
                    join.left_data_source_id,
                    join.left_schema,
                    join.left_table,
                    join.left_column,
                    join.right_data_source_id,
                    join.right_schema,
                    join.right_table,
                    join.right_column,
                    join.join_type.as_str(),
                    join.confidence,
                    join.created_by_user_id,
                    now,
                ],
                entry_from_row,
            )
            .map_err(|e| AdvisorError::Catalog(format!("Failed to record join: {}", e)))?;

        debug!("Catalog row {} now at usage_count {}", entry.id, entry.usage_count);
        Ok(entry)
    }

    fn popular_joins(
        &self,
        left_data_source_id: i64,
        right_data_source_id: i64,
        limit: usize,
    ) -> Result<Vec<JoinCatalogEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM join_catalog
            WHERE (left_data_source_id = ?1 AND right_data_source_id = ?2)
               OR (left_data_source_id = ?2 AND right_data_source_id = ?1)
            {}
            LIMIT ?3
            "#,
            ENTRY_COLUMNS, POPULARITY_ORDER
        );

        self.query_entries(
            &sql,
            params![left_data_source_id, right_data_source_id, limit_param(limit)],
        )
    }

    fn joins_between_tables(
        &self,
        left_data_source_id: i64,
        left_table: &str,
        right_data_source_id: i64,
        right_table: &str,
        limit: usize,
    ) -> Result<Vec<JoinCatalogEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM join_catalog
            WHERE (left_data_source_id = ?1 AND left_table = ?2
                   AND right_data_source_id = ?3 AND right_table = ?4)
               OR (left_data_source_id = ?3 AND left_table = ?4
                   AND right_data_source_id = ?1 AND right_table = ?2)
            {}
            LIMIT ?5
            "#,
            ENTRY_COLUMNS, POPULARITY_ORDER
        );

        self.query_entries(
            &sql,
            params![
                left_data_source_id,
                left_table,
                right_data_source_id,
                right_table,
                limit_param(limit)
            ],
        )
    }

    fn stats(&self) -> Result<CatalogStats> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT left_schema, right_schema, confidence, usage_count FROM join_catalog",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;

        let mut stats = CatalogStats::default();
        for row in rows {
            let (left_schema, right_schema, confidence, usage_count) = row?;

            stats.total_joins += 1;
            stats.total_usage += u64::from(usage_count);

            *stats.by_schema.entry(left_schema.clone()).or_insert(0) += 1;
            if right_schema != left_schema {
                *stats.by_schema.entry(right_schema).or_insert(0) += 1;
            }

            match ConfidenceBand::from_confidence(confidence) {
                ConfidenceBand::High => stats.by_confidence.high += 1,
                ConfidenceBand::Medium => stats.by_confidence.medium += 1,
                ConfidenceBand::Low => stats.by_confidence.low += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(left: (i64, &str, &str), right: (i64, &str, &str)) -> JoinDefinition {
        JoinDefinition {
            left_data_source_id: left.0,
            left_schema: "public".to_string(),
            left_table: left.1.to_string(),
            left_column: left.2.to_string(),
            right_data_source_id: right.0,
            right_schema: "public".to_string(),
            right_table: right.1.to_string(),
            right_column: right.2.to_string(),
            join_type: JoinType::Inner,
            confidence: 100,
            created_by_user_id: 7,
        }
    }

    #[test]
    fn test_repeat_save_increments_single_row() {
        let catalog = SqliteJoinCatalog::in_memory().unwrap();
        let def = join((1, "orders", "customer_id"), (2, "customers", "id"));

        let first = catalog.record_join(&def).unwrap();
        let second = catalog.record_join(&def).unwrap();

        assert_eq!(first.usage_count, 1);
        assert_eq!(second.usage_count, 2);
        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(catalog.stats().unwrap().total_joins, 1);
    }

    #[test]
    fn test_direction_is_part_of_the_key() {
        let catalog = SqliteJoinCatalog::in_memory().unwrap();
        let forward = join((1, "orders", "customer_id"), (2, "customers", "id"));
        let backward = join((2, "customers", "id"), (1, "orders", "customer_id"));

        catalog.record_join(&forward).unwrap();
        let reverse_entry = catalog.record_join(&backward).unwrap();

        assert_eq!(reverse_entry.usage_count, 1);
        assert_eq!(catalog.stats().unwrap().total_joins, 2);
    }

    #[test]
    fn test_popular_joins_both_directions_and_ordering() {
        let catalog = SqliteJoinCatalog::in_memory().unwrap();
        let a_to_b = join((1, "orders", "customer_id"), (2, "customers", "id"));
        let b_to_a = join((2, "accounts", "id"), (1, "invoices", "account_id"));
        let unrelated = join((3, "events", "user_id"), (4, "users", "id"));

        catalog.record_join(&a_to_b).unwrap();
        for _ in 0..3 {
            catalog.record_join(&b_to_a).unwrap();
        }
        catalog.record_join(&unrelated).unwrap();

        let popular = catalog.popular_joins(1, 2, 10).unwrap();
        assert_eq!(popular.len(), 2);
        assert_eq!(popular[0].left_table, "accounts");
        assert_eq!(popular[0].usage_count, 3);
        assert_eq!(popular[1].left_table, "orders");

        let limited = catalog.popular_joins(2, 1, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].left_table, "accounts");
    }

    #[test]
    fn test_joins_between_tables_is_exact() {
        let catalog = SqliteJoinCatalog::in_memory().unwrap();
        catalog
            .record_join(&join((1, "orders", "customer_id"), (2, "customers", "id")))
            .unwrap();
        catalog
            .record_join(&join((1, "orders_archive", "customer_id"), (2, "customers", "id")))
            .unwrap();

        let found = catalog.joins_between_tables(2, "customers", 1, "orders", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].left_table, "orders");

        assert!(catalog.joins_between_tables(1, "order", 2, "customers", 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats_by_schema_and_confidence() {
        let catalog = SqliteJoinCatalog::in_memory().unwrap();

        let mut high = join((1, "orders", "customer_id"), (2, "customers", "id"));
        high.right_schema = "crm".to_string();
        let mut medium = join((1, "orders", "region"), (1, "regions", "name"));
        medium.confidence = 75;
        let mut low = join((1, "events", "ref"), (1, "refs", "code"));
        low.confidence = 62;

        catalog.record_join(&high).unwrap();
        catalog.record_join(&high).unwrap();
        catalog.record_join(&medium).unwrap();
        catalog.record_join(&low).unwrap();

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.total_joins, 3);
        assert_eq!(stats.total_usage, 4);
        assert_eq!(stats.by_schema.get("public"), Some(&3));
        assert_eq!(stats.by_schema.get("crm"), Some(&1));
        assert_eq!(
            stats.by_confidence,
            ConfidenceBreakdown { high: 1, medium: 1, low: 1 }
        );
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(ConfidenceBand::from_confidence(100), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_confidence(90), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_confidence(89), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_confidence(70), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_confidence(69), ConfidenceBand::Low);
    }

    #[test]
    fn test_reversed_swaps_sides_and_outer_direction() {
        let catalog = SqliteJoinCatalog::in_memory().unwrap();
        let mut def = join((1, "orders", "customer_id"), (2, "customers", "id"));
        def.join_type = JoinType::Left;
        let entry = catalog.record_join(&def).unwrap();

        let flipped = entry.reversed();
        assert_eq!(flipped.left_table, "customers");
        assert_eq!(flipped.right_column, "customer_id");
        assert_eq!(flipped.join_type, JoinType::Right);
        assert_eq!(flipped.usage_count, entry.usage_count);
        assert_eq!(flipped.clone().oriented_to(2, "customers"), flipped);
    }

    #[test]
    fn test_validate_rejects_blank_columns() {
        let mut def = join((1, "orders", "customer_id"), (2, "customers", "id"));
        def.right_column = "  ".to_string();
        assert!(matches!(def.validate(), Err(AdvisorError::InvalidInput(_))));
    }
}
