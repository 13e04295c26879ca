//! Schema introspection through `information_schema`
//!
//! The reference checks here fail closed: if the lookup itself errors, the table is
//! reported missing and every requested column is reported missing.

use crate::error::{AdvisorError, Result};
use crate::schema::TableDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Query-execution handle able to answer `information_schema` lookups
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Column names in ordinal order
    async fn column_names(&self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Column names and SQL types for one table
    async fn describe_table(
        &self,
        data_source_id: i64,
        schema: &str,
        table: &str,
    ) -> Result<TableDescriptor>;
}

/// Postgres-backed introspector
pub struct PgSchemaIntrospector {
    pool: PgPool,
}

impl PgSchemaIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| AdvisorError::Database(format!("Failed to connect: {}", e)))?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SchemaIntrospector for PgSchemaIntrospector {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn column_names(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    async fn describe_table(
        &self,
        data_source_id: i64,
        schema: &str,
        table: &str,
    ) -> Result<TableDescriptor> {
        let columns: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        if columns.is_empty() {
            return Err(AdvisorError::Introspection(format!(
                "Table {}.{} has no visible columns",
                schema, table
            )));
        }

        Ok(TableDescriptor::from_columns(data_source_id, schema, table, columns))
    }
}

/// Missing-column report for [`validate_column_references`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReferenceCheck {
    pub valid: bool,
    pub missing_columns: Vec<String>,
}

/// `true` only when the lookup succeeds and finds the table
pub async fn validate_table_reference(
    introspector: &dyn SchemaIntrospector,
    schema: &str,
    table: &str,
) -> bool {
    match introspector.table_exists(schema, table).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!("Table check for {}.{} failed, treating as missing: {}", schema, table, e);
            false
        }
    }
}

/// Which of `columns` are absent from `schema.table`; all of them when the lookup fails
pub async fn validate_column_references(
    introspector: &dyn SchemaIntrospector,
    schema: &str,
    table: &str,
    columns: &[String],
) -> ColumnReferenceCheck {
    let missing_columns: Vec<String> = match introspector.column_names(schema, table).await {
        Ok(existing) => {
            let existing: HashSet<String> = existing.into_iter().collect();
            columns
                .iter()
                .filter(|c| !existing.contains(c.as_str()))
                .cloned()
                .collect()
        }
        Err(e) => {
            warn!(
                "Column check for {}.{} failed, treating all columns as missing: {}",
                schema, table, e
            );
            columns.to_vec()
        }
    };

    ColumnReferenceCheck {
        valid: missing_columns.is_empty(),
        missing_columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory introspector; `broken` makes every lookup fail
    pub struct FakeIntrospector {
        pub tables: HashMap<(String, String), Vec<(String, String)>>,
        pub broken: bool,
    }

    impl FakeIntrospector {
        pub fn with_table(schema: &str, table: &str, columns: &[(&str, &str)]) -> Self {
            let mut tables = HashMap::new();
            tables.insert(
                (schema.to_string(), table.to_string()),
                columns
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
            );
            Self { tables, broken: false }
        }

        fn check(&self) -> Result<()> {
            if self.broken {
                Err(AdvisorError::Database("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SchemaIntrospector for FakeIntrospector {
        async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
            self.check()?;
            Ok(self.tables.contains_key(&(schema.to_string(), table.to_string())))
        }

        async fn column_names(&self, schema: &str, table: &str) -> Result<Vec<String>> {
            self.check()?;
            Ok(self
                .tables
                .get(&(schema.to_string(), table.to_string()))
                .map(|cols| cols.iter().map(|(n, _)| n.clone()).collect())
                .unwrap_or_default())
        }

        async fn describe_table(
            &self,
            data_source_id: i64,
            schema: &str,
            table: &str,
        ) -> Result<TableDescriptor> {
            self.check()?;
            let columns = self
                .tables
                .get(&(schema.to_string(), table.to_string()))
                .cloned()
                .ok_or_else(|| {
                    AdvisorError::Introspection(format!("{}.{} not found", schema, table))
                })?;
            Ok(TableDescriptor::from_columns(data_source_id, schema, table, columns))
        }
    }

    fn users() -> FakeIntrospector {
        FakeIntrospector::with_table("public", "users", &[("id", "integer"), ("email", "text")])
    }

    #[tokio::test]
    async fn test_table_reference() {
        let introspector = users();
        assert!(validate_table_reference(&introspector, "public", "users").await);
        assert!(!validate_table_reference(&introspector, "public", "accounts").await);
    }

    #[tokio::test]
    async fn test_column_references() {
        let introspector = users();
        let check = validate_column_references(
            &introspector,
            "public",
            "users",
            &["id".to_string(), "phone".to_string()],
        )
        .await;

        assert!(!check.valid);
        assert_eq!(check.missing_columns, vec!["phone".to_string()]);

        let email = ["email".to_string()];
        let check = validate_column_references(&introspector, "public", "users", &email).await;
        assert!(check.valid);
    }

    #[tokio::test]
    async fn test_lookup_failures_fail_closed() {
        let mut introspector = users();
        introspector.broken = true;

        assert!(!validate_table_reference(&introspector, "public", "users").await);

        let requested = vec!["id".to_string(), "email".to_string()];
        let check = validate_column_references(&introspector, "public", "users", &requested).await;
        assert!(!check.valid);
        assert_eq!(check.missing_columns, requested);
    }

    #[tokio::test]
    async fn test_describe_table_feeds_suggestions() {
        let introspector = users();
        let table = introspector.describe_table(3, "public", "users").await.unwrap();
        assert_eq!(table.data_source_id, 3);
        assert_eq!(table.columns[1].column_name, "email");
        assert_eq!(table.columns[1].data_type, "text");
    }
}
