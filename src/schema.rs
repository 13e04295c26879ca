//! Table and column descriptors supplied by schema introspection

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub schema: String,
    pub table_name: String,
    pub column_name: String,
    /// Raw SQL type string as reported by the source (e.g. "character varying")
    pub data_type: String,
}

impl ColumnDescriptor {
    pub fn new(
        schema: impl Into<String>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table_name: table_name.into(),
            column_name: column_name.into(),
            data_type: data_type.into(),
        }
    }

    /// `schema.table.column`
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table_name, self.column_name)
    }

    pub fn category(&self) -> TypeCategory {
        TypeCategory::from_sql_type(&self.data_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub data_source_id: i64,
}

impl TableDescriptor {
    /// Build a descriptor from `(column_name, data_type)` pairs
    pub fn from_columns<I, C, T>(
        data_source_id: i64,
        schema: impl Into<String>,
        table_name: impl Into<String>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table_name = table_name.into();
        let columns = columns
            .into_iter()
            .map(|(name, data_type)| {
                ColumnDescriptor::new(schema.clone(), table_name.clone(), name, data_type)
            })
            .collect();

        Self {
            schema,
            table_name,
            columns,
            data_source_id,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }
}

/// Coarse bucket a raw SQL type string falls into before join compatibility is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Integer,
    String,
    Numeric,
    Date,
    Boolean,
    Other,
}

const INTEGER_PATTERNS: &[&str] = &["int", "integer", "serial"];
const STRING_PATTERNS: &[&str] = &["char", "text", "string", "uuid"];
const NUMERIC_PATTERNS: &[&str] = &["numeric", "decimal", "float", "double", "real", "money"];
const DATE_PATTERNS: &[&str] = &["date", "time"];
const BOOLEAN_PATTERNS: &[&str] = &["bool"];

impl TypeCategory {
    /// Case-insensitive substring match, checked in declaration order.
    ///
    /// Deliberately lossy: `interval` lands in `Integer` and `point` too. Dialect
    /// specific types nobody maps fall through to `Other`.
    pub fn from_sql_type(data_type: &str) -> Self {
        let lowered = data_type.to_lowercase();
        let matches = |patterns: &[&str]| patterns.iter().any(|p| lowered.contains(p));

        if matches(INTEGER_PATTERNS) {
            TypeCategory::Integer
        } else if matches(STRING_PATTERNS) {
            TypeCategory::String
        } else if matches(NUMERIC_PATTERNS) {
            TypeCategory::Numeric
        } else if matches(DATE_PATTERNS) {
            TypeCategory::Date
        } else if matches(BOOLEAN_PATTERNS) {
            TypeCategory::Boolean
        } else {
            TypeCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Integer => "integer",
            TypeCategory::String => "string",
            TypeCategory::Numeric => "numeric",
            TypeCategory::Date => "date",
            TypeCategory::Boolean => "boolean",
            TypeCategory::Other => "other",
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_categories() {
        assert_eq!(TypeCategory::from_sql_type("INTEGER"), TypeCategory::Integer);
        assert_eq!(TypeCategory::from_sql_type("bigint"), TypeCategory::Integer);
        assert_eq!(TypeCategory::from_sql_type("bigserial"), TypeCategory::Integer);
        assert_eq!(TypeCategory::from_sql_type("character varying(255)"), TypeCategory::String);
        assert_eq!(TypeCategory::from_sql_type("TEXT"), TypeCategory::String);
        assert_eq!(TypeCategory::from_sql_type("numeric(12,2)"), TypeCategory::Numeric);
        assert_eq!(TypeCategory::from_sql_type("double precision"), TypeCategory::Numeric);
        assert_eq!(TypeCategory::from_sql_type("timestamp with time zone"), TypeCategory::Date);
        assert_eq!(TypeCategory::from_sql_type("date"), TypeCategory::Date);
        assert_eq!(TypeCategory::from_sql_type("boolean"), TypeCategory::Boolean);
        assert_eq!(TypeCategory::from_sql_type("jsonb"), TypeCategory::Other);
    }

    #[test]
    fn test_descriptor_from_columns() {
        let table = TableDescriptor::from_columns(
            7,
            "public",
            "orders",
            [("id", "integer"), ("customer_id", "integer")],
        );

        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[1].path(), "public.orders.customer_id");
        assert_eq!(table.columns[1].category(), TypeCategory::Integer);
        assert_eq!(table.qualified_name(), "public.orders");
    }
}
