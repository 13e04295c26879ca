pub mod config;
pub mod error;
pub mod introspection;
pub mod join_catalog;
pub mod join_suggester;
pub mod schema;
pub mod similarity;
pub mod sql_validator;

pub use join_catalog::{JoinCatalogEntry, JoinCatalogStore, JoinDefinition, SqliteJoinCatalog};
pub use join_suggester::{suggest_joins, JoinSuggestion, JoinSuggestionEngine, JoinType};
pub use schema::{ColumnDescriptor, TableDescriptor, TypeCategory};
pub use sql_validator::{validate_cleaning_sql, CleaningSqlValidator, ValidationResult};
