//! Join Suggestion Engine
//!
//! Proposes equi-join columns between two tables without running a query:
//! 1. Type compatibility gate (coarse [`TypeCategory`] must match exactly)
//! 2. Normalized column-name similarity (exact = 95, otherwise Levenshtein percentage)
//! 3. Previously accepted joins from the catalog outrank and deduplicate heuristics

use crate::error::{AdvisorError, Result};
use crate::join_catalog::{CatalogStats, JoinCatalogEntry, JoinCatalogStore, JoinDefinition};
use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::similarity::{normalize_column_name, similarity_percent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Heuristic output is capped at this many suggestions
pub const MAX_SUGGESTIONS: usize = 5;

/// Name similarity below this percentage counts as no match
pub const MIN_SIMILARITY: u8 = 60;

/// Confidence for pairs whose normalized names are equal
pub const EXACT_MATCH_CONFIDENCE: u8 = 95;

/// Confidence for joins already confirmed in the catalog
pub const CATALOG_CONFIDENCE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinType {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase();
        let kind = normalized.strip_suffix(" JOIN").unwrap_or(&normalized);
        let kind = kind.strip_suffix(" OUTER").unwrap_or(kind);
        match kind {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "FULL" => Ok(JoinType::Full),
            _ => Err(AdvisorError::InvalidInput(format!("Unknown join type: {}", s))),
        }
    }
}

/// A proposed equi-join between one column on each side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSuggestion {
    pub left_column_path: String,
    pub right_column_path: String,
    pub left_table: String,
    pub right_table: String,
    pub left_column: String,
    pub right_column: String,

    /// 0-100
    pub confidence: u8,

    pub reason: String,
    pub suggested_join_type: JoinType,
}

/// Rank likely join columns between two tables.
///
/// Pure function of its inputs. Returns at most [`MAX_SUGGESTIONS`] entries ordered by
/// non-increasing confidence; ties keep left-major column order.
pub fn suggest_joins(left: &TableDescriptor, right: &TableDescriptor) -> Vec<JoinSuggestion> {
    let mut suggestions = Vec::new();

    for left_col in &left.columns {
        let left_category = left_col.category();

        for right_col in &right.columns {
            if right_col.category() != left_category {
                continue;
            }

            let confidence = name_confidence(&left_col.column_name, &right_col.column_name);
            if confidence == 0 {
                continue;
            }

            suggestions.push(JoinSuggestion {
                left_column_path: left_col.path(),
                right_column_path: right_col.path(),
                left_table: left.table_name.clone(),
                right_table: right.table_name.clone(),
                left_column: left_col.column_name.clone(),
                right_column: right_col.column_name.clone(),
                confidence,
                reason: describe_match(confidence, left_col, right_col),
                suggested_join_type: JoinType::Inner,
            });
        }
    }

    // stable: equal confidences keep discovery order
    suggestions.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    suggestions.truncate(MAX_SUGGESTIONS);

    debug!(
        "Suggested {} join(s) between {} and {}",
        suggestions.len(),
        left.qualified_name(),
        right.qualified_name()
    );

    suggestions
}

/// Name-only confidence for a type-compatible pair; 0 means no match.
pub fn name_confidence(left_name: &str, right_name: &str) -> u8 {
    let left = normalize_column_name(left_name);
    let right = normalize_column_name(right_name);

    // names made only of a key suffix (e.g. "_id") carry nothing to compare
    if left.is_empty() || right.is_empty() {
        return 0;
    }

    if left == right {
        return EXACT_MATCH_CONFIDENCE;
    }

    let similarity = similarity_percent(&left, &right);
    if similarity < MIN_SIMILARITY {
        0
    } else {
        similarity
    }
}

fn describe_match(confidence: u8, left: &ColumnDescriptor, right: &ColumnDescriptor) -> String {
    let base = if confidence >= 95 {
        "Column names are identical or nearly identical"
    } else if confidence >= 80 {
        "Column names are very similar"
    } else {
        "Column names are similar"
    };

    format!("{} (types: {} / {})", base, left.data_type, right.data_type)
}

/// Join suggestions backed by the persisted catalog.
///
/// Holds no mutable state of its own; construct one per catalog and share it freely.
pub struct JoinSuggestionEngine {
    catalog: Arc<dyn JoinCatalogStore>,
    popular_limit: usize,
}

impl JoinSuggestionEngine {
    pub fn new(catalog: Arc<dyn JoinCatalogStore>) -> Self {
        Self {
            catalog,
            popular_limit: crate::config::DEFAULT_POPULAR_LIMIT,
        }
    }

    /// Default limit used by [`Self::get_popular_joins`] and the catalog half of
    /// [`Self::get_combined_suggestions`]
    pub fn with_popular_limit(mut self, limit: usize) -> Self {
        self.popular_limit = limit.max(1);
        self
    }

    pub fn suggest_joins(
        &self,
        left: &TableDescriptor,
        right: &TableDescriptor,
    ) -> Vec<JoinSuggestion> {
        suggest_joins(left, right)
    }

    /// Record an accepted join; repeats of the same directional pair bump `usage_count`.
    ///
    /// Storage failures are returned to the caller.
    pub fn save_join_to_catalog(&self, join: &JoinDefinition) -> Result<JoinCatalogEntry> {
        join.validate()?;

        match self.catalog.record_join(join) {
            Ok(entry) => {
                info!(
                    "Saved join {}.{} -> {}.{} (used {} time(s))",
                    entry.left_table,
                    entry.left_column,
                    entry.right_table,
                    entry.right_column,
                    entry.usage_count
                );
                Ok(entry)
            }
            Err(e) => {
                warn!(
                    "Failed to save join {}.{} -> {}.{}: {}",
                    join.left_table, join.left_column, join.right_table, join.right_column, e
                );
                Err(e)
            }
        }
    }

    /// Most-used catalog joins between two data sources, in either direction.
    ///
    /// A catalog outage yields an empty list.
    pub fn get_popular_joins(
        &self,
        left_data_source_id: i64,
        right_data_source_id: i64,
        limit: Option<usize>,
    ) -> Vec<JoinCatalogEntry> {
        let limit = limit.unwrap_or(self.popular_limit);
        match self
            .catalog
            .popular_joins(left_data_source_id, right_data_source_id, limit)
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to load popular joins for sources {} and {}: {}",
                    left_data_source_id, right_data_source_id, e
                );
                Vec::new()
            }
        }
    }

    /// Catalog joins between these exact tables first, then heuristic suggestions for
    /// column pairs the catalog did not already cover.
    pub fn get_combined_suggestions(
        &self,
        left: &TableDescriptor,
        right: &TableDescriptor,
    ) -> Vec<JoinSuggestion> {
        let catalog_entries = match self.catalog.joins_between_tables(
            left.data_source_id,
            &left.table_name,
            right.data_source_id,
            &right.table_name,
            self.popular_limit,
        ) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Catalog lookup failed for {} / {}, falling back to heuristics: {}",
                    left.qualified_name(),
                    right.qualified_name(),
                    e
                );
                Vec::new()
            }
        };

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut combined = Vec::new();

        for entry in catalog_entries {
            let entry = entry.oriented_to(left.data_source_id, &left.table_name);
            let pair = (entry.left_column.clone(), entry.right_column.clone());
            if seen.insert(pair) {
                combined.push(catalog_suggestion(&entry));
            }
        }

        let from_catalog = combined.len();

        combined.extend(suggest_joins(left, right).into_iter().filter(|s| {
            !seen.contains(&(s.left_column.clone(), s.right_column.clone()))
        }));

        debug!(
            "Combined suggestions for {} / {}: {} from catalog, {} heuristic",
            left.qualified_name(),
            right.qualified_name(),
            from_catalog,
            combined.len() - from_catalog
        );

        combined
    }

    pub fn catalog_stats(&self) -> Result<CatalogStats> {
        self.catalog.stats()
    }
}

fn catalog_suggestion(entry: &JoinCatalogEntry) -> JoinSuggestion {
    let times = if entry.usage_count == 1 { "time" } else { "times" };

    JoinSuggestion {
        left_column_path: format!(
            "{}.{}.{}",
            entry.left_schema, entry.left_table, entry.left_column
        ),
        right_column_path: format!(
            "{}.{}.{}",
            entry.right_schema, entry.right_table, entry.right_column
        ),
        left_table: entry.left_table.clone(),
        right_table: entry.right_table.clone(),
        left_column: entry.left_column.clone(),
        right_column: entry.right_column.clone(),
        confidence: CATALOG_CONFIDENCE,
        reason: format!(
            "Previously used join (reused {} {})",
            entry.usage_count, times
        ),
        suggested_join_type: entry.join_type,
    }
}
