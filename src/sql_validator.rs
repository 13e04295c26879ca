//! Cleaning-SQL Safety Validator
//!
//! Screens AI-generated data-cleaning SQL before it reaches an executor. Purely static:
//! nothing is parsed into an AST and nothing is executed.
//!
//! - Blocking checks (fill `issues`, make the result unsafe): schema/privilege keywords,
//!   persistent `CREATE TABLE`, injection signatures
//! - Warning checks (fill `warnings` only): unguarded `DELETE`/`UPDATE`, several
//!   statements outside a `BEGIN ... COMMIT` block

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::debug;

/// Keywords that fail validation whenever they appear as whole words
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "DROP",
    "TRUNCATE",
    "ALTER",
    "CREATE DATABASE",
    "DROP DATABASE",
    "CREATE USER",
    "DROP USER",
    "GRANT",
    "REVOKE",
    "VACUUM",
    "ANALYZE",
];

/// Operations reported back to the caller when present
pub const ALLOWED_OPERATIONS: &[&str] = &[
    "SELECT",
    "UPDATE",
    "DELETE",
    "INSERT",
    "WITH",
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "SAVEPOINT",
];

const PERSISTENT_TABLE_OPERATION: &str = "CREATE TABLE";

fn keyword_regex(keyword: &str) -> Regex {
    let pattern = format!(r"(?i)\b{}\b", keyword.replace(' ', r"\s+"));
    Regex::new(&pattern).unwrap()
}

lazy_static! {
    static ref LINE_COMMENT: Regex = Regex::new(r"--[^\n]*").unwrap();
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    static ref BLOCKED: Vec<(&'static str, Regex)> = BLOCKED_KEYWORDS
        .iter()
        .map(|kw| (*kw, keyword_regex(kw)))
        .collect();

    static ref ALLOWED: Vec<(&'static str, Regex)> = ALLOWED_OPERATIONS
        .iter()
        .map(|op| (*op, keyword_regex(op)))
        .collect();

    // CREATE TEMP / TEMPORARY TABLE never matches: the qualifier sits between the words
    static ref PERSISTENT_CREATE_TABLE: Regex =
        Regex::new(r"\bCREATE\s+(?:UNLOGGED\s+)?TABLE\b").unwrap();

    static ref INJECTION_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("stacked DROP", Regex::new(r";\s*DROP\b").unwrap()),
        ("stacked DELETE", Regex::new(r";\s*DELETE\s+FROM\b").unwrap()),
        ("UNION SELECT", Regex::new(r"\bUNION\s+(?:ALL\s+)?SELECT\b").unwrap()),
        ("tautology 1=1", Regex::new(r"\b1\s*=\s*1\b").unwrap()),
        // closing quote, OR, then a quoted operand compared with `=`
        ("quoted OR clause", Regex::new(r"'\s*OR\s*'[^']*'\s*=").unwrap()),
    ];

    static ref DELETE_FROM: Regex = Regex::new(r"\bDELETE\s+FROM\b").unwrap();
    static ref UPDATE_SET: Regex = Regex::new(r"(?s)\bUPDATE\b.*\bSET\b").unwrap();
    // ON CONFLICT ... DO UPDATE only touches the conflicting row
    static ref UPSERT_UPDATE: Regex = Regex::new(r"\bDO\s+UPDATE\b").unwrap();
    static ref WHERE_CLAUSE: Regex = Regex::new(r"\bWHERE\b").unwrap();
    static ref FROM_CLAUSE: Regex = Regex::new(r"\bFROM\b").unwrap();
    static ref LEADING_WITH: Regex = Regex::new(r"^WITH\b").unwrap();

    static ref TRANSACTION_START: Regex =
        Regex::new(r"^(?:BEGIN|START\s+TRANSACTION)\b").unwrap();
    static ref TRANSACTION_END: Regex =
        Regex::new(r"\b(?:COMMIT|ROLLBACK)(?:\s+(?:TRANSACTION|WORK))?\s*;?$").unwrap();
}

/// Outcome of one validation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `true` exactly when `issues` is empty
    pub safe: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub allowed_operations: Vec<String>,
    pub blocked_operations: Vec<String>,
}

/// Strip `--` and `/* */` comments, collapse whitespace, uppercase, trim
pub fn normalize_sql(sql: &str) -> String {
    let without_line = LINE_COMMENT.replace_all(sql, " ");
    let without_block = BLOCK_COMMENT.replace_all(&without_line, " ");
    WHITESPACE
        .replace_all(&without_block, " ")
        .to_uppercase()
        .trim()
        .to_string()
}

/// Split on `;` outside string literals and quoted identifiers.
///
/// Empty statements are dropped; each statement is trimmed.
pub fn split_statements(sql: &str) -> Vec<String> {
    let dialect = PostgreSqlDialect {};
    match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => {
            let mut statements = Vec::new();
            let mut current = String::new();
            for token in tokens {
                match token {
                    Token::SemiColon => push_statement(&mut statements, &mut current),
                    Token::EOF => {}
                    other => current.push_str(&other.to_string()),
                }
            }
            push_statement(&mut statements, &mut current);
            statements
        }
        Err(e) => {
            debug!("Tokenizer rejected SQL ({}), using quote-aware scan", e);
            split_outside_quotes(sql)
        }
    }
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

// Fallback for text the tokenizer cannot handle (e.g. an unterminated literal).
// Doubled quotes toggle twice, so escaped quotes need no special case.
fn split_outside_quotes(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                push_statement(&mut statements, &mut current);
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    push_statement(&mut statements, &mut current);

    statements
}

/// Whether a `--` comment cuts a statement short.
///
/// Runs on the raw text because normalization removes comments. A comment counts when it
/// sits outside literals and follows code on the same line that was not closed with `;`.
/// Whole-line comments and notes after a finished statement are fine.
fn has_trailing_line_comment(sql: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut in_block = false;
    let mut last_code: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_block {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            }
            continue;
        }
        if in_single || in_double {
            if (in_single && ch == '\'') || (in_double && ch == '"') {
                in_single = false;
                in_double = false;
            }
            last_code = Some(ch);
            continue;
        }

        match ch {
            '\'' => in_single = true,
            '"' => in_double = true,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block = true;
                continue;
            }
            '-' if chars.peek() == Some(&'-') => {
                if matches!(last_code, Some(c) if c != ';') {
                    return true;
                }
                // rest of the line is comment text
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                last_code = None;
                continue;
            }
            '\n' => {
                last_code = None;
                continue;
            }
            c if c.is_whitespace() => continue,
            _ => {}
        }
        last_code = Some(ch);
    }

    false
}

/// Stateless validator for AI-generated data-cleaning SQL
#[derive(Debug, Clone, Copy, Default)]
pub struct CleaningSqlValidator;

impl CleaningSqlValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_cleaning_sql(&self, sql: &str) -> ValidationResult {
        let normalized = normalize_sql(sql);
        let mut result = ValidationResult::default();

        if normalized.is_empty() {
            result.issues.push("SQL is empty".to_string());
            return result;
        }

        self.check_blocked_keywords(&normalized, &mut result);
        self.check_persistent_tables(&normalized, &mut result);
        self.check_injection(sql, &normalized, &mut result);

        let statements = split_statements(&normalized);
        self.check_unguarded_mutations(&statements, &mut result);
        self.check_transaction_wrapping(&normalized, &statements, &mut result);

        result.allowed_operations = ALLOWED
            .iter()
            .filter(|(_, re)| re.is_match(&normalized))
            .map(|(op, _)| op.to_string())
            .collect();

        result.safe = result.issues.is_empty();

        debug!(
            "Validated cleaning SQL: safe={}, {} issue(s), {} warning(s)",
            result.safe,
            result.issues.len(),
            result.warnings.len()
        );

        result
    }

    fn check_blocked_keywords(&self, normalized: &str, result: &mut ValidationResult) {
        for (keyword, re) in BLOCKED.iter() {
            if re.is_match(normalized) {
                result.issues.push(format!("Blocked operation detected: {}", keyword));
                result.blocked_operations.push(keyword.to_string());
            }
        }
    }

    fn check_persistent_tables(&self, normalized: &str, result: &mut ValidationResult) {
        if PERSISTENT_CREATE_TABLE.is_match(normalized) {
            result.issues.push(
                "CREATE TABLE is only allowed for temporary tables (CREATE TEMP TABLE)".to_string(),
            );
            result
                .blocked_operations
                .push(PERSISTENT_TABLE_OPERATION.to_string());
        }
    }

    fn check_injection(&self, raw: &str, normalized: &str, result: &mut ValidationResult) {
        for (description, re) in INJECTION_PATTERNS.iter() {
            if re.is_match(normalized) {
                result
                    .issues
                    .push(format!("Possible SQL injection pattern detected: {}", description));
            }
        }

        if has_trailing_line_comment(raw) {
            result.issues.push(
                "Possible SQL injection pattern detected: trailing line comment".to_string(),
            );
        }
    }

    fn check_unguarded_mutations(&self, statements: &[String], result: &mut ValidationResult) {
        for statement in statements {
            let has_where = WHERE_CLAUSE.is_match(statement);

            if DELETE_FROM.is_match(statement) && !has_where && !LEADING_WITH.is_match(statement) {
                result.warnings.push(format!(
                    "DELETE without WHERE clause removes every row: {}",
                    statement
                ));
            }

            let plain_update = UPSERT_UPDATE.replace_all(statement, " ");
            if UPDATE_SET.is_match(&plain_update)
                && !has_where
                && !FROM_CLAUSE.is_match(statement)
            {
                result.warnings.push(format!(
                    "UPDATE without WHERE clause modifies every row: {}",
                    statement
                ));
            }
        }
    }

    fn check_transaction_wrapping(
        &self,
        normalized: &str,
        statements: &[String],
        result: &mut ValidationResult,
    ) {
        if statements.len() <= 1 {
            return;
        }

        let wrapped =
            TRANSACTION_START.is_match(normalized) && TRANSACTION_END.is_match(normalized);
        if !wrapped {
            result.warnings.push(format!(
                "{} statements are not wrapped in a transaction (BEGIN ... COMMIT)",
                statements.len()
            ));
        }
    }
}

/// Shorthand for `CleaningSqlValidator::new().validate_cleaning_sql(sql)`
pub fn validate_cleaning_sql(sql: &str) -> ValidationResult {
    CleaningSqlValidator::new().validate_cleaning_sql(sql)
}
