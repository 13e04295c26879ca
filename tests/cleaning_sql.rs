use join_advisor::sql_validator::{validate_cleaning_sql, CleaningSqlValidator};

#[test]
fn test_typical_dedup_script_passes() {
    let sql = r#"
        -- remove duplicate leads, keep the newest row per email
        BEGIN;
        CREATE TEMP TABLE latest_leads AS
            SELECT DISTINCT ON (email) id FROM leads ORDER BY email, created_at DESC;
        UPDATE leads SET is_duplicate = true WHERE id NOT IN (SELECT id FROM latest_leads);
        UPDATE leads SET email = LOWER(TRIM(email)) WHERE email <> LOWER(TRIM(email));
        COMMIT;
    "#;

    let result = validate_cleaning_sql(sql);
    assert!(result.safe, "issues: {:?}", result.issues);
    assert!(result.warnings.is_empty(), "warnings: {:?}", result.warnings);
    assert_eq!(
        result.allowed_operations,
        vec!["SELECT", "UPDATE", "BEGIN", "COMMIT"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    assert!(result.blocked_operations.is_empty());
}

#[test]
fn test_delete_after_semicolon_is_treated_as_stacked_query() {
    let sql = "BEGIN; UPDATE leads SET stale = true WHERE id = 9; \
               DELETE FROM leads WHERE stale; COMMIT;";
    let result = validate_cleaning_sql(sql);
    assert!(!result.safe);
    assert!(result.issues.iter().any(|i| i.contains("stacked DELETE")));
}

#[test]
fn test_unsafe_script_reports_everything_found() {
    let sql = "TRUNCATE staging_events; ALTER TABLE events ADD COLUMN note text; VACUUM events;";
    let result = CleaningSqlValidator::new().validate_cleaning_sql(sql);

    assert!(!result.safe);
    assert_eq!(
        result.blocked_operations,
        vec!["TRUNCATE".to_string(), "ALTER".to_string(), "VACUUM".to_string()]
    );
    // three bare statements also trip the transaction warning
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("not wrapped in a transaction")));
}

#[test]
fn test_warnings_never_change_safety() {
    let result =
        validate_cleaning_sql("DELETE FROM bounces; UPDATE contacts SET opted_out = false;");
    assert!(result.safe);
    assert_eq!(result.warnings.len(), 3);
    assert!(result.issues.is_empty());
}

#[test]
fn test_result_serializes_for_callers() {
    let result = validate_cleaning_sql("DROP TABLE users;");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["safe"], false);
    assert_eq!(json["blocked_operations"][0], "DROP");
}

#[test]
fn test_annotated_script_passes_but_cut_filter_fails() {
    let annotated = "BEGIN;\n\
                     -- normalise country codes\n\
                     UPDATE customers SET country = UPPER(country) WHERE country <> ''; -- ISO-2\n\
                     COMMIT;";
    let result = validate_cleaning_sql(annotated);
    assert!(result.safe, "issues: {:?}", result.issues);

    let cut = "UPDATE customers SET tier = 'gold' WHERE email = 'a@b.co' -- AND spend > 1000";
    let result = validate_cleaning_sql(cut);
    assert!(!result.safe);
    assert!(result.issues.iter().any(|i| i.ends_with("trailing line comment")));
}
