//! Column-name normalization and edit-distance similarity

use lazy_static::lazy_static;
use regex::Regex;
use strsim::levenshtein;

/// Longest column name (in characters) considered for comparison
pub const MAX_COLUMN_NAME_LENGTH: usize = 255;

lazy_static! {
    static ref KEY_SUFFIX: Regex = Regex::new(r"(_id|_key|_code)$").unwrap();
}

/// Cap a column name at [`MAX_COLUMN_NAME_LENGTH`] characters
pub fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MAX_COLUMN_NAME_LENGTH) {
        Some((byte_idx, _)) => &name[..byte_idx],
        None => name,
    }
}

/// Lowercase, drop one trailing `_id`/`_key`/`_code`, then drop underscores.
///
/// `customer_id` -> `customer`, `Customer_Key` -> `customer`, `customerid` -> `customerid`
pub fn normalize_column_name(name: &str) -> String {
    let lowered = truncate_name(name).to_lowercase();
    KEY_SUFFIX.replace(&lowered, "").replace('_', "")
}

/// Levenshtein similarity as a whole percentage (0-100).
///
/// Both inputs are expected to be normalized already.
pub fn similarity_percent(a: &str, b: &str) -> u8 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0;
    }

    let distance = levenshtein(a, b);
    let ratio = 1.0 - distance as f64 / max_len as f64;
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("customer_id"), "customer");
        assert_eq!(normalize_column_name("Customer_Key"), "customer");
        assert_eq!(normalize_column_name("country_code"), "country");
        assert_eq!(normalize_column_name("order_line_item"), "orderlineitem");
        assert_eq!(normalize_column_name("customerid"), "customerid");
        assert_eq!(normalize_column_name("id"), "id");
        // only the trailing suffix is removed
        assert_eq!(normalize_column_name("id_code_key"), "idcode");
    }

    #[test]
    fn test_truncate_name() {
        let long = "a".repeat(1_000);
        assert_eq!(truncate_name(&long).len(), MAX_COLUMN_NAME_LENGTH);
        assert_eq!(truncate_name("short"), "short");

        let multibyte = "é".repeat(300);
        assert_eq!(truncate_name(&multibyte).chars().count(), MAX_COLUMN_NAME_LENGTH);
    }

    #[test]
    fn test_similarity_percent() {
        assert_eq!(similarity_percent("customer", "customer"), 100);
        assert_eq!(similarity_percent("customer", "customerid"), 80);
        assert_eq!(similarity_percent("customer", "id"), 0);
        assert_eq!(similarity_percent("", ""), 0);
        // 1 - 1/6 = 0.8333
        assert_eq!(similarity_percent("userid", "usrid"), 83);
    }
}
