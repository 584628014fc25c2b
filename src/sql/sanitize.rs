//! SQL Identifier Sanitization Utilities
//!
//! Provides functions to quote SQL identifiers, validate schema names and
//! derive table/column names from holder and attribute names.

use std::sync::LazyLock;

use regex::Regex;

static HOLDER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("holder name pattern"));

static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][A-Za-z0-9]*$").expect("attribute name pattern"));

/// Attribute names that would collide with generated columns
pub const RESERVED_ATTRIBUTE_NAMES: &[&str] = &["id"];

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use nquery_engine::sql::quote_identifier;
///
/// let quoted = quote_identifier("CUSTOMER");
/// assert_eq!(quoted, "\"CUSTOMER\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    // Escape any double quotes in the identifier by doubling them
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a type or mixin name
///
/// Rules:
/// - Must start with an uppercase letter
/// - Can only contain ASCII letters and digits
pub fn validate_holder_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Holder name cannot be empty".to_string());
    }
    if !HOLDER_NAME.is_match(name) {
        return Err(format!(
            "Holder name '{}' is invalid. Must start with an uppercase letter and contain only letters and digits.",
            name
        ));
    }
    Ok(())
}

/// Validate an attribute name
///
/// Rules:
/// - Must start with a lowercase letter
/// - Can only contain ASCII letters and digits
/// - Cannot be one of [`RESERVED_ATTRIBUTE_NAMES`]
pub fn validate_attribute_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Attribute name cannot be empty".to_string());
    }
    if !ATTRIBUTE_NAME.is_match(name) {
        return Err(format!(
            "Attribute name '{}' is invalid. Must start with a lowercase letter and contain only letters and digits.",
            name
        ));
    }
    if RESERVED_ATTRIBUTE_NAMES.contains(&name) {
        return Err(format!(
            "Attribute name '{}' is reserved and cannot be used.",
            name
        ));
    }
    Ok(())
}

/// Derive an upper snake case SQL name from a camel case schema name
///
/// # Example
/// ```
/// use nquery_engine::sql::to_sql_name;
///
/// assert_eq!(to_sql_name("PurchaseOrder"), "PURCHASE_ORDER");
/// assert_eq!(to_sql_name("firstName"), "FIRST_NAME");
/// ```
pub fn to_sql_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            out.push('_');
        }
        previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // quote_identifier Tests
    // =========================================================================

    #[test]
    fn test_quote_identifier_simple() {
        assert_eq!(quote_identifier("CUSTOMER"), "\"CUSTOMER\"");
        assert_eq!(quote_identifier("a"), "\"a\"");
    }

    #[test]
    fn test_quote_identifier_with_quotes() {
        assert_eq!(
            quote_identifier("table\"with\"quotes"),
            "\"table\"\"with\"\"quotes\""
        );
    }

    #[test]
    fn test_quote_identifier_reserved_keyword() {
        // Reserved keywords are safe once quoted
        assert_eq!(quote_identifier("ORDER"), "\"ORDER\"");
    }

    // =========================================================================
    // Name Validation Tests
    // =========================================================================

    #[test]
    fn test_validate_holder_name() {
        assert!(validate_holder_name("Customer").is_ok());
        assert!(validate_holder_name("PurchaseOrder2").is_ok());
        assert!(validate_holder_name("").is_err());
        assert!(validate_holder_name("customer").is_err());
        assert!(validate_holder_name("Purchase_Order").is_err());
        assert!(validate_holder_name("Order Line").is_err());
    }

    #[test]
    fn test_validate_attribute_name() {
        assert!(validate_attribute_name("firstName").is_ok());
        assert!(validate_attribute_name("a1").is_ok());
        assert!(validate_attribute_name("FirstName").is_err());
        assert!(validate_attribute_name("first_name").is_err());
        assert!(validate_attribute_name("1st").is_err());
    }

    #[test]
    fn test_validate_attribute_name_reserved() {
        let result = validate_attribute_name("id");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("reserved"));
    }

    // =========================================================================
    // to_sql_name Tests
    // =========================================================================

    #[test]
    fn test_to_sql_name() {
        assert_eq!(to_sql_name("Customer"), "CUSTOMER");
        assert_eq!(to_sql_name("PurchaseOrder"), "PURCHASE_ORDER");
        assert_eq!(to_sql_name("firstName"), "FIRST_NAME");
        assert_eq!(to_sql_name("line2Total"), "LINE2_TOTAL");
        assert_eq!(to_sql_name("order"), "ORDER");
    }
}
