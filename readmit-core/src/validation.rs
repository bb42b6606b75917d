//! Sanity checks applied to tables before their cells are emitted.

use crate::error::ValidationError;
use crate::table::Table;
use crate::value::FeatureValue;
use regex::Regex;
use std::sync::LazyLock;

/// Suffix marking a boolean feature column.
pub const BOOL_SUFFIX: &str = "_bool";

/// An uppercase letter next to a space, e.g. `"Heart Rate"`.
static BAD_COLUMN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z] | [A-Z]").expect("column name pattern is valid")
});

/// Check a column name for naming violations.
pub fn validate_column_name(name: &str) -> Result<(), ValidationError> {
    if BAD_COLUMN_NAME.is_match(name) {
        return Err(ValidationError::BadColumnName {
            column: name.to_string(),
        });
    }
    Ok(())
}

/// Check that a `*_bool` column only holds true, false or null.
pub fn validate_bool_column(name: &str, values: &[FeatureValue]) -> Result<(), ValidationError> {
    if !name.ends_with(BOOL_SUFFIX) {
        return Ok(());
    }
    let mut bad: Vec<String> = Vec::new();
    for value in values.iter().filter(|v| !v.is_boolean_like()) {
        let rendered = value.to_string();
        if !bad.contains(&rendered) {
            bad.push(rendered);
        }
    }
    if bad.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::NonBoolean {
            column: name.to_string(),
            values: bad.join(", "),
        })
    }
}

/// Run every column check over a table, failing on the first violation.
pub fn validate_table(table: &Table) -> Result<(), ValidationError> {
    for (name, values) in table.iter_columns() {
        validate_column_name(name)?;
        validate_bool_column(name, values)?;
    }
    Ok(())
}
