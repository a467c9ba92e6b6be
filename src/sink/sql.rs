//! Statement helpers shared by the SQL sinks.

use std::sync::OnceLock;

use regex::Regex;

/// Default target table of the SQL sinks.
pub const DEFAULT_TABLE: &str = "measurements";

const COLUMNS: [&str; 11] = [
    "mac",
    "name",
    "ts",
    "temperature",
    "humidity",
    "pressure",
    "acceleration_x",
    "acceleration_y",
    "acceleration_z",
    "movement_counter",
    "battery",
];

/// Whether `table` is safe to interpolate into SQL.
pub fn is_valid_table_name(table: &str) -> bool {
    static TABLE_REGEX: OnceLock<Regex> = OnceLock::new();
    TABLE_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid table regex"))
        .is_match(table)
}

/// Bind parameter syntax of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// `?` (SQLite).
    Question,
    /// `$1`, `$2`, ... (PostgreSQL).
    Numbered,
}

/// INSERT of one measurement row into `table`.
pub(crate) fn insert_statement(table: &str, placeholder: Placeholder) -> String {
    let params = (1..=COLUMNS.len())
        .map(|i| match placeholder {
            Placeholder::Question => "?".to_string(),
            Placeholder::Numbered => format!("${i}"),
        })
        .collect::<Vec<_>>();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        COLUMNS.join(", "),
        params.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("measurements"));
        assert!(is_valid_table_name("_ruuvi_2024"));
        assert!(!is_valid_table_name("1abc"));
        assert!(!is_valid_table_name("m; DROP TABLE x"));
        assert!(!is_valid_table_name("public.measurements"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn test_insert_statement() {
        let sqlite = insert_statement("readings", Placeholder::Question);
        assert!(sqlite.starts_with("INSERT INTO readings (mac, name, ts, "));
        assert!(sqlite.ends_with("battery) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"));

        let postgres = insert_statement("readings", Placeholder::Numbered);
        assert!(postgres.ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"));
    }
}
