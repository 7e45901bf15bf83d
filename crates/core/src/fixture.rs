//! Fixture tables
//!
//! A fixture is a single table with the columns `(id, name, score)` and an
//! ordered list of seed rows. Resetting a fixture drops the table, recreates
//! it, and inserts the seed rows, so repeated resets always leave the same
//! state behind.

use crate::value::{Row, Snapshot, SqlValue};
use serde::{Deserialize, Serialize};

/// Default fixture table name.
pub const USERS_TABLE: &str = "users";

/// A named table plus its seed rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Table name; must be a plain SQL identifier
    pub table: String,
    /// Rows inserted, in order, on every reset
    #[serde(default)]
    pub seed: Vec<Row>,
}

impl Fixture {
    /// Create a fixture for `table` with the given seed rows.
    pub fn new(table: impl Into<String>, seed: Vec<Row>) -> Self {
        Fixture {
            table: table.into(),
            seed,
        }
    }

    /// The `users` table seeded with Alice and Bob.
    pub fn users() -> Self {
        Fixture::new(
            USERS_TABLE,
            vec![Row::new(1, "Alice", 100), Row::new(2, "Bob", 200)],
        )
    }

    /// Seed rows as a snapshot, in insertion order.
    pub fn seed_snapshot(&self) -> Snapshot {
        Snapshot::new(self.seed.clone())
    }

    /// Check that the table name is a plain identifier.
    ///
    /// The name is interpolated into DDL, so anything beyond
    /// `[A-Za-z_][A-Za-z0-9_]*` is refused.
    pub fn validate(&self) -> Result<(), String> {
        let mut chars = self.table.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(format!("'{}' is not a plain SQL identifier", self.table))
        }
    }

    /// Statements that reset the table, in execution order.
    ///
    /// Placeholders use the `?` style; stores with another placeholder
    /// syntax rewrite them.
    pub fn reset_statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        let mut statements = vec![
            (format!("DROP TABLE IF EXISTS {}", self.table), Vec::new()),
            (
                format!(
                    "CREATE TABLE {} (id INT, name VARCHAR(255), score INT)",
                    self.table
                ),
                Vec::new(),
            ),
        ];
        let insert = format!(
            "INSERT INTO {} (id, name, score) VALUES (?, ?, ?)",
            self.table
        );
        statements.extend(self.seed.iter().map(|row| (insert.clone(), row.to_params())));
        statements
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Fixture::users()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_fixture() {
        let fixture = Fixture::users();
        assert_eq!(fixture.table, "users");
        assert_eq!(
            fixture.seed_snapshot().to_string(),
            "[(1, Alice, 100), (2, Bob, 200)]"
        );
    }

    #[test]
    fn test_reset_statements_drop_create_then_insert() {
        let statements = Fixture::users().reset_statements();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0].0, "DROP TABLE IF EXISTS users");
        assert!(statements[1].0.starts_with("CREATE TABLE users"));
        assert_eq!(
            statements[2].1,
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("Alice".into()),
                SqlValue::Integer(100)
            ]
        );
        assert_eq!(statements[3].1[1], SqlValue::Text("Bob".into()));
    }

    #[test]
    fn test_empty_seed_only_recreates() {
        let statements = Fixture::new("empty_table", Vec::new()).reset_statements();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(Fixture::users().validate().is_ok());
        assert!(Fixture::new("_t1", Vec::new()).validate().is_ok());
        assert!(Fixture::new("1users", Vec::new()).validate().is_err());
        assert!(Fixture::new("users; DROP TABLE x", Vec::new()).validate().is_err());
        assert!(Fixture::new("", Vec::new()).validate().is_err());
    }
}
