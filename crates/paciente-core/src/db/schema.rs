//! SQLite schema definition.

/// Complete database schema for paciente.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    local_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER NOT NULL CHECK (age BETWEEN 0 AND 32767),
    sex TEXT NOT NULL,
    photo BLOB,                                  -- compressed image bytes
    classification_label TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_age_range_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        // Negative age should fail
        let result = conn.execute(
            "INSERT INTO patients (local_id, name, age, sex) VALUES ('a', 'Ana', -1, 'F')",
            [],
        );
        assert!(result.is_err());

        // Beyond the 16-bit range should fail
        let result = conn.execute(
            "INSERT INTO patients (local_id, name, age, sex) VALUES ('b', 'Ana', 32768, 'F')",
            [],
        );
        assert!(result.is_err());

        // Bounds are inclusive
        let result = conn.execute(
            "INSERT INTO patients (local_id, name, age, sex) VALUES ('c', 'Ana', 32767, 'F')",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_required_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO patients (local_id, age, sex) VALUES ('a', 30, 'F')",
            [],
        );
        assert!(result.is_err());
    }
}
