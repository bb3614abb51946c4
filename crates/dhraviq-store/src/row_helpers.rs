use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a JSON string column, returning CorruptRow on parse failure.
pub fn parse_json(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_valid() {
        let value = parse_json(r#"{"a": 1}"#, "documents", "body").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn parse_json_invalid_is_corrupt_row() {
        let err = parse_json("{oops", "documents", "body").unwrap_err();
        match err {
            StoreError::CorruptRow { table, column, .. } => {
                assert_eq!(table, "documents");
                assert_eq!(column, "body");
            }
            other => panic!("expected CorruptRow, got {other:?}"),
        }
    }
}
