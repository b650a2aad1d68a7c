use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use crate::backend::BackendResponse;
use crate::types::{ColumnInfo, ColumnType, RowValues};

use super::params::sqlite_value_to_row_value;

/// Map a declared column type onto the types `Results::verify` compares.
///
/// Follows `SQLite`'s affinity rules, with the conventional `BOOLEAN`,
/// `DATE`/`TIME`/`TIMESTAMP` and `JSON` declarations recognised first.
#[must_use]
pub fn column_type_for_decl(decl: &str) -> ColumnType {
    let upper = decl.to_ascii_uppercase();
    if upper.contains("BOOL") {
        ColumnType::Bool
    } else if upper.contains("DATE") || upper.contains("TIME") {
        ColumnType::Timestamp
    } else if upper.contains("JSON") {
        ColumnType::Json
    } else if upper.contains("INT") {
        ColumnType::Int
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        ColumnType::Text
    } else if upper.is_empty() || upper.contains("BLOB") {
        ColumnType::Blob
    } else {
        // REAL, FLOAT, DOUBLE and NUMERIC affinity
        ColumnType::Float
    }
}

/// Prepare and run one statement.
///
/// Statements without result columns are executed and report the changed row count;
/// everything else is queried. Columns without a declared type (expressions) take
/// the storage class of their first non-NULL value, or `Untyped` if there is none.
///
/// # Errors
/// Returns the rusqlite error from preparation, binding or stepping.
pub fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<BackendResponse, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        return Ok(BackendResponse::command(affected));
    }

    let declared: Vec<(String, Option<ColumnType>)> = stmt
        .columns()
        .iter()
        .map(|col| (col.name().to_string(), col.decl_type().map(column_type_for_decl)))
        .collect();
    let column_count = declared.len();

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    let mut rows: Vec<Vec<RowValues>> = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let value: Value = row.get(idx)?;
            row_values.push(sqlite_value_to_row_value(value));
        }
        rows.push(row_values);
    }

    let columns = declared
        .into_iter()
        .enumerate()
        .map(|(idx, (name, decl))| {
            let column_type = decl.unwrap_or_else(|| {
                rows.iter()
                    .map(|row| &row[idx])
                    .find(|value| !value.is_null())
                    .map_or(ColumnType::Untyped, RowValues::column_type)
            });
            ColumnInfo::new(name, column_type)
        })
        .collect();

    Ok(BackendResponse {
        columns,
        affected_rows: rows.len(),
        rows,
    })
}
