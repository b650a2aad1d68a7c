use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::Type;
use tokio_postgres::{Row, Statement};

use crate::backend::BackendResponse;
use crate::types::{ColumnInfo, ColumnType, RowValues};

/// Map a Postgres column type onto the types `Results::verify` compares.
#[must_use]
pub fn column_type_for(ty: &Type) -> ColumnType {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => ColumnType::Int,
        Type::FLOAT4 | Type::FLOAT8 => ColumnType::Float,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::INET => ColumnType::Text,
        Type::BOOL => ColumnType::Bool,
        Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE => ColumnType::Timestamp,
        Type::JSON | Type::JSONB => ColumnType::Json,
        Type::BYTEA => ColumnType::Blob,
        _ => ColumnType::Other(ty.name().to_string()),
    }
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns the driver error if the column cannot be decoded as its reported type.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, tokio_postgres::Error> {
    let type_info = row.columns()[idx].type_();

    let value = match *type_info {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| RowValues::Timestamp(v.and_time(NaiveTime::MIN))),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        Type::INET => row
            .try_get::<_, Option<IpAddr>>(idx)?
            .map(|v| RowValues::Text(v.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text)
        }
        // Unmapped types report `ColumnType::Other`, which never verifies, so the
        // value itself is best effort.
        _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(RowValues::Text),
    };
    Ok(value.unwrap_or(RowValues::Null))
}

/// Build a backend response using statement metadata for column names and types.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_response(stmt: &Statement, rows: &[Row]) -> Result<BackendResponse, tokio_postgres::Error> {
    let columns: Vec<ColumnInfo> = stmt
        .columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), column_type_for(col.type_())))
        .collect();
    let column_count = columns.len();

    let mut extracted = Vec::with_capacity(rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        extracted.push(row_values);
    }

    Ok(BackendResponse {
        columns,
        affected_rows: extracted.len(),
        rows: extracted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_types() {
        assert_eq!(column_type_for(&Type::INT4), ColumnType::Int);
        assert_eq!(column_type_for(&Type::TIMESTAMPTZ), ColumnType::Timestamp);
        assert_eq!(column_type_for(&Type::INET), ColumnType::Text);
        assert_eq!(column_type_for(&Type::JSONB), ColumnType::Json);
        assert_eq!(
            column_type_for(&Type::NUMERIC),
            ColumnType::Other("numeric".into())
        );
    }
}
