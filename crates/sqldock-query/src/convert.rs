//! Wire-type to JSON value conversion.
//!
//! Conversion is driven by the column's declared type name. Types without
//! a faithful JSON representation in the value model (numeric, bytea,
//! arrays, user-defined types) decode to null rather than a lossy guess.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::debug;
use tokio_postgres::Row as PgRow;

use sqldock_commons::{GatewayError, Row, SqlValue};

/// Convert one engine row into the ordered JSON row model.
pub fn convert_row(pg_row: &PgRow) -> Result<Row, GatewayError> {
    let mut row = Row::new();
    for (idx, column) in pg_row.columns().iter().enumerate() {
        let value = convert_value(pg_row, idx, column.type_().name()).map_err(|e| {
            GatewayError::internal(format!(
                "failed to decode column '{}' ({}): {}",
                column.name(),
                column.type_().name(),
                e
            ))
        })?;
        row.push(column.name(), value);
    }
    Ok(row)
}

fn convert_value(
    row: &PgRow,
    idx: usize,
    type_name: &str,
) -> Result<SqlValue, tokio_postgres::Error> {
    let value = match type_name {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(|v| SqlValue::Int(v as i64)),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(|v| SqlValue::Int(v as i64)),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int),
        "oid" => row.try_get::<_, Option<u32>>(idx)?.map(|v| SqlValue::Int(v as i64)),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(|v| SqlValue::Float(v as f64)),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Float),
        "text" | "varchar" | "bpchar" | "name" | "unknown" => {
            row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
        }
        "json" | "jsonb" => row.try_get::<_, Option<serde_json::Value>>(idx)?.map(SqlValue::Json),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| SqlValue::Text(v.to_rfc3339())),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| SqlValue::Text(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| SqlValue::Text(v.format("%Y-%m-%d").to_string())),
        "time" => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|v| SqlValue::Text(v.format("%H:%M:%S%.f").to_string())),
        other => {
            debug!("No JSON representation for column type '{}', returning null", other);
            None
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    // Engine rows cannot be constructed without a live connection, so the
    // per-type paths are covered by the serverful integration tests. The
    // serialization of the value model itself is tested where it lives.
}
