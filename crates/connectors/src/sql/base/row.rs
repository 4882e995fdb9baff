use crate::sql::base::error::DbError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::records::row::Row;
use mysql_async::{Row as MySqlRow, Value as MySqlValue, consts::ColumnType};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use tokio_postgres::Row as PgRow;
use tracing::warn;
use uuid::Uuid;

/// A borrowed driver row, read column by column into a JSON [`Row`].
pub enum DbRow<'a> {
    MySqlRow(&'a MySqlRow),
    PostgresRow(&'a PgRow),
}

impl DbRow<'_> {
    pub fn to_json_row(&self) -> Result<Row, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_row(row),
            DbRow::PostgresRow(row) => pg_row(row),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        match self {
            DbRow::MySqlRow(row) => row
                .columns_ref()
                .iter()
                .map(|col| col.name_str().into_owned())
                .collect(),
            DbRow::PostgresRow(row) => row
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
        }
    }
}

fn mysql_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut out = Row::new();
    for (idx, col) in row.columns_ref().iter().enumerate() {
        let name = col.name_str().into_owned();
        let value = match row.as_ref(idx) {
            Some(raw) => mysql_value_to_json(&name, raw, col.column_type())?,
            None => Value::Null,
        };
        out.insert(name, value);
    }
    Ok(out)
}

/// Converts one MySQL cell. Text protocol results arrive as bytes, so the
/// column type decides how they are read.
pub(crate) fn mysql_value_to_json(
    column: &str,
    value: &MySqlValue,
    ty: ColumnType,
) -> Result<Value, DbError> {
    let json = match value {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(i) => Value::from(*i),
        MySqlValue::UInt(u) => Value::from(*u),
        MySqlValue::Float(f) => float(*f as f64),
        MySqlValue::Double(d) => float(*d),
        MySqlValue::Bytes(bytes) => mysql_bytes(column, bytes, ty)?,
        MySqlValue::Date(y, mo, d, h, mi, s, us) => {
            if matches!(ty, ColumnType::MYSQL_TYPE_DATE) {
                Value::String(format!("{y:04}-{mo:02}-{d:02}"))
            } else if *us > 0 {
                Value::String(format!(
                    "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
                ))
            } else {
                Value::String(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
            }
        }
        MySqlValue::Time(neg, days, h, mi, s, us) => {
            let sign = if *neg { "-" } else { "" };
            let hours = *days * 24 + u32::from(*h);
            if *us > 0 {
                Value::String(format!("{sign}{hours:02}:{mi:02}:{s:02}.{us:06}"))
            } else {
                Value::String(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
            }
        }
    };
    Ok(json)
}

fn mysql_bytes(column: &str, bytes: &[u8], ty: ColumnType) -> Result<Value, DbError> {
    use ColumnType::*;

    match ty {
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_GEOMETRY | MYSQL_TYPE_BIT => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Ok(Value::String(text)),
            Err(_) => {
                warn!(column, "Binary column is not valid UTF-8; decoding lossily");
                Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
            }
        },
        _ => {
            let text = String::from_utf8(bytes.to_vec())?;
            Ok(match ty {
                MYSQL_TYPE_JSON => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
                | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => number_or_string(text),
                MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE | MYSQL_TYPE_DECIMAL
                | MYSQL_TYPE_NEWDECIMAL => number_or_string(text),
                _ => Value::String(text),
            })
        }
    }
}

fn number_or_string(text: String) -> Value {
    match text.parse::<Number>() {
        Ok(number) => Value::Number(number),
        Err(_) => Value::String(text),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn pg_row(row: &PgRow) -> Result<Row, DbError> {
    let mut out = Row::new();
    for (idx, col) in row.columns().iter().enumerate() {
        let ty = col.type_().name();
        let value = match ty {
            "int2" => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
            "int4" => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
            "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
            "oid" => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
            "float4" => row.try_get::<_, Option<f32>>(idx)?.map(|f| float(f as f64)),
            "float8" => row.try_get::<_, Option<f64>>(idx)?.map(float),
            "numeric" => row
                .try_get::<_, Option<Decimal>>(idx)?
                .map(|d| number_or_string(d.normalize().to_string())),
            "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
            "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?,
            "uuid" => row
                .try_get::<_, Option<Uuid>>(idx)?
                .map(|u| Value::String(u.to_string())),
            "timestamptz" => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)?
                .map(|ts| Value::String(ts.to_rfc3339())),
            "timestamp" => row
                .try_get::<_, Option<NaiveDateTime>>(idx)?
                .map(|ts| Value::String(ts.to_string())),
            "date" => row
                .try_get::<_, Option<NaiveDate>>(idx)?
                .map(|d| Value::String(d.to_string())),
            "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(|bytes| {
                warn!(column = col.name(), "Decoding bytea column as text");
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }),
            _ => match row.try_get::<_, Option<String>>(idx) {
                Ok(text) => text.map(Value::String),
                Err(_) => {
                    warn!(column = col.name(), ty, "Unsupported column type; reading as null");
                    None
                }
            },
        };
        out.insert(col.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}
