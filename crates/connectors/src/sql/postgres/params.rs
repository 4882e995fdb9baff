use crate::sql::base::error::DbError;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::{error::Error, str::FromStr};
use tokio_postgres::types::{IsNull, Json as PgJson, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// A JSON parameter, encoded for whatever type the server inferred for its
/// placeholder.
#[derive(Debug)]
pub struct PgParam(Value);

type BoxError = Box<dyn Error + Sync + Send>;

impl PgParam {
    pub fn from_value(value: Value) -> Self {
        PgParam(value)
    }

    fn mismatch(&self, ty: &Type) -> BoxError {
        Box::new(DbError::Conversion {
            column: self.0.to_string(),
            ty: ty.name().to_string(),
        })
    }

    fn as_i64(&self, ty: &Type) -> Result<i64, BoxError> {
        match &self.0 {
            Value::Number(n) => n.as_i64().ok_or_else(|| self.mismatch(ty)),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::String(s) => s.parse().map_err(|_| self.mismatch(ty)),
            _ => Err(self.mismatch(ty)),
        }
    }

    fn as_f64(&self, ty: &Type) -> Result<f64, BoxError> {
        match &self.0 {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.mismatch(ty)),
            Value::String(s) => s.parse().map_err(|_| self.mismatch(ty)),
            _ => Err(self.mismatch(ty)),
        }
    }

    fn as_text(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl ToSql for PgParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::INT2 => i16::try_from(self.as_i64(ty)?)
                .map_err(|_| self.mismatch(ty))?
                .to_sql(ty, out),
            Type::INT4 => i32::try_from(self.as_i64(ty)?)
                .map_err(|_| self.mismatch(ty))?
                .to_sql(ty, out),
            Type::INT8 => self.as_i64(ty)?.to_sql(ty, out),
            Type::FLOAT4 => (self.as_f64(ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.as_f64(ty)?.to_sql(ty, out),
            Type::NUMERIC => Decimal::from_str(&self.as_text())
                .map_err(|_| self.mismatch(ty))?
                .to_sql(ty, out),
            Type::BOOL => match &self.0 {
                Value::Bool(b) => b.to_sql(ty, out),
                _ => (self.as_i64(ty)? != 0).to_sql(ty, out),
            },
            Type::UUID => Uuid::parse_str(&self.as_text())
                .map_err(|_| self.mismatch(ty))?
                .to_sql(ty, out),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(&self.as_text())
                .map_err(|_| self.mismatch(ty))?
                .with_timezone(&Utc)
                .to_sql(ty, out),
            Type::TIMESTAMP => parse_naive_timestamp(&self.as_text())
                .ok_or_else(|| self.mismatch(ty))?
                .to_sql(ty, out),
            Type::DATE => NaiveDate::from_str(&self.as_text())
                .map_err(|_| self.mismatch(ty))?
                .to_sql(ty, out),
            Type::JSON | Type::JSONB => PgJson(&self.0).to_sql(ty, out),
            _ => self.as_text().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn parse_naive_timestamp(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    pub fn from_values(values: &[Value]) -> Self {
        Self {
            params: values.iter().cloned().map(PgParam::from_value).collect(),
        }
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: Value, ty: Type) -> Result<(IsNull, BytesMut), BoxError> {
        let mut out = BytesMut::new();
        let is_null = PgParam::from_value(value).to_sql(&ty, &mut out)?;
        Ok((is_null, out))
    }

    #[test]
    fn test_integers_follow_column_width() {
        let (_, out) = encode(json!(7), Type::INT4).unwrap();
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let (_, out) = encode(json!(7), Type::INT8).unwrap();
        assert_eq!(&out[..], &7i64.to_be_bytes());

        assert!(encode(json!(70000), Type::INT2).is_err());
    }

    #[test]
    fn test_null_and_text() {
        let (is_null, out) = encode(Value::Null, Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());

        let (_, out) = encode(json!("Alice"), Type::VARCHAR).unwrap();
        assert_eq!(&out[..], b"Alice");

        let (_, out) = encode(json!(12), Type::TEXT).unwrap();
        assert_eq!(&out[..], b"12");
    }

    #[test]
    fn test_strings_parse_into_typed_columns() {
        assert!(encode(json!("2024-02-09"), Type::DATE).is_ok());
        assert!(encode(json!("2024-02-09 10:00:00"), Type::TIMESTAMP).is_ok());
        assert!(encode(json!("2024-02-09T10:00:00+02:00"), Type::TIMESTAMPTZ).is_ok());
        assert!(encode(json!("12.50"), Type::NUMERIC).is_ok());
        assert!(encode(json!("not a uuid"), Type::UUID).is_err());
    }

    #[test]
    fn test_store_keeps_order() {
        let store = PgParamStore::from_values(&[json!(1), json!("x"), Value::Null]);
        assert_eq!(store.as_refs().len(), 3);
        assert_eq!(store.params[1].0, json!("x"));
    }
}
