//! Decoding of TDS result rows into [`Row`]s.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql};

use crate::core::{Row, SqlNullType, SqlValue};
use crate::error::{InsertError, Result};

/// Convert a tiberius result row into a name→value row.
pub(crate) fn decode_row(row: tiberius::Row) -> Result<Row> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut out = Row::with_capacity(names.len());
    for (name, data) in names.into_iter().zip(row) {
        let value = column_data_to_sql_value(&data)
            .map_err(|e| InsertError::retrieval("result set", format!("column {}: {}", name, e)))?;
        out.push(name, value);
    }
    Ok(out)
}

fn column_data_to_sql_value(data: &ColumnData<'static>) -> std::result::Result<SqlValue<'static>, String> {
    let value = match data {
        ColumnData::Bit(v) => v.map_or(SqlValue::Null(SqlNullType::Bool), SqlValue::Bool),
        ColumnData::U8(v) => v.map_or(SqlValue::Null(SqlNullType::I16), |v| SqlValue::I16(i16::from(v))),
        ColumnData::I16(v) => v.map_or(SqlValue::Null(SqlNullType::I16), SqlValue::I16),
        ColumnData::I32(v) => v.map_or(SqlValue::Null(SqlNullType::I32), SqlValue::I32),
        ColumnData::I64(v) => v.map_or(SqlValue::Null(SqlNullType::I64), SqlValue::I64),
        ColumnData::F32(v) => v.map_or(SqlValue::Null(SqlNullType::F32), SqlValue::F32),
        ColumnData::F64(v) => v.map_or(SqlValue::Null(SqlNullType::F64), SqlValue::F64),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null(SqlNullType::Uuid), SqlValue::Uuid),
        ColumnData::String(v) => v.as_ref().map_or(SqlValue::Null(SqlNullType::String), |s| {
            SqlValue::Text(Cow::Owned(s.to_string()))
        }),
        ColumnData::Binary(v) => v.as_ref().map_or(SqlValue::Null(SqlNullType::Bytes), |b| {
            SqlValue::Bytes(Cow::Owned(b.to_vec()))
        }),
        ColumnData::Numeric(_) => Decimal::from_sql(data)
            .map_err(|e| e.to_string())?
            .map_or(SqlValue::Null(SqlNullType::Decimal), SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(|e| e.to_string())?
                .map_or(SqlValue::Null(SqlNullType::DateTime), SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(|e| e.to_string())?
            .map_or(SqlValue::Null(SqlNullType::Date), SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(|e| e.to_string())?
            .map_or(SqlValue::Null(SqlNullType::Time), SqlValue::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .map_err(|e| e.to_string())?
            .map_or(SqlValue::Null(SqlNullType::DateTimeOffset), SqlValue::DateTimeOffset),
        other => return Err(format!("unsupported column type {:?}", other)),
    };
    Ok(value)
}
