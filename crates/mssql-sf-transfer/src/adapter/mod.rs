//! Value normalization between source and target type systems.
//!
//! `normalize` is a pure function: no I/O, no side effects. The reader runs
//! every extracted value through it before a [`Record`](crate::value::Record)
//! is produced, so the loader only ever sees target-compatible values.

use chrono::{NaiveDateTime, Timelike, Utc};
use rust_decimal::Decimal;

use crate::error::{Result, TransferError};
use crate::typemap::{type_family, TypeFamily};
use crate::value::SqlValue;

/// Snowflake NUMBER tops out at 38 digits of precision.
const MAX_NUMBER_PRECISION: u32 = 38;

/// Normalize one source value to its target representation.
///
/// `column` is only used for error context. `target_type` is a Snowflake
/// type string, either derived from the source column type via
/// [`crate::typemap::mssql_to_snowflake`] or supplied as a mapping hint.
///
/// Nulls pass through as nulls for every scalar type - never as a sentinel.
pub fn normalize(column: &str, value: SqlValue, target_type: &str) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(value);
    }

    match type_family(target_type) {
        TypeFamily::Timestamp => normalize_timestamp(column, value),
        TypeFamily::Number => normalize_number(column, value, target_type),
        TypeFamily::Float => normalize_float(column, value),
        TypeFamily::Boolean => normalize_boolean(column, value),
        TypeFamily::Text => normalize_text(column, value),
        TypeFamily::Binary => normalize_binary(column, value),
        TypeFamily::Date | TypeFamily::Time => Ok(value),
    }
}

/// Drop sub-microsecond digits. Flooring the fractional second can never
/// move the value across a calendar-date boundary.
fn truncate_to_micros(dt: NaiveDateTime) -> NaiveDateTime {
    let nanos = dt.and_utc().timestamp_subsec_nanos();
    let truncated = nanos - (nanos % 1_000);
    dt.with_nanosecond(truncated).unwrap_or(dt)
}

fn normalize_timestamp(column: &str, value: SqlValue) -> Result<SqlValue> {
    match value {
        // Canonical representation is timezone-naive UTC.
        SqlValue::DateTimeOffset(dto) => Ok(SqlValue::DateTime(truncate_to_micros(
            dto.with_timezone(&Utc).naive_utc(),
        ))),
        SqlValue::DateTime(dt) => Ok(SqlValue::DateTime(truncate_to_micros(dt))),
        SqlValue::Date(d) => Ok(SqlValue::DateTime(d.and_time(chrono::NaiveTime::MIN))),
        other => Err(TransferError::SchemaMismatch {
            table: String::new(),
            message: format!(
                "column {}: cannot adapt {:?} to a timestamp target",
                column, other
            ),
        }),
    }
}

fn normalize_number(column: &str, value: SqlValue, target_type: &str) -> Result<SqlValue> {
    let decimal = match value {
        SqlValue::I16(v) => Decimal::from(v),
        SqlValue::I32(v) => Decimal::from(v),
        SqlValue::I64(v) => Decimal::from(v),
        SqlValue::Decimal(d) => d,
        SqlValue::F32(f) => float_to_decimal(column, f as f64)?,
        SqlValue::F64(f) => float_to_decimal(column, f)?,
        SqlValue::Bool(b) => Decimal::from(u8::from(b)),
        other => {
            return Err(TransferError::SchemaMismatch {
                table: String::new(),
                message: format!(
                    "column {}: cannot adapt {:?} to a numeric target",
                    column, other
                ),
            })
        }
    };

    check_number_fits(column, &decimal, target_type)?;
    Ok(SqlValue::Decimal(decimal))
}

fn float_to_decimal(column: &str, f: f64) -> Result<Decimal> {
    if !f.is_finite() {
        return Err(TransferError::PrecisionLoss {
            column: column.to_string(),
            message: format!("non-finite value {} cannot be stored as NUMBER", f),
        });
    }
    Decimal::from_f64_retain(f).ok_or_else(|| TransferError::PrecisionLoss {
        column: column.to_string(),
        message: format!("{} exceeds NUMBER precision", f),
    })
}

/// Fail rather than silently truncate when a value exceeds the declared or
/// maximum NUMBER precision.
fn check_number_fits(column: &str, d: &Decimal, target_type: &str) -> Result<()> {
    let scale = d.scale();
    let mantissa = d.mantissa().unsigned_abs();
    let digits = if mantissa == 0 {
        1
    } else {
        mantissa.to_string().len() as u32
    };
    let integer_digits = digits.saturating_sub(scale);

    let (precision, decl_scale) =
        number_precision(target_type).unwrap_or((MAX_NUMBER_PRECISION, scale));

    if integer_digits > precision.saturating_sub(decl_scale) {
        return Err(TransferError::PrecisionLoss {
            column: column.to_string(),
            message: format!(
                "{} has {} integer digits but target {} allows {}",
                d,
                integer_digits,
                target_type,
                precision.saturating_sub(decl_scale)
            ),
        });
    }
    if scale > decl_scale {
        return Err(TransferError::PrecisionLoss {
            column: column.to_string(),
            message: format!(
                "{} has scale {} but target {} allows {}",
                d, scale, target_type, decl_scale
            ),
        });
    }
    Ok(())
}

/// Parse `(p,s)` out of a NUMBER-family type string. `NUMBER` without
/// arguments means the 38-digit maximum.
fn number_precision(target_type: &str) -> Option<(u32, u32)> {
    let open = target_type.find('(')?;
    let close = target_type.rfind(')')?;
    let args = &target_type[open + 1..close];
    let mut it = args.splitn(2, ',');
    let precision: u32 = it.next()?.trim().parse().ok()?;
    let scale: u32 = it.next().map_or(Some(0), |s| s.trim().parse().ok())?;
    Some((precision.min(MAX_NUMBER_PRECISION), scale))
}

fn normalize_float(column: &str, value: SqlValue) -> Result<SqlValue> {
    use rust_decimal::prelude::ToPrimitive;
    match value {
        SqlValue::F64(_) => Ok(value),
        SqlValue::F32(f) => Ok(SqlValue::F64(f as f64)),
        SqlValue::I16(v) => Ok(SqlValue::F64(v as f64)),
        SqlValue::I32(v) => Ok(SqlValue::F64(v as f64)),
        SqlValue::I64(v) => Ok(SqlValue::F64(v as f64)),
        SqlValue::Decimal(d) => d.to_f64().map(SqlValue::F64).ok_or_else(|| {
            TransferError::PrecisionLoss {
                column: column.to_string(),
                message: format!("{} is not representable as FLOAT", d),
            }
        }),
        other => Err(TransferError::SchemaMismatch {
            table: String::new(),
            message: format!(
                "column {}: cannot adapt {:?} to a float target",
                column, other
            ),
        }),
    }
}

fn normalize_boolean(column: &str, value: SqlValue) -> Result<SqlValue> {
    match value {
        SqlValue::Bool(_) => Ok(value),
        SqlValue::I16(v) => Ok(SqlValue::Bool(v != 0)),
        SqlValue::I32(v) => Ok(SqlValue::Bool(v != 0)),
        SqlValue::I64(v) => Ok(SqlValue::Bool(v != 0)),
        other => Err(TransferError::SchemaMismatch {
            table: String::new(),
            message: format!(
                "column {}: cannot adapt {:?} to a boolean target",
                column, other
            ),
        }),
    }
}

fn normalize_text(column: &str, value: SqlValue) -> Result<SqlValue> {
    match value {
        SqlValue::String(s) => {
            // Interior NUL has no representation in the load path; failing
            // beats silently dropping the character.
            if s.contains('\0') {
                return Err(TransferError::Encoding {
                    column: column.to_string(),
                    message: "text contains a NUL character, which the target cannot represent"
                        .into(),
                });
            }
            Ok(SqlValue::String(s))
        }
        SqlValue::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => normalize_text(column, SqlValue::String(s)),
            Err(e) => Err(TransferError::Encoding {
                column: column.to_string(),
                message: format!("bytes are not valid UTF-8: {}", e),
            }),
        },
        SqlValue::Uuid(u) => Ok(SqlValue::String(u.to_string())),
        // Numbers, dates etc. mapped onto a text column keep their native
        // representation; the loader renders them as text literals.
        other => Ok(other),
    }
}

fn normalize_binary(column: &str, value: SqlValue) -> Result<SqlValue> {
    match value {
        SqlValue::Bytes(_) => Ok(value),
        SqlValue::String(s) => Ok(SqlValue::Bytes(s.into_bytes())),
        other => Err(TransferError::SchemaMismatch {
            table: String::new(),
            message: format!(
                "column {}: cannot adapt {:?} to a binary target",
                column, other
            ),
        }),
    }
}
