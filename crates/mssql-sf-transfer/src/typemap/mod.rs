//! Type mapping between MSSQL and Snowflake.

/// Map an MSSQL data type to a Snowflake type.
///
/// `max_length`, `precision` and `scale` come from
/// `INFORMATION_SCHEMA.COLUMNS` (`max_length` is -1 for `varchar(max)`).
pub fn mssql_to_snowflake(mssql_type: &str, max_length: i32, precision: i32, scale: i32) -> String {
    match mssql_type.to_lowercase().as_str() {
        // Boolean
        "bit" => "BOOLEAN".to_string(),

        // Integer types - Snowflake stores all of these as NUMBER(p,0)
        "tinyint" => "NUMBER(3,0)".to_string(),
        "smallint" => "NUMBER(5,0)".to_string(),
        "int" => "NUMBER(10,0)".to_string(),
        "bigint" => "NUMBER(19,0)".to_string(),

        // Exact numerics
        "decimal" | "numeric" => {
            if precision > 0 {
                format!("NUMBER({},{})", precision, scale)
            } else {
                "NUMBER".to_string()
            }
        }
        "money" => "NUMBER(19,4)".to_string(),
        "smallmoney" => "NUMBER(10,4)".to_string(),

        // Floating point
        "float" | "real" => "FLOAT".to_string(),

        // String types - Snowflake VARCHAR is always UTF-8
        "char" | "nchar" | "varchar" | "nvarchar" => {
            if max_length > 0 {
                format!("VARCHAR({})", max_length)
            } else {
                // -1 means (max)
                "STRING".to_string()
            }
        }
        "text" | "ntext" => "STRING".to_string(),

        // Binary types
        "binary" | "varbinary" | "image" => "BINARY".to_string(),

        // Date/time types - everything timestamp-like lands in TIMESTAMP_NTZ;
        // the adapter normalizes offsets to UTC before load
        "date" => "DATE".to_string(),
        "time" => "TIME".to_string(),
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" => "TIMESTAMP_NTZ".to_string(),
        "datetimeoffset" => "TIMESTAMP_NTZ".to_string(),

        // GUID - Snowflake has no UUID type
        "uniqueidentifier" => "STRING".to_string(),

        // Semi-structured / spatial fall back to text
        "xml" | "geometry" | "geography" => "STRING".to_string(),

        // Default fallback
        _ => "STRING".to_string(),
    }
}

/// The family a Snowflake type string belongs to, used by the adapter to
/// decide how to normalize a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Number,
    Float,
    Boolean,
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
}

/// Classify a Snowflake type string (as produced by [`mssql_to_snowflake`]
/// or written by hand in a mapping's `type` hint).
pub fn type_family(snowflake_type: &str) -> TypeFamily {
    let upper = snowflake_type.trim().to_uppercase();
    let base = upper.split('(').next().unwrap_or("").trim();
    match base {
        "NUMBER" | "NUMERIC" | "DECIMAL" | "INT" | "INTEGER" | "BIGINT" | "SMALLINT"
        | "TINYINT" | "BYTEINT" => TypeFamily::Number,
        "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "REAL" => TypeFamily::Float,
        "BOOLEAN" => TypeFamily::Boolean,
        "BINARY" | "VARBINARY" => TypeFamily::Binary,
        "DATE" => TypeFamily::Date,
        "TIME" => TypeFamily::Time,
        "TIMESTAMP" | "TIMESTAMP_NTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_TZ" | "DATETIME" => {
            TypeFamily::Timestamp
        }
        // VARCHAR, STRING, TEXT, CHAR and anything unknown
        _ => TypeFamily::Text,
    }
}
