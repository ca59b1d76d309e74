use super::{MapperError, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type Row = Vec<Value>;

/// Runtime kind of a property or column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    /// Accepts any value; the root of every other type.
    Any,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Any, _) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Any => write!(f, "ANY"),
        }
    }
}

/// Declared type of a getter return or setter argument.
///
/// A non-nullable property behaves like a primitive: assigning `Null` to it
/// is a binding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyType {
    pub data_type: DataType,
    pub nullable: bool,
}

impl PropertyType {
    pub const fn primitive(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: false,
        }
    }

    pub const fn nullable(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: true,
        }
    }

    pub const fn any() -> Self {
        Self::nullable(DataType::Any)
    }

    pub fn is_assignable_from(&self, other: &PropertyType) -> bool {
        if self == other {
            return true;
        }
        self.data_type == DataType::Any && self.nullable
    }

    /// Converts `value` into the representation this type stores, handing
    /// the value back unchanged when it cannot be coerced.
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, Value> {
        match (self.data_type, value) {
            (_, Value::Null) if self.nullable => Ok(Value::Null),
            (_, Value::Null) => Err(Value::Null),
            (DataType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (data_type, value) if data_type.is_compatible(&value) => Ok(value),
            (_, value) => Err(value),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}", self.data_type)
        } else {
            write!(f, "{} NOT NULL", self.data_type)
        }
    }
}

/// Target column type of a positional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    Blob,
    Clob,
    Boolean,
    Other,
    /// Generic "unknown type" marker used for typed NULL writes.
    Null,
}

impl SqlType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bit => "BIT",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Numeric => "NUMERIC",
            Self::Decimal => "DECIMAL",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::LongVarchar => "LONGVARCHAR",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Binary => "BINARY",
            Self::VarBinary => "VARBINARY",
            Self::Blob => "BLOB",
            Self::Clob => "CLOB",
            Self::Boolean => "BOOLEAN",
            Self::Other => "OTHER",
            Self::Null => "NULL",
        }
    }

    /// Natural value kind for columns of this type.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bit | Self::Boolean => DataType::Boolean,
            Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt => DataType::Integer,
            Self::Float | Self::Real | Self::Double | Self::Numeric | Self::Decimal => {
                DataType::Float
            }
            Self::Char
            | Self::Varchar
            | Self::LongVarchar
            | Self::Date
            | Self::Time
            | Self::Timestamp
            | Self::Clob => DataType::Text,
            Self::Binary | Self::VarBinary | Self::Blob | Self::Other | Self::Null => DataType::Any,
        }
    }
}

impl FromStr for SqlType {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        let sql_type = match s.trim().to_ascii_uppercase().as_str() {
            "BIT" => Self::Bit,
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "INTEGER" | "INT" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "FLOAT" => Self::Float,
            "REAL" => Self::Real,
            "DOUBLE" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "DECIMAL" => Self::Decimal,
            "CHAR" => Self::Char,
            "VARCHAR" | "VARCHAR2" | "NVARCHAR" => Self::Varchar,
            "LONGVARCHAR" => Self::LongVarchar,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" | "DATETIME" => Self::Timestamp,
            "BINARY" => Self::Binary,
            "VARBINARY" => Self::VarBinary,
            "BLOB" => Self::Blob,
            "CLOB" => Self::Clob,
            "BOOLEAN" => Self::Boolean,
            "OTHER" => Self::Other,
            "NULL" => Self::Null,
            other => {
                return Err(MapperError::Configuration(format!(
                    "Unknown column type '{}'",
                    other
                )))
            }
        };
        Ok(sql_type)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_compatibility() {
        let int_type = DataType::Integer;
        assert!(int_type.is_compatible(&Value::Integer(42)));
        assert!(int_type.is_compatible(&Value::Null));
        assert!(!int_type.is_compatible(&Value::Text("hello".into())));
        assert!(!int_type.is_compatible(&Value::Float(1.2)));
    }

    #[test]
    fn test_primitive_rejects_null() {
        let primitive = PropertyType::primitive(DataType::Integer);
        assert_eq!(primitive.coerce(Value::Null), Err(Value::Null));
        assert_eq!(
            PropertyType::nullable(DataType::Integer).coerce(Value::Null),
            Ok(Value::Null)
        );
    }

    #[test]
    fn test_float_widens_integer() {
        let float = PropertyType::primitive(DataType::Float);
        assert!(matches!(float.coerce(Value::Integer(3)), Ok(Value::Float(f)) if f == 3.0));
        assert_eq!(
            PropertyType::primitive(DataType::Integer).coerce(Value::Float(1.2)),
            Err(Value::Float(1.2))
        );
    }

    #[test]
    fn test_sql_type_parsing() {
        assert_eq!("varchar".parse::<SqlType>().unwrap(), SqlType::Varchar);
        assert_eq!("INT".parse::<SqlType>().unwrap(), SqlType::Integer);
        assert!("GEOMETRY".parse::<SqlType>().is_err());
    }

    #[test]
    fn test_assignability() {
        let any = PropertyType::any();
        let text = PropertyType::nullable(DataType::Text);
        let int = PropertyType::primitive(DataType::Integer);
        assert!(any.is_assignable_from(&text));
        assert!(!text.is_assignable_from(&int));
        assert!(!int.is_assignable_from(&text));
    }
}
