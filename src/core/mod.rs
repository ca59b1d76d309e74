pub mod error;
pub mod types;
pub mod value;

pub use error::{MapperError, Result};
pub use types::{DataType, PropertyType, Row, SqlType};
pub use value::Value;
