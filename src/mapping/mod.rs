pub mod null_probe;
pub mod parameter;
pub mod result;
pub mod statement;
pub mod type_handler;

pub use null_probe::{MetadataField, NullValueProbe, NullWrite, VendorQuirks, VendorRule};
pub use parameter::{ParameterMap, ParameterMapping, ParameterMode};
pub use result::{
    FactoryScope, ResultFactoryContext, ResultMap, ResultMapping, ResultObject, ResultObjectFactory,
    ResultType,
};
pub use statement::{ConnectionMetadata, StatementHandle};
pub use type_handler::{
    CustomTypeHandler, ParameterSetter, StandardTypeHandler, TypeHandler, TypeHandlerCallback,
    TypeHandlerRegistry,
};
