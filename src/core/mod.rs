pub mod error;

pub use error::{
    AdapterError, AdapterResult, ArchivistError, ErrorClass, Result, ValidationCode,
    ValidationError, Violation,
};
