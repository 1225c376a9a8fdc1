//! Message version converter registry (C10, §4.7).
//!
//! [`ConverterRegistry`] finds a shortest chain of registered
//! [`MessageConverter`]s between two [`MessageVersion`]s and applies it;
//! [`validation::validate`] checks a message's fields against a declared
//! target version independently of any conversion.

pub mod converter;
pub mod registry;
pub mod validation;

pub use converter::{ConversionPath, ConversionStep, MessageConverter, MessageVersion, Payload};
pub use registry::ConverterRegistry;
pub use validation::{FieldRule, SchemaRules, ValidationIssue, ValidationReport, validate};
