//! Error type shared by the table and analysis layers.

use thiserror::Error;

/// Failures raised while joining, grouping or summarizing sample tables.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregateError {
    /// A column required by the operation is not in the table header.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// The fact and label tables share no identifiers on the join key.
    #[error("no rows matched on join key '{0}'")]
    SchemaMismatch(String),

    /// A ratio was requested over an empty denominator.
    #[error("division by zero while computing {0}")]
    DivisionByZero(String),

    /// A predicate cell could not be reduced to true/false.
    #[error("value '{value}' in column '{column}' is not boolean-like")]
    NotBoolean { column: String, value: String },

    /// A cell that must hold a number could not be parsed.
    #[error("value '{value}' in column '{column}' is not numeric")]
    NotNumeric { column: String, value: String },

    /// The label table holds more than one row for an identifier.
    #[error("identifier '{0}' appears more than once in the label table")]
    DuplicateKey(String),

    /// Every group was filtered out.
    #[error("no groups left after filtering on '{0}'")]
    EmptyResult(String),
}

/// Result alias for the analysis layer.
pub type AggregateResult<T> = std::result::Result<T, AggregateError>;
