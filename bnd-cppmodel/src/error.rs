//! Error types for model building.

use thiserror::Error;

/// Result type for model-building operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while building the declaration model from an AST document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed AST document: {0}")]
    Xml(String),

    /// An element kind the type resolver does not understand.
    #[error("unexpected element kind [{kind}] for element {id}")]
    UnexpectedKind { kind: String, id: String },

    /// A reference to an element id that is not in the document.
    #[error("element id {0} is not defined in the document")]
    UnknownId(String),

    /// A required attribute is absent.
    #[error("element {id} is missing required attribute `{attr}`")]
    MissingAttribute { attr: &'static str, id: String },

    /// A numeric literal that is structurally required failed to parse.
    #[error("invalid numeric literal `{value}` in attribute `{attr}` of element {id}")]
    InvalidNumber {
        attr: &'static str,
        value: String,
        id: String,
    },

    /// A struct or interface was reached again while it was still being built.
    #[error("cyclic reference through element {id} ({name})")]
    CyclicReference { id: String, name: String },
}

impl ParseError {
    /// Returns `false` only for errors that are local to one declaration.
    ///
    /// The assembler skips a declaration that fails with a non-fatal error and
    /// aborts the whole parse for everything else.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ParseError::InvalidNumber { .. })
    }
}
