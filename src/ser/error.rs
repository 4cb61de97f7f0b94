//! Error and tracing types of the mapper engine

use thiserror::Error;

use crate::reader::ReaderError;
use crate::writer::WriterError;

/// Error which occurred while serializing or deserializing an object graph
///
/// [`RequiredMemberMissing`](SerError::RequiredMemberMissing),
/// [`MissingMember`](SerError::MissingMember), [`TypeMismatch`](SerError::TypeMismatch)
/// and [`ConversionFailed`](SerError::ConversionFailed) are recoverable per element:
/// they are routed once per offending element through the
/// [error callback](crate::ser::MapperSettings::error_callback), and when marked
/// handled the element is skipped and the surrounding container continues. All other
/// errors abort the entire top-level operation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SerError {
    /// Error of the underlying JSON reader
    #[error("{0}")]
    Reader(#[from] ReaderError),
    /// Error of the underlying JSON writer
    #[error("{0}")]
    Writer(#[from] WriterError),
    /// The nesting exceeded [`max_depth`](crate::ser::MapperSettings::max_depth)
    #[error("The mapper's MaxDepth of {max_depth} has been exceeded. Path '{path}'.")]
    DepthExceeded {
        /// The configured maximum nesting depth
        max_depth: usize,
        /// Dotted path of the value which exceeded the depth
        path: String,
    },
    /// A member marked required was not present in the input
    #[error("Required member '{member}' not found in JSON. Path '{path}'.")]
    RequiredMemberMissing {
        /// Name of the missing member
        member: String,
        /// Dotted path of the object the member is missing from
        path: String,
    },
    /// An input member has no counterpart on the target type
    ///
    /// Only raised with [`MissingMemberHandling::Error`](crate::ser::MissingMemberHandling::Error).
    #[error("Could not find member '{member}' on type '{type_tag}'. Path '{path}', line {line}, position {position}.")]
    MissingMember {
        /// Name of the unmapped input member
        member: String,
        /// Tag of the target type
        type_tag: String,
        /// Dotted path of the member
        path: String,
        /// Line number, starting at 1
        line: u64,
        /// Character position within the current line, starting at 0
        position: u64,
    },
    /// A value does not fit the declared type of its slot
    #[error("{message} Path '{path}'.")]
    TypeMismatch {
        /// What does not fit, quoting the offending value
        message: String,
        /// Dotted path of the value
        path: String,
    },
    /// A conversion step failed
    #[error("{message} Path '{path}'.")]
    ConversionFailed {
        /// Why the conversion failed
        message: String,
        /// Dotted path of the value
        path: String,
    },
    /// A `$ref` points to an id which was never defined
    #[error("Could not resolve reference '{id}'. Path '{path}'.")]
    UnresolvedReference {
        /// The unresolved reference id
        id: String,
        /// Dotted path of the reference
        path: String,
    },
    /// No contract is registered for a type tag
    #[error("No contract is registered for type '{type_tag}'. Path '{path}'.")]
    UnknownType {
        /// The unregistered tag
        type_tag: String,
        /// Dotted path of the value
        path: String,
    },
    /// A cyclic object graph was encountered without reference preservation
    #[error("Self referencing loop detected. Path '{path}'.")]
    ReferenceLoop {
        /// Dotted path at which the cycle closed
        path: String,
    },
    /// A custom error raised by a converter or callback
    #[error("{0}")]
    Custom(String),
}

impl SerError {
    /// Whether this error is recoverable through the error callback
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SerError::RequiredMemberMissing { .. }
                | SerError::MissingMember { .. }
                | SerError::TypeMismatch { .. }
                | SerError::ConversionFailed { .. }
        )
    }
}

/// Context of one failed element, passed to the error callback
#[derive(Debug)]
pub struct ErrorContext {
    /// Dotted path of the offending element
    pub path: String,
    /// Message of the error
    pub message: String,
    /// Set to `true` to suppress propagation
    ///
    /// The engine then skips the offending element, leaving the target member at
    /// its prior or default value, and continues the surrounding container.
    pub handled: bool,
}

/// Kind of a [`TraceEvent`]
#[derive(PartialEq, Eq, Clone, Copy, strum::Display, Debug)]
pub enum TraceKind {
    /// An object or array started
    Start,
    /// An object or array finished
    Finish,
    /// A recoverable error was handled
    Error,
}

/// A structured trace message keyed by path
///
/// Tracing is purely observational: it never alters control flow and is not
/// required for correctness.
#[derive(Clone, Debug)]
pub struct TraceEvent {
    /// Kind of the event
    pub kind: TraceKind,
    /// Dotted path of the element the event belongs to
    pub path: String,
    /// Human readable detail
    pub detail: String,
}
