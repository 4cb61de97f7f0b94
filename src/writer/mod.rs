//! Module for writing JSON data
//!
//! [`JsonTextWriter`] is the inverse of the reader: it turns typed token calls into
//! correctly nested, correctly formatted JSON text written to a [`Write`](std::io::Write).
//! [`TokenWrite`] is the object-safe trait the mapper emits tokens through.

use thiserror::Error;

use crate::reader::ReaderError;
use crate::token::{Token, TokenKind};

mod stream_writer;
// Re-export streaming implementation under `writer` module
pub use stream_writer::*;

type IoError = std::io::Error;

/// State of a JSON writer, used in error messages
#[derive(PartialEq, Eq, Clone, Copy, strum::Display, Debug)]
pub enum WriteState {
    /// Nothing has been written yet
    Start,
    /// Inside an object which has no members yet; a member name is expected
    ObjectStart,
    /// Inside an object after a member value; a member name is expected
    Object,
    /// A member name has been written; the member value is expected
    Property,
    /// Inside an array which has no items yet
    ArrayStart,
    /// Inside an array after an item
    Array,
    /// The top-level value is complete
    Finished,
}

/// Error which occurred while writing to a JSON writer
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WriterError {
    /// The token is not valid in the current state of the writer
    ///
    /// For example a value when a member name is expected, or closing a container
    /// which was never opened. The message format is fixed:
    /// `Token {kind} in state {state} would result in an invalid JSON object. Path '{path}'.`
    #[error("Token {token} in state {state} would result in an invalid JSON object. Path '{path}'.")]
    InvalidState {
        /// Kind of the rejected token
        token: TokenKind,
        /// State the writer was in
        state: WriteState,
        /// Dotted path of the current position
        path: String,
    },
    /// A number value cannot be written as JSON number
    ///
    /// The data of this enum variant is a message explaining why the number is not valid.
    #[error("{0}")]
    InvalidNumber(String),
    /// A token sequence sourced from a reader ended before the value was complete
    #[error("Unexpected end when reading token stream. Path '{path}'.")]
    IncompleteRead {
        /// Dotted path the reader had reached when it was truncated
        path: String,
    },
    /// An IO error occurred while writing to the underlying writer
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

/// Error which occurred while [transferring tokens from a reader to a writer](JsonTextWriter::write_all_from)
#[derive(Error, Debug)]
pub enum TransferError {
    /// Error which occurred while reading from the JSON reader
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),
    /// Error which occurred while writing to the JSON writer
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
}

/// How non-finite `f64` values (NaN, ±Infinity) are written
///
/// Non-finite numbers are not allowed by the JSON specification; they are never
/// silently coerced unless the policy says so.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum NonFiniteHandling {
    /// Fail with [`WriterError::InvalidNumber`]
    #[default]
    Error,
    /// Write the literals `NaN`, `Infinity` and `-Infinity`
    Literal,
    /// Write `null` instead
    Null,
}

/// Which textual form date values are written in
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum DateFormatHandling {
    /// ISO-8601 / RFC 3339, for example `"2000-01-01T12:30:00Z"`
    #[default]
    Iso,
    /// The legacy form `"/Date(946684800000)/"` with milliseconds since the Unix epoch
    Legacy,
}

/// Settings to customize the JSON writer behavior
///
/// These settings are used by [`JsonTextWriter::new_custom`]. To avoid repeating the
/// default values for unchanged settings `..Default::default()` can be used:
/// ```
/// # use mapson::writer::WriterSettings;
/// WriterSettings {
///     indentation: Some("  ".to_owned()),
///     // For all other settings use the default
///     ..Default::default()
/// }
/// # ;
/// ```
#[derive(Clone, Debug, Default)]
pub struct WriterSettings {
    /// Indentation unit for pretty printed output
    ///
    /// When `None` the JSON output is compact and has no whitespace. Otherwise line
    /// breaks are inserted after container starts and separators, with the unit
    /// repeated once per nesting level, and a space is inserted after the `:` of a
    /// member name. Writing the same value twice with identical settings yields
    /// byte-identical output.
    pub indentation: Option<String>,

    /// How non-finite `f64` values are written
    pub non_finite_handling: NonFiniteHandling,

    /// Which textual form date values are written in
    pub date_format_handling: DateFormatHandling,

    /// Whether to escape all non-ASCII characters
    ///
    /// When enabled all Unicode characters in member names and string values whose
    /// code point is >= `0x80` are written as escape sequence. This can be useful when
    /// interacting with legacy systems which do not properly support non-ASCII input.
    pub escape_non_ascii: bool,

    /// Whether [`close`](JsonTextWriter::close) also drops the underlying sink
    ///
    /// When `true`, `close()` returns `None` and the sink is dropped. When `false`
    /// (the default), `close()` hands the sink back to the caller.
    pub close_output: bool,
}

/// An object-safe sink of JSON tokens
///
/// Implemented by [`JsonTextWriter`]; the mapper engine emits tokens through this trait.
pub trait TokenWrite {
    /// Writes one token
    ///
    /// [`Comment`](Token::Comment) tokens are accepted but never emitted; comments are
    /// input trivia only.
    fn write_token(&mut self, token: &Token) -> Result<(), WriterError>;

    /// Writes the name of the next object member
    ///
    /// Equivalent to [`write_token`](Self::write_token) with a [`Token::Name`], without
    /// requiring an owned `String`.
    fn write_name(&mut self, name: &str) -> Result<(), WriterError>;

    /// Writes a JSON string value
    ///
    /// Equivalent to [`write_token`](Self::write_token) with a [`Token::String`], without
    /// requiring an owned `String`.
    fn write_string(&mut self, value: &str) -> Result<(), WriterError>;

    /// Current nesting depth; 0 at the top-level
    fn depth(&self) -> usize;

    /// Dotted path of the current position, empty at the document root
    fn path(&self) -> String;
}
