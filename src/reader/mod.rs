//! Module for reading JSON data
//!
//! [`JsonTextReader`] turns a [`ByteSource`] into a sequence of [`Token`](crate::token::Token)s.
//! [`TokenRead`] is the object-safe trait the mapper consumes tokens through.

/// Module for JSON paths in dot-notation
///
/// A path consists of zero or more [`PathPiece`] elements which either represent the
/// name of a JSON object member or the index of a JSON array item. The formatted form
/// is used in every positional error message, for example `a.b[0]` for the first item
/// of the array in member "b" of member "a". The root of the document is the empty path.
pub mod json_path {
    /// A piece of a JSON path
    #[derive(PartialEq, Eq, Clone, Debug)]
    pub enum PathPiece {
        /// Name of a JSON object member
        Member(String),
        /// Index (starting at 0) of a JSON array item
        Index(u32),
    }

    impl From<&str> for PathPiece {
        fn from(v: &str) -> Self {
            PathPiece::Member(v.to_string())
        }
    }

    impl From<u32> for PathPiece {
        fn from(v: u32) -> Self {
            PathPiece::Index(v)
        }
    }

    fn needs_quoting(name: &str) -> bool {
        name.is_empty()
            || name
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
    }

    /// Formats a path in dot-notation
    ///
    /// Member names are joined with `.`, array indices are appended as `[i]`.
    /// Member names which are not plain identifiers are quoted: `['a b']`.
    /// The empty path (the document root) formats as the empty string.
    ///
    /// # Examples
    /// ```
    /// # use mapson::reader::json_path::*;
    /// let path = [
    ///     PathPiece::Member("a".to_owned()),
    ///     PathPiece::Index(2),
    ///     PathPiece::Member("b".to_owned()),
    /// ];
    /// assert_eq!("a[2].b", format_path(&path));
    /// ```
    pub fn format_path(path: &[PathPiece]) -> String {
        let mut result = String::new();
        for piece in path {
            match piece {
                PathPiece::Member(name) => {
                    if needs_quoting(name) {
                        result.push_str(&format!("['{name}']"));
                    } else {
                        if !result.is_empty() {
                            result.push('.');
                        }
                        result.push_str(name);
                    }
                }
                PathPiece::Index(index) => {
                    result.push_str(&format!("[{index}]"));
                }
            }
        }
        result
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_format_path() {
            assert_eq!("", format_path(&[]));
            assert_eq!("[2]", format_path(&[PathPiece::Index(2)]));
            assert_eq!(
                "[2][3]",
                format_path(&[PathPiece::Index(2), PathPiece::Index(3)])
            );
            assert_eq!("a", format_path(&[PathPiece::from("a")]));
            assert_eq!(
                "a.b",
                format_path(&[PathPiece::from("a"), PathPiece::from("b")])
            );
            assert_eq!(
                "a[2].b",
                format_path(&[
                    PathPiece::from("a"),
                    PathPiece::Index(2),
                    PathPiece::from("b")
                ])
            );
            // Names which are not plain identifiers are quoted
            assert_eq!(
                "a['b c']",
                format_path(&[PathPiece::from("a"), PathPiece::from("b c")])
            );
            assert_eq!("['a.b']", format_path(&[PathPiece::from("a.b")]));
            assert_eq!("['']", format_path(&[PathPiece::from("")]));
            // '$' is common in metadata member names and stays unquoted
            assert_eq!("$type", format_path(&[PathPiece::from("$type")]));
        }
    }
}

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::token::Token;

mod source;
pub use source::*;
mod stream_reader;
// Re-export streaming implementation under `reader` module
pub use stream_reader::*;
// Date recognition is shared with the mapper's primitive coercion
pub(crate) use stream_reader::try_parse_date;

type IoError = std::io::Error;

/// Describes why a syntax error occurred
#[non_exhaustive]
#[derive(PartialEq, Clone, Debug)]
pub enum SyntaxErrorKind {
    /// An unexpected character was encountered where a value was expected
    UnexpectedCharacter(char),
    /// The JSON document ended in the middle of a token or an unclosed container
    UnexpectedEnd,
    /// The JSON document ended inside a comment
    UnexpectedEndOfComment,
    /// A literal value such as `true` is incomplete or misspelled
    InvalidLiteral(&'static str),
    /// A non-finite number literal was encountered, but
    /// [`ReaderSettings::allow_non_finite_numbers`] is disabled
    NonFiniteDisabled(&'static str),
    /// The character after a property name is not a colon
    ExpectedColon(char),
    /// The character after a value is neither a comma nor a closing bracket
    AfterValue(char),
    /// The character where a property name was expected cannot start one
    ExpectedPropertyName(char),
    /// A JSON number is malformed, for example `01`
    MalformedNumber(String),
    /// A control character in a member name or string value is not escaped
    ControlCharacter(char),
    /// An unknown escape sequence (`\...`) was encountered
    BadEscape(char),
    /// A malformed `\uXXXX` escape sequence was encountered
    BadUnicodeEscape,
    /// An unpaired UTF-16 surrogate was encountered in an escape sequence
    UnpairedSurrogate,
    /// Malformed UTF-8 data was encountered
    InvalidUtf8,
    /// Unexpected trailing data was detected at the end of the JSON document
    TrailingData(char),
}

impl Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxErrorKind::UnexpectedCharacter(c) => {
                write!(f, "Unexpected character encountered while parsing value: {c}.")
            }
            SyntaxErrorKind::UnexpectedEnd => write!(f, "Unexpected end when reading JSON."),
            SyntaxErrorKind::UnexpectedEndOfComment => {
                write!(f, "Unexpected end while parsing comment.")
            }
            SyntaxErrorKind::InvalidLiteral(literal) => {
                write!(f, "Error parsing {literal} value.")
            }
            SyntaxErrorKind::NonFiniteDisabled(literal) => {
                write!(f, "Cannot read {literal} value.")
            }
            SyntaxErrorKind::ExpectedColon(c) => write!(
                f,
                "Invalid character after parsing property name. Expected ':' but got: {c}."
            ),
            SyntaxErrorKind::AfterValue(c) => write!(
                f,
                "After parsing a value an unexpected character was encountered: {c}."
            ),
            SyntaxErrorKind::ExpectedPropertyName(c) => {
                write!(f, "Invalid property identifier character: {c}.")
            }
            SyntaxErrorKind::MalformedNumber(s) => {
                write!(f, "Input string '{s}' is not a valid number.")
            }
            SyntaxErrorKind::ControlCharacter(c) => write!(
                f,
                "Invalid character in string. Character U+{:04X} must be escaped.",
                *c as u32
            ),
            SyntaxErrorKind::BadEscape(c) => write!(f, "Bad JSON escape sequence: \\{c}."),
            SyntaxErrorKind::BadUnicodeEscape => write!(f, "Invalid Unicode escape sequence."),
            SyntaxErrorKind::UnpairedSurrogate => write!(
                f,
                "Unpaired UTF-16 surrogate in Unicode escape sequence."
            ),
            SyntaxErrorKind::InvalidUtf8 => write!(f, "Invalid UTF-8 data encountered."),
            SyntaxErrorKind::TrailingData(c) => write!(
                f,
                "Additional text encountered after finished reading JSON content: {c}."
            ),
        }
    }
}

/// JSON syntax error
///
/// The `Display` format of this error is part of the crate's contract: it is the
/// kind-specific message followed by `Path '{path}', line {line}, position {position}.`
#[derive(Error, PartialEq, Clone, Debug)]
#[error("{kind} Path '{path}', line {line}, position {position}.")]
pub struct JsonSyntaxError {
    /// Kind of the error
    pub kind: SyntaxErrorKind,
    /// Dotted path to the location where the error occurred
    pub path: String,
    /// Line number, starting at 1
    pub line: u64,
    /// Character position within the current line, starting at 0
    pub position: u64,
}

/// Error which occurred while reading from a JSON reader
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReaderError {
    /// The JSON data is not well-formed at the current position
    #[error("{0}")]
    Syntax(#[from] JsonSyntaxError),
    /// The container nesting exceeded [`ReaderSettings::max_depth`]
    ///
    /// The message format is fixed:
    /// `The reader's MaxDepth of {N} has been exceeded. Path '{path}', line {L}, position {P}.`
    #[error("The reader's MaxDepth of {max_depth} has been exceeded. Path '{path}', line {line}, position {position}.")]
    DepthExceeded {
        /// The configured maximum nesting depth
        max_depth: usize,
        /// Dotted path of the value which exceeded the depth
        path: String,
        /// Line number, starting at 1
        line: u64,
        /// Character position within the current line, starting at 0
        position: u64,
    },
    /// The underlying [`ByteSource`] has no data available right now
    ///
    /// This is only returned for sources whose `read` fails with
    /// [`ErrorKind::WouldBlock`](std::io::ErrorKind::WouldBlock). The reader state is
    /// unchanged; calling [`advance`](TokenRead::advance) again resumes exactly where
    /// lexing stopped once the source has more data.
    #[error("Additional data is required before the next token can be read. Path '{path}'.")]
    Incomplete {
        /// Dotted path of the current position
        path: String,
    },
    /// An IO error occurred while reading from the underlying source
    #[error("IO error '{error}' at (roughly) line {line}, position {position}")]
    Io {
        /// The IO error which occurred
        error: IoError,
        /// Line number, starting at 1
        line: u64,
        /// Character position within the current line, starting at 0
        position: u64,
    },
}

impl ReaderError {
    /// Whether this error is [`ReaderError::Incomplete`], that means the read can be
    /// retried once the underlying source has more data
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ReaderError::Incomplete { .. })
    }
}

/// How comments in the JSON document are handled
///
/// Comments (`// ...` and `/* ... */`) are accepted wherever the JSON specification
/// allows whitespace. They are never part of the document's data.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum CommentHandling {
    /// Surface comments as [`Token::Comment`](crate::token::Token::Comment) tokens
    #[default]
    Emit,
    /// Silently drop comments
    Skip,
}

/// Which date textual forms are recognized when reading string values
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum DateParseHandling {
    /// Strings are never turned into date tokens
    #[default]
    None,
    /// String values entirely matching ISO-8601 or the legacy `/Date(ms)/` form
    /// surface as [`Token::Date`](crate::token::Token::Date)
    DateTime,
}

/// How non-integer JSON number literals are parsed
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum FloatParseHandling {
    /// Parse as `f64`, falling back to a fixed-point decimal when the literal
    /// exceeds the range or the configured precision of `f64`
    #[default]
    Double,
    /// Parse every non-integer literal as fixed-point decimal
    Decimal,
}

/// Settings to customize the JSON reader behavior
///
/// These settings are used by [`JsonTextReader::new_custom`]. To avoid repeating the
/// default values for unchanged settings `..Default::default()` can be used:
/// ```
/// # use mapson::reader::ReaderSettings;
/// ReaderSettings {
///     max_depth: 16,
///     // For all other settings use the default
///     ..Default::default()
/// }
/// # ;
/// ```
#[derive(Clone, Debug)]
pub struct ReaderSettings {
    /// Maximum nesting depth of JSON arrays and objects
    ///
    /// When a container starts which would exceed this depth, reading fails with
    /// [`ReaderError::DepthExceeded`]. This protects against stack exhaustion from
    /// maliciously deep payloads when the consumer of this reader recurses per
    /// nesting level.
    pub max_depth: usize,

    /// Whether comments are surfaced as tokens or dropped
    pub comment_handling: CommentHandling,

    /// Which date textual forms are recognized in string values
    pub date_parse_handling: DateParseHandling,

    /// How non-integer number literals are parsed
    pub float_parse_handling: FloatParseHandling,

    /// Whether the literals `NaN`, `Infinity` and `-Infinity` are accepted as numbers
    ///
    /// These literals are not allowed by the JSON specification.
    pub allow_non_finite_numbers: bool,

    /// Whether to allow multiple top-level values, for example `true [] 1` (3 top-level values)
    pub allow_multiple_top_level: bool,

    /// Whether to track the JSON path while parsing
    ///
    /// The path is reported in error messages to make debugging easier. This setting has
    /// no effect on the parsing behavior, it only affects the information included for errors.
    pub track_path: bool,

    /// Number of significant digits up to which a non-integer literal is parsed as `f64`
    ///
    /// Literals with more significant digits, or whose `f64` value overflows to
    /// infinity, fall back to [`Token::Decimal`](crate::token::Token::Decimal) under
    /// [`FloatParseHandling::Double`]. The fallback threshold is deliberately
    /// configuration instead of being inferred from the parsed value.
    pub double_precision_digits: u32,
}

impl Default for ReaderSettings {
    /// Creates the default JSON reader settings
    ///
    /// - max depth: 64
    /// - comments: emitted as tokens
    /// - date parsing: disabled
    /// - float parsing: `f64` with decimal fallback
    /// - non-finite numbers: disallowed
    /// - multiple top-level values: disallowed
    /// - track JSON path: enabled
    /// - double precision digits: 17
    fn default() -> Self {
        ReaderSettings {
            max_depth: 64,
            comment_handling: CommentHandling::default(),
            date_parse_handling: DateParseHandling::default(),
            float_parse_handling: FloatParseHandling::default(),
            allow_non_finite_numbers: false,
            allow_multiple_top_level: false,
            track_path: true,
            double_precision_digits: 17,
        }
    }
}

/// An object-safe source of JSON tokens
///
/// Implemented by [`JsonTextReader`]; the mapper engine and the writer's
/// [`write_all_from`](crate::writer::JsonTextWriter::write_all_from) consume
/// tokens through this trait.
pub trait TokenRead {
    /// Reads the next token
    ///
    /// Returns `Ok(None)` once the top-level value and any trailing whitespace have
    /// been consumed. Trailing non-whitespace data is a syntax error, unless multiple
    /// top-level values are enabled in the [`ReaderSettings`].
    ///
    /// # Errors
    /// [`ReaderError::Syntax`] when the JSON data is malformed, [`ReaderError::DepthExceeded`]
    /// when the nesting exceeds the configured maximum, [`ReaderError::Incomplete`] when a
    /// non-blocking source has no data available (the call can be retried), and
    /// [`ReaderError::Io`] for errors of the underlying source.
    fn advance(&mut self) -> Result<Option<Token>, ReaderError>;

    /// Skips the next value
    ///
    /// Skips a complete value including all nested values. Comment tokens in front of
    /// the value are skipped as well. The skipped data is validated.
    fn skip_value(&mut self) -> Result<(), ReaderError>;

    /// Current nesting depth; 0 at the top-level
    fn depth(&self) -> usize;

    /// Dotted path of the current position, empty at the document root
    fn path(&self) -> String;

    /// Current line number, starting at 1
    fn line(&self) -> u64;

    /// Current character position within the line, starting at 0
    fn position(&self) -> u64;
}
