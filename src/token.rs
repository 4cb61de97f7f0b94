//! The token vocabulary shared by the reader, the writer and the mapper
//!
//! A JSON document is processed as a sequence of [`Token`] values. The
//! [`JsonTextReader`](crate::reader::JsonTextReader) produces tokens, the
//! [`JsonTextWriter`](crate::writer::JsonTextWriter) consumes them, and the
//! mapper translates between tokens and [`Graph`](crate::graph::Graph) nodes.

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset};
use num_bigint::BigInt;

/// One unit of JSON structure or value
///
/// Container tokens ([`BeginObject`](Token::BeginObject) / [`EndObject`](Token::EndObject),
/// [`BeginArray`](Token::BeginArray) / [`EndArray`](Token::EndArray)) always nest correctly
/// when produced by a reader or accepted by a writer. A [`Name`](Token::Name) token is
/// followed by exactly one value or container start.
#[derive(PartialEq, Clone, Debug)]
pub enum Token {
    /// Start of a JSON object: `{`
    BeginObject,
    /// End of a JSON object: `}`
    EndObject,
    /// Start of a JSON array: `[`
    BeginArray,
    /// End of a JSON array: `]`
    EndArray,
    /// Name of an object member
    Name(String),
    /// JSON string value
    String(String),
    /// JSON number value which fits in an `i64`
    Int(i64),
    /// JSON integer number value which does not fit in an `i64`
    BigInt(BigInt),
    /// JSON floating point number value
    Float(f64),
    /// JSON number value parsed as fixed-point decimal
    ///
    /// Produced either by [`FloatParseHandling::Decimal`](crate::reader::FloatParseHandling::Decimal)
    /// or as fallback when a literal exceeds the range or precision of `f64`.
    Decimal(BigDecimal),
    /// JSON boolean value, `true` or `false`
    Bool(bool),
    /// JSON `null`
    Null,
    /// The non-standard `undefined` literal
    Undefined,
    /// A date value, parsed from an ISO-8601 or legacy `/Date(ms)/` string
    Date(DateTime<FixedOffset>),
    /// A byte array value; written as base64 string
    Bytes(Vec<u8>),
    /// A comment: `// ...` or `/* ... */`
    ///
    /// Only produced by readers with [`CommentHandling::Emit`](crate::reader::CommentHandling::Emit);
    /// never emitted by the writer.
    Comment(String),
    /// A raw, pre-rendered JSON fragment
    ///
    /// Never produced by the reader; written verbatim by the writer.
    Raw(String),
}

/// Type of a [`Token`], without its payload
///
/// Used in writer state errors and wherever only the kind of token matters.
#[derive(PartialEq, Eq, Clone, Copy, strum::Display, Debug)]
pub enum TokenKind {
    /// `{`
    BeginObject,
    /// `}`
    EndObject,
    /// `[`
    BeginArray,
    /// `]`
    EndArray,
    /// Object member name
    Name,
    /// String value
    String,
    /// `i64` number value
    Int,
    /// Arbitrary precision integer value
    BigInt,
    /// Floating point number value
    Float,
    /// Fixed-point decimal number value
    Decimal,
    /// Boolean value
    Bool,
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Date value
    Date,
    /// Byte array value
    Bytes,
    /// Comment
    Comment,
    /// Raw JSON fragment
    Raw,
}

impl Token {
    /// Gets the kind of this token
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::BeginObject => TokenKind::BeginObject,
            Token::EndObject => TokenKind::EndObject,
            Token::BeginArray => TokenKind::BeginArray,
            Token::EndArray => TokenKind::EndArray,
            Token::Name(_) => TokenKind::Name,
            Token::String(_) => TokenKind::String,
            Token::Int(_) => TokenKind::Int,
            Token::BigInt(_) => TokenKind::BigInt,
            Token::Float(_) => TokenKind::Float,
            Token::Decimal(_) => TokenKind::Decimal,
            Token::Bool(_) => TokenKind::Bool,
            Token::Null => TokenKind::Null,
            Token::Undefined => TokenKind::Undefined,
            Token::Date(_) => TokenKind::Date,
            Token::Bytes(_) => TokenKind::Bytes,
            Token::Comment(_) => TokenKind::Comment,
            Token::Raw(_) => TokenKind::Raw,
        }
    }

    /// Whether this token starts or is a complete JSON value
    ///
    /// This is every token except [`EndObject`](Token::EndObject), [`EndArray`](Token::EndArray),
    /// [`Name`](Token::Name) and [`Comment`](Token::Comment).
    pub fn is_value_start(&self) -> bool {
        !matches!(
            self,
            Token::EndObject | Token::EndArray | Token::Name(_) | Token::Comment(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kinds() {
        assert_eq!(TokenKind::BeginObject, Token::BeginObject.kind());
        assert_eq!(TokenKind::Name, Token::Name("a".to_owned()).kind());
        assert_eq!(TokenKind::Int, Token::Int(1).kind());
        assert_eq!(TokenKind::Null, Token::Null.kind());
        assert_eq!("BeginObject", TokenKind::BeginObject.to_string());
        assert_eq!("Name", TokenKind::Name.to_string());
    }

    #[test]
    fn value_starts() {
        assert_eq!(true, Token::BeginArray.is_value_start());
        assert_eq!(true, Token::Bool(false).is_value_start());
        assert_eq!(false, Token::EndArray.is_value_start());
        assert_eq!(false, Token::Name("a".to_owned()).is_value_start());
        assert_eq!(false, Token::Comment("c".to_owned()).is_value_start());
    }
}
