//! Streaming implementation of a resumable JSON tokenizer

use std::io::ErrorKind;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use num_bigint::BigInt;

use super::json_path::{format_path, PathPiece};
use super::*;
use crate::json_number::{significant_digits, NumberState, NumberStep};
use crate::token::Token;
use crate::utf8;

const READER_BUF_SIZE: usize = 1024;
const INITIAL_VALUE_BYTES_BUF_CAPACITY: usize = 128;

/// Where the reader stands within the JSON grammar
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Phase {
    /// Before the top-level value
    Start,
    /// Inside an object, before the first member name; `}` is allowed
    BeforeFirstName,
    /// Inside an object, after a comma; only a member name is allowed
    BeforeName,
    /// After a member name, expecting `:`
    AfterName,
    /// After `:`, or after a comma inside an array; only a value is allowed
    BeforeValue,
    /// Inside an array, before the first item; `]` is allowed
    BeforeFirstValue,
    /// After a value inside a container, expecting `,` or the closing bracket
    AfterValue,
    /// The top-level value has been consumed
    AfterRoot,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Container {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    /// For objects: whether a member name path piece for this object has been pushed
    has_path_piece: bool,
}

#[derive(PartialEq, Clone, Copy, Debug)]
enum EscapeState {
    None,
    /// After `\`
    Start,
    /// Inside `\uXXXX`
    Unicode { value: u16, digits: u8 },
    /// After a high surrogate escape, expecting `\`
    AwaitSurrogateBackslash,
    /// After a high surrogate escape, expecting `u`
    AwaitSurrogateU,
    /// Inside the `\uXXXX` escape of the low surrogate
    UnicodeLow { value: u16, digits: u8 },
}

#[derive(Debug)]
struct StrPartial {
    is_name: bool,
    /// Decoded string bytes, verified to be valid UTF-8
    buf: Vec<u8>,
    escape: EscapeState,
    high_surrogate: u16,
    /// Bytes of an incomplete UTF-8 multi-byte char
    utf8_buf: [u8; utf8::MAX_BYTES_PER_CHAR],
    utf8_len: usize,
    utf8_expected: usize,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum LiteralKind {
    Null,
    True,
    False,
    Undefined,
    NaN,
    Infinity,
    NegInfinity,
}

impl LiteralKind {
    fn text(self) -> &'static str {
        match self {
            LiteralKind::Null => "null",
            LiteralKind::True => "true",
            LiteralKind::False => "false",
            LiteralKind::Undefined => "undefined",
            LiteralKind::NaN => "NaN",
            LiteralKind::Infinity => "Infinity",
            LiteralKind::NegInfinity => "-Infinity",
        }
    }

    fn token(self) -> Token {
        match self {
            LiteralKind::Null => Token::Null,
            LiteralKind::True => Token::Bool(true),
            LiteralKind::False => Token::Bool(false),
            LiteralKind::Undefined => Token::Undefined,
            LiteralKind::NaN => Token::Float(f64::NAN),
            LiteralKind::Infinity => Token::Float(f64::INFINITY),
            LiteralKind::NegInfinity => Token::Float(f64::NEG_INFINITY),
        }
    }
}

/// Lexer state for a token which may straddle chunk boundaries
///
/// All partial-token state lives here so that a source which runs out of data
/// mid-token can suspend the reader and resume it later without any loss.
#[derive(Debug)]
enum Partial {
    None,
    Str(StrPartial),
    Number { buf: Vec<u8>, state: NumberState },
    Literal { kind: LiteralKind, matched: usize },
    /// After `/`, the second comment character has not been read yet
    CommentStart,
    LineComment { buf: Vec<u8> },
    BlockComment { buf: Vec<u8>, seen_star: bool },
}

/// A JSON reader which consumes data from a [`ByteSource`]
///
/// The reader internally buffers data so it is normally not necessary to wrap a
/// blocking source in additional buffering. The data provided by the source must
/// be valid UTF-8 data without a leading byte order mark.
///
/// Tokens are pulled with [`advance`](TokenRead::advance). Chunk boundaries of the
/// underlying source are invisible: a token split across any number of arbitrarily
/// small chunks is reassembled correctly, and a source which reports
/// [`ErrorKind::WouldBlock`] suspends the current operation instead of failing it.
///
/// # Security
/// Besides UTF-8 validation and the [`max_depth`](ReaderSettings::max_depth) bound
/// this reader does not implement any other security related measures. In particular
/// it does **not** impose a limit on the length of the document, detect duplicate
/// member names, or impose a limit on the length of member names and string values.
/// When processing JSON data from an untrusted source, users of this reader must
/// implement protections against these issues themselves.
pub struct JsonTextReader<S: ByteSource> {
    source: S,
    /// Buffer containing some bytes read from [`source`](Self::source)
    buf: [u8; READER_BUF_SIZE],
    /// Start index (inclusive) at which unprocessed data in [`buf`](Self::buf) starts
    buf_pos: usize,
    /// Index (exclusive) up to which [`buf`](Self::buf) is filled
    buf_end: usize,
    reached_eof: bool,

    phase: Phase,
    partial: Partial,
    stack: Vec<Frame>,
    /// Persisted depth of an in-progress [`skip_value`](TokenRead::skip_value) call,
    /// so skipping survives suspension
    skip_depth: Option<usize>,

    line: u64,
    position: u64,
    last_was_cr: bool,
    json_path: Option<Vec<PathPiece>>,

    settings: ReaderSettings,
}

impl<S: ByteSource + std::fmt::Debug> std::fmt::Debug for JsonTextReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTextReader")
            .field("source", &self.source)
            .field("buf_count", &(self.buf_end - self.buf_pos))
            .field("phase", &self.phase)
            .field("partial", &self.partial)
            .field("stack_len", &self.stack.len())
            .field("line", &self.line)
            .field("position", &self.position)
            .field("json_path", &self.json_path)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<'a> JsonTextReader<SliceSource<'a>> {
    /// Creates a reader over an in-memory JSON string with [default settings](ReaderSettings::default)
    // The FromStr trait cannot be implemented because of the lifetime on the source
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &'a str) -> Self {
        JsonTextReader::new(SliceSource::new(json.as_bytes()))
    }
}

impl<R: std::io::Read> JsonTextReader<ReadSource<R>> {
    /// Creates a reader over a blocking [`Read`](std::io::Read) with [default settings](ReaderSettings::default)
    pub fn from_read(reader: R) -> Self {
        JsonTextReader::new(ReadSource::new(reader))
    }
}

// Implementation with public methods
impl<S: ByteSource> JsonTextReader<S> {
    /// Creates a JSON reader with [default settings](ReaderSettings::default)
    pub fn new(source: S) -> Self {
        JsonTextReader::new_custom(source, ReaderSettings::default())
    }

    /// Creates a JSON reader with custom settings
    pub fn new_custom(source: S, settings: ReaderSettings) -> Self {
        let initial_nesting_capacity = 16;
        Self {
            source,
            buf: [0; READER_BUF_SIZE],
            buf_pos: 0,
            buf_end: 0,
            reached_eof: false,
            phase: Phase::Start,
            partial: Partial::None,
            stack: Vec::with_capacity(initial_nesting_capacity),
            skip_depth: None,
            line: 1,
            position: 0,
            last_was_cr: false,
            json_path: if settings.track_path {
                Some(Vec::with_capacity(initial_nesting_capacity))
            } else {
                None
            },
            settings,
        }
    }

    /// Gets the settings of this reader
    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Consumes the reader and returns the underlying source
    pub fn into_source(self) -> S {
        self.source
    }
}

// Implementation with error utility and position methods
impl<S: ByteSource> JsonTextReader<S> {
    fn current_path(&self) -> String {
        self.json_path.as_deref().map(format_path).unwrap_or_default()
    }

    fn syntax_error<T>(&self, kind: SyntaxErrorKind) -> Result<T, ReaderError> {
        Err(ReaderError::Syntax(JsonSyntaxError {
            kind,
            path: self.current_path(),
            line: self.line,
            position: self.position,
        }))
    }

    fn in_array(&self) -> bool {
        self.stack
            .last()
            .map_or(false, |f| f.container == Container::Array)
    }
}

// Implementation with low level byte reading methods
impl<S: ByteSource> JsonTextReader<S> {
    /// Peeks at the next byte without consuming it
    ///
    /// Returns `None` if the end of the input has been reached. Fails with
    /// [`ReaderError::Incomplete`] when the source has no data available right now;
    /// all reader state is left untouched in that case.
    fn peek_byte(&mut self) -> Result<Option<u8>, ReaderError> {
        if self.buf_pos < self.buf_end {
            return Ok(Some(self.buf[self.buf_pos]));
        }
        if self.reached_eof {
            return Ok(None);
        }
        match self.source.read(&mut self.buf) {
            Ok(0) => {
                self.reached_eof = true;
                Ok(None)
            }
            Ok(n) => {
                self.buf_pos = 0;
                self.buf_end = n;
                Ok(Some(self.buf[0]))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(ReaderError::Incomplete {
                path: self.current_path(),
            }),
            Err(e) => Err(ReaderError::Io {
                error: e,
                line: self.line,
                position: self.position,
            }),
        }
    }

    /// Consumes the byte last returned by [`peek_byte`](Self::peek_byte)
    fn consume_byte(&mut self) {
        debug_assert!(self.buf_pos < self.buf_end);
        let byte = self.buf[self.buf_pos];
        self.buf_pos += 1;

        // Continuation bytes do not advance the character position
        if utf8::is_continuation(byte) {
            return;
        }
        match byte {
            b'\n' => {
                // Count \r\n (Windows line break) as only one line break
                if !self.last_was_cr {
                    self.line += 1;
                    self.position = 0;
                }
                self.last_was_cr = false;
            }
            b'\r' => {
                self.line += 1;
                self.position = 0;
                self.last_was_cr = true;
            }
            _ => {
                self.position += 1;
                self.last_was_cr = false;
            }
        }
    }
}

// Implementation with path bookkeeping
impl<S: ByteSource> JsonTextReader<S> {
    fn path_push(&mut self, piece: PathPiece) {
        if let Some(path) = &mut self.json_path {
            path.push(piece);
        }
    }

    fn path_pop(&mut self) {
        if let Some(path) = &mut self.json_path {
            path.pop();
        }
    }

    fn path_set_member(&mut self, name: &str) {
        let has_piece = self.stack.last().map_or(false, |f| f.has_path_piece);
        if let Some(path) = &mut self.json_path {
            if has_piece {
                if let Some(last) = path.last_mut() {
                    *last = PathPiece::Member(name.to_owned());
                }
            } else {
                path.push(PathPiece::Member(name.to_owned()));
            }
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.has_path_piece = true;
        }
    }

    fn path_increment_index(&mut self) {
        if let Some(path) = &mut self.json_path {
            if let Some(PathPiece::Index(i)) = path.last_mut() {
                *i += 1;
            }
        }
    }
}

// Implementation with value completion transitions
impl<S: ByteSource> JsonTextReader<S> {
    /// Performs the phase transition after a value has been fully consumed
    fn complete_value(&mut self, token: Token) -> Token {
        if self.stack.is_empty() {
            self.phase = Phase::AfterRoot;
        } else {
            if self.in_array() {
                self.path_increment_index();
            }
            self.phase = Phase::AfterValue;
        }
        token
    }

    fn begin_container(&mut self, container: Container) -> Result<Token, ReaderError> {
        if self.stack.len() >= self.settings.max_depth {
            return Err(ReaderError::DepthExceeded {
                max_depth: self.settings.max_depth,
                path: self.current_path(),
                line: self.line,
                position: self.position,
            });
        }
        self.stack.push(Frame {
            container,
            has_path_piece: false,
        });
        Ok(match container {
            Container::Object => {
                self.phase = Phase::BeforeFirstName;
                Token::BeginObject
            }
            Container::Array => {
                self.path_push(PathPiece::Index(0));
                self.phase = Phase::BeforeFirstValue;
                Token::BeginArray
            }
        })
    }

    fn end_container(&mut self, container: Container) -> Token {
        let frame = self.stack.pop();
        debug_assert!(frame.as_ref().map_or(false, |f| f.container == container));
        match container {
            Container::Object => {
                if frame.map_or(false, |f| f.has_path_piece) {
                    self.path_pop();
                }
                self.complete_value(Token::EndObject)
            }
            Container::Array => {
                self.path_pop();
                self.complete_value(Token::EndArray)
            }
        }
    }
}

// Implementation with string lexing
impl<S: ByteSource> JsonTextReader<S> {
    fn push_char(partial: &mut StrPartial, c: char) {
        let mut encode_buf = [0_u8; utf8::MAX_BYTES_PER_CHAR];
        partial
            .buf
            .extend_from_slice(c.encode_utf8(&mut encode_buf).as_bytes());
    }

    fn apply_unicode_value(
        &self,
        partial: &mut StrPartial,
        value: u16,
        is_low: bool,
    ) -> Result<(), ReaderError> {
        if is_low {
            if !(0xDC00..0xE000).contains(&value) {
                return self.syntax_error(SyntaxErrorKind::UnpairedSurrogate);
            }
            let high = partial.high_surrogate as u32;
            let code_point = 0x10000 + ((high - 0xD800) << 10) + (value as u32 - 0xDC00);
            let c = char::from_u32(code_point)
                .expect("surrogate pair combination is always a valid code point");
            Self::push_char(partial, c);
            partial.escape = EscapeState::None;
        } else if (0xD800..0xDC00).contains(&value) {
            // High surrogate; a low surrogate escape must follow
            partial.high_surrogate = value;
            partial.escape = EscapeState::AwaitSurrogateBackslash;
        } else if (0xDC00..0xE000).contains(&value) {
            return self.syntax_error(SyntaxErrorKind::UnpairedSurrogate);
        } else {
            let c = char::from_u32(value as u32)
                .expect("non-surrogate u16 is always a valid code point");
            Self::push_char(partial, c);
            partial.escape = EscapeState::None;
        }
        Ok(())
    }

    /// Processes one byte of a string token; returns the completed string once the
    /// closing `"` has been reached
    ///
    /// The byte is not consumed by this method, so error positions point at the
    /// offending character.
    fn string_byte(
        &self,
        partial: &mut StrPartial,
        byte: u8,
    ) -> Result<Option<String>, ReaderError> {
        // Complete a pending UTF-8 multi-byte char first
        if partial.utf8_expected > 0 {
            if !utf8::is_continuation(byte) {
                return self.syntax_error(SyntaxErrorKind::InvalidUtf8);
            }
            partial.utf8_buf[partial.utf8_len] = byte;
            partial.utf8_len += 1;
            if partial.utf8_len == partial.utf8_expected {
                let bytes = &partial.utf8_buf[..partial.utf8_len];
                if !utf8::is_valid_char_encoding(bytes) {
                    return self.syntax_error(SyntaxErrorKind::InvalidUtf8);
                }
                let bytes = bytes.to_vec();
                partial.buf.extend_from_slice(&bytes);
                partial.utf8_len = 0;
                partial.utf8_expected = 0;
            }
            return Ok(None);
        }

        match partial.escape {
            EscapeState::None => match byte {
                b'"' => {
                    let buf = std::mem::take(&mut partial.buf);
                    return Ok(Some(utf8::to_string_unchecked(buf)));
                }
                b'\\' => partial.escape = EscapeState::Start,
                0x00..=0x1F => {
                    return self.syntax_error(SyntaxErrorKind::ControlCharacter(byte as char));
                }
                _ => {
                    if utf8::is_1byte(byte) {
                        partial.buf.push(byte);
                    } else {
                        match utf8::expected_bytes_count(byte) {
                            None => {
                                return self.syntax_error(SyntaxErrorKind::InvalidUtf8);
                            }
                            Some(count) => {
                                partial.utf8_buf[0] = byte;
                                partial.utf8_len = 1;
                                partial.utf8_expected = count;
                            }
                        }
                    }
                }
            },
            EscapeState::Start => match byte {
                b'"' => {
                    partial.buf.push(b'"');
                    partial.escape = EscapeState::None;
                }
                b'\\' => {
                    partial.buf.push(b'\\');
                    partial.escape = EscapeState::None;
                }
                b'/' => {
                    partial.buf.push(b'/');
                    partial.escape = EscapeState::None;
                }
                b'b' => {
                    partial.buf.push(0x08);
                    partial.escape = EscapeState::None;
                }
                b'f' => {
                    partial.buf.push(0x0C);
                    partial.escape = EscapeState::None;
                }
                b'n' => {
                    partial.buf.push(b'\n');
                    partial.escape = EscapeState::None;
                }
                b'r' => {
                    partial.buf.push(b'\r');
                    partial.escape = EscapeState::None;
                }
                b't' => {
                    partial.buf.push(b'\t');
                    partial.escape = EscapeState::None;
                }
                b'u' => partial.escape = EscapeState::Unicode { value: 0, digits: 0 },
                _ => {
                    return self.syntax_error(SyntaxErrorKind::BadEscape(byte as char));
                }
            },
            EscapeState::Unicode { value, digits } | EscapeState::UnicodeLow { value, digits } => {
                let digit = match (byte as char).to_digit(16) {
                    None => {
                        return self.syntax_error(SyntaxErrorKind::BadUnicodeEscape);
                    }
                    Some(digit) => digit as u16,
                };
                let is_low = matches!(partial.escape, EscapeState::UnicodeLow { .. });
                let value = (value << 4) | digit;
                let digits = digits + 1;
                if digits == 4 {
                    self.apply_unicode_value(partial, value, is_low)?;
                } else if is_low {
                    partial.escape = EscapeState::UnicodeLow { value, digits };
                } else {
                    partial.escape = EscapeState::Unicode { value, digits };
                }
            }
            EscapeState::AwaitSurrogateBackslash => {
                if byte == b'\\' {
                    partial.escape = EscapeState::AwaitSurrogateU;
                } else {
                    return self.syntax_error(SyntaxErrorKind::UnpairedSurrogate);
                }
            }
            EscapeState::AwaitSurrogateU => {
                if byte == b'u' {
                    partial.escape = EscapeState::UnicodeLow { value: 0, digits: 0 };
                } else {
                    return self.syntax_error(SyntaxErrorKind::UnpairedSurrogate);
                }
            }
        }
        Ok(None)
    }
}

// Implementation with number finishing
impl<S: ByteSource> JsonTextReader<S> {
    fn finish_number(&mut self, buf: Vec<u8>) -> Result<Token, ReaderError> {
        let literal = utf8::to_string_unchecked(buf);
        let is_integer = !literal.contains(['.', 'e', 'E']);
        if is_integer {
            return match literal.parse::<i64>() {
                Ok(value) => Ok(Token::Int(value)),
                Err(_) => match BigInt::from_str(&literal) {
                    Ok(value) => Ok(Token::BigInt(value)),
                    Err(_) => self.syntax_error(SyntaxErrorKind::MalformedNumber(literal)),
                },
            };
        }

        match self.settings.float_parse_handling {
            FloatParseHandling::Decimal => match BigDecimal::from_str(&literal) {
                Ok(value) => Ok(Token::Decimal(value)),
                Err(_) => self.syntax_error(SyntaxErrorKind::MalformedNumber(literal)),
            },
            FloatParseHandling::Double => {
                let value = match literal.parse::<f64>() {
                    Ok(value) => value,
                    Err(_) => {
                        return self.syntax_error(SyntaxErrorKind::MalformedNumber(literal));
                    }
                };
                // Fall back to fixed-point decimal when the literal exceeds the range
                // or the configured precision of f64
                if !value.is_finite()
                    || significant_digits(&literal) > self.settings.double_precision_digits
                {
                    match BigDecimal::from_str(&literal) {
                        Ok(value) => Ok(Token::Decimal(value)),
                        Err(_) => self.syntax_error(SyntaxErrorKind::MalformedNumber(literal)),
                    }
                } else {
                    Ok(Token::Float(value))
                }
            }
        }
    }
}

/// Tries to parse a string as ISO-8601 date or the legacy `/Date(ms[+hhmm])/` form
pub(crate) fn try_parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Some(inner) = value.strip_prefix("/Date(").and_then(|v| v.strip_suffix(")/")) {
        if inner.is_empty() || !inner.is_char_boundary(1) {
            return None;
        }
        // Legacy form: milliseconds since the Unix epoch, optionally followed
        // by a +hhmm / -hhmm display offset; index 1 skips the sign of
        // negative millisecond values
        let (millis_str, offset) = match inner[1..].find(['+', '-']) {
            Some(i) => {
                let (millis, offset_str) = inner.split_at(i + 1);
                let sign = if offset_str.starts_with('-') { -1 } else { 1 };
                let digits = &offset_str[1..];
                if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let hours: i32 = digits[..2].parse().ok()?;
                let minutes: i32 = digits[2..].parse().ok()?;
                (millis, FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?)
            }
            None => (inner, FixedOffset::east_opt(0)?),
        };
        let millis: i64 = millis_str.parse().ok()?;
        let utc = Utc.timestamp_millis_opt(millis).single()?;
        return Some(utc.with_timezone(&offset));
    }

    // ISO-8601: require the full date-time shape to avoid treating arbitrary
    // strings as dates
    let bytes = value.as_bytes();
    if bytes.len() >= 19 && bytes[4] == b'-' && bytes[7] == b'-' && bytes[10] == b'T' {
        return DateTime::parse_from_rfc3339(value).ok();
    }
    None
}

impl<S: ByteSource> TokenRead for JsonTextReader<S> {
    fn advance(&mut self) -> Result<Option<Token>, ReaderError> {
        loop {
            // Continue an in-progress token first
            if !matches!(self.partial, Partial::None) {
                match self.continue_partial()? {
                    Some(token) => return Ok(Some(token)),
                    // Completed without producing a token (skipped comment); go on
                    None => continue,
                }
            }

            let byte = match self.peek_byte()? {
                Some(byte) => byte,
                None => return self.handle_eof(),
            };

            // Whitespace is allowed between all tokens
            if matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
                self.consume_byte();
                continue;
            }
            // Comments are allowed wherever whitespace is
            if byte == b'/' {
                self.consume_byte();
                self.partial = Partial::CommentStart;
                continue;
            }

            match self.phase {
                Phase::Start | Phase::BeforeValue | Phase::BeforeFirstValue => {
                    if byte == b']' && self.phase == Phase::BeforeFirstValue {
                        self.consume_byte();
                        return Ok(Some(self.end_container(Container::Array)));
                    }
                    if let Some(token) = self.begin_value(byte)? {
                        return Ok(Some(token));
                    }
                }
                Phase::BeforeFirstName | Phase::BeforeName => match byte {
                    b'"' => {
                        self.consume_byte();
                        self.partial = Partial::Str(StrPartial {
                            is_name: true,
                            buf: Vec::with_capacity(INITIAL_VALUE_BYTES_BUF_CAPACITY),
                            escape: EscapeState::None,
                            high_surrogate: 0,
                            utf8_buf: [0; utf8::MAX_BYTES_PER_CHAR],
                            utf8_len: 0,
                            utf8_expected: 0,
                        });
                    }
                    b'}' if self.phase == Phase::BeforeFirstName => {
                        self.consume_byte();
                        return Ok(Some(self.end_container(Container::Object)));
                    }
                    _ => {
                        return self.syntax_error(SyntaxErrorKind::ExpectedPropertyName(
                            byte as char,
                        ));
                    }
                },
                Phase::AfterName => {
                    if byte == b':' {
                        self.consume_byte();
                        self.phase = Phase::BeforeValue;
                    } else {
                        return self.syntax_error(SyntaxErrorKind::ExpectedColon(byte as char));
                    }
                }
                Phase::AfterValue => match byte {
                    b',' => {
                        self.consume_byte();
                        self.phase = if self.in_array() {
                            Phase::BeforeValue
                        } else {
                            Phase::BeforeName
                        };
                    }
                    b'}' if !self.in_array() => {
                        self.consume_byte();
                        return Ok(Some(self.end_container(Container::Object)));
                    }
                    b']' if self.in_array() => {
                        self.consume_byte();
                        return Ok(Some(self.end_container(Container::Array)));
                    }
                    _ => {
                        return self.syntax_error(SyntaxErrorKind::AfterValue(byte as char));
                    }
                },
                Phase::AfterRoot => {
                    if self.settings.allow_multiple_top_level {
                        if let Some(token) = self.begin_value(byte)? {
                            return Ok(Some(token));
                        }
                    } else {
                        return self.syntax_error(SyntaxErrorKind::TrailingData(byte as char));
                    }
                }
            }
        }
    }

    fn skip_value(&mut self) -> Result<(), ReaderError> {
        let mut depth = self.skip_depth.take().unwrap_or(0);
        loop {
            let result = self.advance();
            let token = match result {
                Err(e) => {
                    if e.is_incomplete() {
                        // Remember progress so skipping can be resumed
                        self.skip_depth = Some(depth);
                    }
                    return Err(e);
                }
                Ok(None) => {
                    panic!("Incorrect reader usage: Cannot skip value when no value is expected")
                }
                Ok(Some(token)) => token,
            };
            match token {
                Token::Comment(_) | Token::Name(_) => {}
                Token::BeginObject | Token::BeginArray => depth += 1,
                Token::EndObject | Token::EndArray => {
                    if depth == 0 {
                        panic!("Incorrect reader usage: Cannot skip value when no value is expected")
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn path(&self) -> String {
        self.current_path()
    }

    fn line(&self) -> u64 {
        self.line
    }

    fn position(&self) -> u64 {
        self.position
    }
}

// Implementation with value start dispatch and partial continuation
impl<S: ByteSource> JsonTextReader<S> {
    /// Dispatches the first byte of a value; either emits a container start token
    /// or arms the matching [`Partial`] state
    fn begin_value(&mut self, byte: u8) -> Result<Option<Token>, ReaderError> {
        match byte {
            b'{' => {
                // Check depth before consuming so the error points at the bracket
                let token = self.begin_container(Container::Object)?;
                self.consume_byte();
                Ok(Some(token))
            }
            b'[' => {
                let token = self.begin_container(Container::Array)?;
                self.consume_byte();
                Ok(Some(token))
            }
            b'"' => {
                self.consume_byte();
                self.partial = Partial::Str(StrPartial {
                    is_name: false,
                    buf: Vec::with_capacity(INITIAL_VALUE_BYTES_BUF_CAPACITY),
                    escape: EscapeState::None,
                    high_surrogate: 0,
                    utf8_buf: [0; utf8::MAX_BYTES_PER_CHAR],
                    utf8_len: 0,
                    utf8_expected: 0,
                });
                Ok(None)
            }
            b'-' | b'0'..=b'9' => {
                let mut state = NumberState::Start;
                let step = state.accept(byte);
                // The first byte of a number is always consumed
                debug_assert!(step == NumberStep::Consumed);
                self.consume_byte();
                let mut buf = Vec::with_capacity(INITIAL_VALUE_BYTES_BUF_CAPACITY);
                buf.push(byte);
                self.partial = Partial::Number { buf, state };
                Ok(None)
            }
            b'n' => self.begin_literal(LiteralKind::Null),
            b't' => self.begin_literal(LiteralKind::True),
            b'f' => self.begin_literal(LiteralKind::False),
            b'u' => self.begin_literal(LiteralKind::Undefined),
            b'N' => {
                if !self.settings.allow_non_finite_numbers {
                    return self.syntax_error(SyntaxErrorKind::NonFiniteDisabled("NaN"));
                }
                self.begin_literal(LiteralKind::NaN)
            }
            b'I' => {
                if !self.settings.allow_non_finite_numbers {
                    return self.syntax_error(SyntaxErrorKind::NonFiniteDisabled("Infinity"));
                }
                self.begin_literal(LiteralKind::Infinity)
            }
            _ => self.syntax_error(SyntaxErrorKind::UnexpectedCharacter(byte as char)),
        }
    }

    fn begin_literal(&mut self, kind: LiteralKind) -> Result<Option<Token>, ReaderError> {
        self.consume_byte();
        self.partial = Partial::Literal { kind, matched: 1 };
        Ok(None)
    }

    /// Drives the current [`Partial`] state forward
    ///
    /// Returns `Ok(Some(token))` when the token completed, `Ok(None)` when the
    /// partial state completed without a token (a skipped comment). Fails with
    /// [`ReaderError::Incomplete`] without losing state when the source suspends.
    fn continue_partial(&mut self) -> Result<Option<Token>, ReaderError> {
        let mut partial = std::mem::replace(&mut self.partial, Partial::None);
        let result = self.drive_partial(&mut partial);
        match &result {
            // Park the partial state for resumption
            Err(e) if e.is_incomplete() => self.partial = partial,
            _ => {}
        }
        result
    }

    fn drive_partial(&mut self, partial: &mut Partial) -> Result<Option<Token>, ReaderError> {
        loop {
            let byte = self.peek_byte()?;
            match partial {
                Partial::None => unreachable!("drive_partial called without partial state"),
                Partial::Str(str_partial) => {
                    let byte = match byte {
                        None => return self.syntax_error(SyntaxErrorKind::UnexpectedEnd),
                        Some(byte) => byte,
                    };
                    // Process before consuming so error positions point at the offending char
                    let completed = self.string_byte(str_partial, byte)?;
                    self.consume_byte();
                    if let Some(value) = completed {
                        return if str_partial.is_name {
                            self.path_set_member(&value);
                            self.phase = Phase::AfterName;
                            Ok(Some(Token::Name(value)))
                        } else {
                            let token = if self.settings.date_parse_handling
                                == DateParseHandling::DateTime
                            {
                                match try_parse_date(&value) {
                                    Some(date) => Token::Date(date),
                                    None => Token::String(value),
                                }
                            } else {
                                Token::String(value)
                            };
                            Ok(Some(self.complete_value(token)))
                        };
                    }
                }
                Partial::Number { buf, state } => {
                    let byte = match byte {
                        None => {
                            // The document may end directly after a top-level number
                            if state.is_valid_end() {
                                let buf = std::mem::take(buf);
                                let token = self.finish_number(buf)?;
                                return Ok(Some(self.complete_value(token)));
                            }
                            let literal = utf8::to_string_unchecked(std::mem::take(buf));
                            return self.syntax_error(SyntaxErrorKind::MalformedNumber(literal));
                        }
                        Some(byte) => byte,
                    };
                    // "-Infinity" starts like a number
                    if byte == b'I' && buf.as_slice() == b"-" {
                        if !self.settings.allow_non_finite_numbers {
                            return self
                                .syntax_error(SyntaxErrorKind::NonFiniteDisabled("-Infinity"));
                        }
                        self.consume_byte();
                        *partial = Partial::Literal {
                            kind: LiteralKind::NegInfinity,
                            matched: 2,
                        };
                        continue;
                    }
                    match state.accept(byte) {
                        NumberStep::Consumed => {
                            buf.push(byte);
                            self.consume_byte();
                        }
                        NumberStep::End => {
                            // Byte is not part of the number; leave it for the next phase
                            let buf = std::mem::take(buf);
                            let token = self.finish_number(buf)?;
                            return Ok(Some(self.complete_value(token)));
                        }
                        NumberStep::Invalid => {
                            buf.push(byte);
                            let literal = utf8::to_string_unchecked(std::mem::take(buf));
                            return self.syntax_error(SyntaxErrorKind::MalformedNumber(literal));
                        }
                    }
                }
                Partial::Literal { kind, matched } => {
                    let literal = kind.text().as_bytes();
                    if *matched < literal.len() {
                        let byte = match byte {
                            None => return self.syntax_error(SyntaxErrorKind::UnexpectedEnd),
                            Some(byte) => byte,
                        };
                        if byte != literal[*matched] {
                            return self.syntax_error(SyntaxErrorKind::InvalidLiteral(kind.text()));
                        }
                        self.consume_byte();
                        *matched += 1;
                    } else {
                        // Make sure there are no misleading chars directly afterwards, e.g. "truey"
                        match byte {
                            None => {}
                            Some(b',' | b']' | b'}' | b' ' | b'\t' | b'\n' | b'\r' | b'/') => {}
                            Some(_) => {
                                return self
                                    .syntax_error(SyntaxErrorKind::InvalidLiteral(kind.text()));
                            }
                        }
                        let token = kind.token();
                        return Ok(Some(self.complete_value(token)));
                    }
                }
                Partial::CommentStart => {
                    let byte = match byte {
                        None => return self.syntax_error(SyntaxErrorKind::UnexpectedEndOfComment),
                        Some(byte) => byte,
                    };
                    self.consume_byte();
                    match byte {
                        b'/' => *partial = Partial::LineComment { buf: Vec::new() },
                        b'*' => {
                            *partial = Partial::BlockComment {
                                buf: Vec::new(),
                                seen_star: false,
                            }
                        }
                        _ => {
                            return self.syntax_error(SyntaxErrorKind::UnexpectedCharacter(
                                byte as char,
                            ));
                        }
                    }
                }
                Partial::LineComment { buf } => match byte {
                    // A line comment can be ended by the end of the input
                    None | Some(b'\n') | Some(b'\r') => {
                        // Don't consume the line break, whitespace handling takes care of it
                        return self.finish_comment(std::mem::take(buf));
                    }
                    Some(byte) => {
                        buf.push(byte);
                        self.consume_byte();
                    }
                },
                Partial::BlockComment { buf, seen_star } => {
                    let byte = match byte {
                        None => return self.syntax_error(SyntaxErrorKind::UnexpectedEndOfComment),
                        Some(byte) => byte,
                    };
                    self.consume_byte();
                    if *seen_star && byte == b'/' {
                        // Drop the '*' which turned out to be part of the terminator
                        buf.pop();
                        return self.finish_comment(std::mem::take(buf));
                    }
                    *seen_star = byte == b'*';
                    buf.push(byte);
                }
            }
        }
    }

    fn finish_comment(&mut self, buf: Vec<u8>) -> Result<Option<Token>, ReaderError> {
        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            Err(_) => return self.syntax_error(SyntaxErrorKind::InvalidUtf8),
        };
        match self.settings.comment_handling {
            CommentHandling::Emit => Ok(Some(Token::Comment(text))),
            CommentHandling::Skip => Ok(None),
        }
    }

    fn handle_eof(&mut self) -> Result<Option<Token>, ReaderError> {
        match self.phase {
            Phase::AfterRoot => Ok(None),
            // Everything else means the document ended too early
            _ => self.syntax_error(SyntaxErrorKind::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn reader(json: &str) -> JsonTextReader<SliceSource<'_>> {
        JsonTextReader::from_str(json)
    }

    fn read_all(json: &str) -> Result<Vec<Token>, ReaderError> {
        read_all_custom(json, ReaderSettings::default())
    }

    fn read_all_custom(json: &str, settings: ReaderSettings) -> Result<Vec<Token>, ReaderError> {
        let mut reader = JsonTextReader::new_custom(SliceSource::new(json.as_bytes()), settings);
        let mut tokens = Vec::new();
        while let Some(token) = reader.advance()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn assert_syntax_error(json: &str, expected_message: &str) {
        match read_all(json) {
            Err(ReaderError::Syntax(e)) => {
                assert_eq!(expected_message, e.to_string(), "for JSON: {json}")
            }
            result => panic!("Expected syntax error for {json}, got: {result:?}"),
        }
    }

    #[test]
    fn literals() -> TestResult {
        assert_eq!(vec![Token::Null], read_all("null")?);
        assert_eq!(vec![Token::Bool(true)], read_all("true")?);
        assert_eq!(vec![Token::Bool(false)], read_all("false")?);
        assert_eq!(vec![Token::Undefined], read_all("undefined")?);
        Ok(())
    }

    #[test]
    fn invalid_literals() {
        assert_syntax_error("nul", "Unexpected end when reading JSON. Path '', line 1, position 3.");
        assert_syntax_error(
            "nulx",
            "Error parsing null value. Path '', line 1, position 3.",
        );
        assert_syntax_error(
            "truey",
            "Error parsing true value. Path '', line 1, position 4.",
        );
    }

    #[test]
    fn numbers() -> TestResult {
        assert_eq!(vec![Token::Int(0)], read_all("0")?);
        assert_eq!(vec![Token::Int(-12)], read_all("-12")?);
        assert_eq!(vec![Token::Int(i64::MAX)], read_all("9223372036854775807")?);
        // i64 overflow falls back to BigInt
        assert_eq!(
            vec![Token::BigInt(BigInt::from_str("9223372036854775808")?)],
            read_all("9223372036854775808")?
        );
        assert_eq!(vec![Token::Float(1.5)], read_all("1.5")?);
        assert_eq!(vec![Token::Float(-1.5e10)], read_all("-1.5e10")?);
        assert_eq!(vec![Token::Float(120.0)], read_all("1.2e2")?);
        Ok(())
    }

    #[test]
    fn number_decimal_fallback() -> TestResult {
        // f64 overflow falls back to decimal
        assert_eq!(
            vec![Token::Decimal(BigDecimal::from_str("1e400")?)],
            read_all("1e400")?
        );
        // More significant digits than f64 can represent
        assert_eq!(
            vec![Token::Decimal(BigDecimal::from_str(
                "3.14159265358979323846264338327"
            )?)],
            read_all("3.14159265358979323846264338327")?
        );
        Ok(())
    }

    #[test]
    fn number_decimal_policy() -> TestResult {
        let settings = ReaderSettings {
            float_parse_handling: FloatParseHandling::Decimal,
            ..Default::default()
        };
        assert_eq!(
            vec![Token::Decimal(BigDecimal::from_str("1.5")?)],
            read_all_custom("1.5", settings.clone())?
        );
        // Integers are not affected by the float policy
        assert_eq!(vec![Token::Int(2)], read_all_custom("2", settings)?);
        Ok(())
    }

    #[test]
    fn malformed_numbers() {
        assert_syntax_error(
            "01",
            "Input string '01' is not a valid number. Path '', line 1, position 1.",
        );
        assert_syntax_error(
            "1e",
            "Input string '1e' is not a valid number. Path '', line 1, position 2.",
        );
        assert_syntax_error(
            "-",
            "Input string '-' is not a valid number. Path '', line 1, position 1.",
        );
        assert_syntax_error(
            "1.e5",
            "Input string '1.e' is not a valid number. Path '', line 1, position 2.",
        );
    }

    #[test]
    fn non_finite_numbers() -> TestResult {
        assert_syntax_error("NaN", "Cannot read NaN value. Path '', line 1, position 0.");
        assert_syntax_error(
            "-Infinity",
            "Cannot read -Infinity value. Path '', line 1, position 1.",
        );

        let settings = ReaderSettings {
            allow_non_finite_numbers: true,
            ..Default::default()
        };
        let tokens = read_all_custom("[NaN, Infinity, -Infinity]", settings)?;
        assert_eq!(4 + 1, tokens.len());
        assert!(matches!(tokens[1], Token::Float(f) if f.is_nan()));
        assert_eq!(Token::Float(f64::INFINITY), tokens[2]);
        assert_eq!(Token::Float(f64::NEG_INFINITY), tokens[3]);
        Ok(())
    }

    #[test]
    fn strings() -> TestResult {
        assert_eq!(
            vec![Token::String("".to_owned())],
            read_all(r#""""#)?
        );
        assert_eq!(
            vec![Token::String("ab cd".to_owned())],
            read_all(r#""ab cd""#)?
        );
        assert_eq!(
            vec![Token::String("a\"b\\c/d\u{0008}\u{000C}\n\r\t".to_owned())],
            read_all(r#""a\"b\\c\/d\b\f\n\r\t""#)?
        );
        assert_eq!(
            vec![Token::String("\u{0000}A\u{00E4}".to_owned())],
            read_all(r#""\u0000A\u00e4""#)?
        );
        // Surrogate pair escape
        assert_eq!(
            vec![Token::String("\u{10FFFF}".to_owned())],
            read_all(r#""\uDBFF\uDFFF""#)?
        );
        // Raw multi-byte UTF-8 chars
        assert_eq!(
            vec![Token::String("\u{00E4}\u{20AC}\u{10FFFF}".to_owned())],
            read_all("\"\u{00E4}\u{20AC}\u{10FFFF}\"")?
        );
        Ok(())
    }

    #[test]
    fn invalid_strings() {
        assert_syntax_error(
            "\"a\nb\"",
            "Invalid character in string. Character U+000A must be escaped. Path '', line 1, position 2.",
        );
        assert_syntax_error(
            r#""\x""#,
            "Bad JSON escape sequence: \\x. Path '', line 1, position 2.",
        );
        assert_syntax_error(
            r#""\u00G0""#,
            "Invalid Unicode escape sequence. Path '', line 1, position 5.",
        );
        // High surrogate without low surrogate
        assert_syntax_error(
            r#""\uD800a""#,
            "Unpaired UTF-16 surrogate in Unicode escape sequence. Path '', line 1, position 7.",
        );
        // Lone low surrogate
        assert_syntax_error(
            r#""\uDC00""#,
            "Unpaired UTF-16 surrogate in Unicode escape sequence. Path '', line 1, position 6.",
        );
        assert_syntax_error(
            "\"ab",
            "Unexpected end when reading JSON. Path '', line 1, position 3.",
        );
    }

    #[test]
    fn objects_and_arrays() -> TestResult {
        assert_eq!(
            vec![Token::BeginObject, Token::EndObject],
            read_all("{}")?
        );
        assert_eq!(
            vec![Token::BeginArray, Token::EndArray],
            read_all("[]")?
        );
        assert_eq!(
            vec![
                Token::BeginObject,
                Token::Name("a".to_owned()),
                Token::Int(1),
                Token::Name("b".to_owned()),
                Token::BeginArray,
                Token::Bool(true),
                Token::Null,
                Token::EndArray,
                Token::EndObject,
            ],
            read_all(r#"{"a": 1, "b": [true, null]}"#)?
        );
        Ok(())
    }

    #[test]
    fn structure_errors() {
        assert_syntax_error(
            "[1,]",
            "Unexpected character encountered while parsing value: ]. Path '[1]', line 1, position 3.",
        );
        assert_syntax_error(
            r#"{"a":1,}"#,
            "Invalid property identifier character: }. Path 'a', line 1, position 7.",
        );
        assert_syntax_error(
            r#"{"a" 1}"#,
            "Invalid character after parsing property name. Expected ':' but got: 1. Path 'a', line 1, position 5.",
        );
        assert_syntax_error(
            "[1 2]",
            "After parsing a value an unexpected character was encountered: 2. Path '[1]', line 1, position 3.",
        );
        assert_syntax_error(
            "[1",
            "Unexpected end when reading JSON. Path '[1]', line 1, position 2.",
        );
        assert_syntax_error(
            "",
            "Unexpected end when reading JSON. Path '', line 1, position 0.",
        );
        assert_syntax_error(
            "1 2",
            "Additional text encountered after finished reading JSON content: 2. Path '', line 1, position 2.",
        );
    }

    #[test]
    fn depth_limit() {
        let settings = ReaderSettings {
            max_depth: 1,
            ..Default::default()
        };
        let mut reader = JsonTextReader::new_custom(SliceSource::new(b"[[true]]"), settings);
        assert_eq!(Some(Token::BeginArray), reader.advance().unwrap());
        match reader.advance() {
            Err(e @ ReaderError::DepthExceeded { .. }) => {
                assert_eq!(
                    "The reader's MaxDepth of 1 has been exceeded. Path '[0]', line 1, position 1.",
                    e.to_string()
                );
            }
            result => panic!("Expected depth error, got: {result:?}"),
        }

        // Depth equal to the nesting succeeds
        let settings = ReaderSettings {
            max_depth: 2,
            ..Default::default()
        };
        assert_eq!(
            true,
            read_all_custom("[[true]]", settings).is_ok()
        );
    }

    #[test]
    fn nested_depth_error_path() {
        let settings = ReaderSettings {
            max_depth: 2,
            ..Default::default()
        };
        let mut reader = JsonTextReader::new_custom(
            SliceSource::new(br#"{"a": [{"b": 1}]}"#),
            settings,
        );
        let error = loop {
            match reader.advance() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("Expected depth error"),
                Err(e) => break e,
            }
        };
        assert_eq!(
            "The reader's MaxDepth of 2 has been exceeded. Path 'a[0]', line 1, position 7.",
            error.to_string()
        );
    }

    #[test]
    fn comments() -> TestResult {
        assert_eq!(
            vec![
                Token::Comment(" before".to_owned()),
                Token::BeginArray,
                Token::Int(1),
                Token::Comment(" inner ".to_owned()),
                Token::Int(2),
                Token::EndArray,
                Token::Comment(" after".to_owned()),
            ],
            read_all("// before\n[1, /* inner */ 2] // after")?
        );
        // "/***/" has a '*' as comment content
        assert_eq!(
            vec![Token::Comment("*".to_owned()), Token::Int(1)],
            read_all("/***/ 1")?
        );

        let settings = ReaderSettings {
            comment_handling: CommentHandling::Skip,
            ..Default::default()
        };
        assert_eq!(
            vec![Token::BeginArray, Token::Int(1), Token::EndArray],
            read_all_custom("[/* a */ 1 // b\n]", settings)?
        );

        assert_syntax_error(
            "/* a",
            "Unexpected end while parsing comment. Path '', line 1, position 4.",
        );
        assert_syntax_error(
            "/",
            "Unexpected end while parsing comment. Path '', line 1, position 1.",
        );
        Ok(())
    }

    #[test]
    fn dates() -> TestResult {
        let settings = ReaderSettings {
            date_parse_handling: DateParseHandling::DateTime,
            ..Default::default()
        };
        let tokens = read_all_custom(
            r#"["2000-01-01T12:30:00Z", "2000-01-01T12:30:00+02:00", "/Date(946684800000)/", "not a date", "2000-01-01"]"#,
            settings,
        )?;
        assert_eq!(
            Token::Date(DateTime::parse_from_rfc3339("2000-01-01T12:30:00Z")?),
            tokens[1]
        );
        assert_eq!(
            Token::Date(DateTime::parse_from_rfc3339("2000-01-01T12:30:00+02:00")?),
            tokens[2]
        );
        assert_eq!(
            Token::Date(DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")?),
            tokens[3]
        );
        // Strings which don't match a date form stay strings
        assert_eq!(Token::String("not a date".to_owned()), tokens[4]);
        assert_eq!(Token::String("2000-01-01".to_owned()), tokens[5]);

        // Date parsing is off by default
        assert_eq!(
            vec![Token::String("2000-01-01T12:30:00Z".to_owned())],
            read_all(r#""2000-01-01T12:30:00Z""#)?
        );
        Ok(())
    }

    #[test]
    fn legacy_date_with_offset() -> TestResult {
        let settings = ReaderSettings {
            date_parse_handling: DateParseHandling::DateTime,
            ..Default::default()
        };
        let tokens = read_all_custom(r#""/Date(946684800000+0230)/""#, settings)?;
        match &tokens[0] {
            Token::Date(date) => {
                assert_eq!(946684800000, date.timestamp_millis());
                assert_eq!(
                    2 * 3600 + 30 * 60,
                    date.offset().local_minus_utc()
                );
            }
            token => panic!("Expected date token, got: {token:?}"),
        }
        Ok(())
    }

    #[test]
    fn multiple_top_level() -> TestResult {
        assert_syntax_error(
            "1 2",
            "Additional text encountered after finished reading JSON content: 2. Path '', line 1, position 2.",
        );

        let settings = ReaderSettings {
            allow_multiple_top_level: true,
            ..Default::default()
        };
        assert_eq!(
            vec![
                Token::Bool(true),
                Token::BeginArray,
                Token::EndArray,
                Token::Int(1)
            ],
            read_all_custom("true [] 1", settings)?
        );
        Ok(())
    }

    #[test]
    fn line_and_position() -> TestResult {
        let mut reader = reader("{\r\n  \"a\": 1\n}");
        assert_eq!(Some(Token::BeginObject), reader.advance()?);
        assert_eq!(1, reader.line());
        assert_eq!(1, reader.position());
        assert_eq!(Some(Token::Name("a".to_owned())), reader.advance()?);
        assert_eq!(2, reader.line());
        assert_eq!(5, reader.position());
        assert_eq!(Some(Token::Int(1)), reader.advance()?);
        assert_eq!(Some(Token::EndObject), reader.advance()?);
        assert_eq!(3, reader.line());
        assert_eq!(None, reader.advance()?);
        Ok(())
    }

    #[test]
    fn crlf_counts_as_one_line_break() {
        assert_syntax_error(
            "\r\n\r\nx",
            "Unexpected character encountered while parsing value: x. Path '', line 3, position 0.",
        );
    }

    #[test]
    fn paths() -> TestResult {
        let mut reader = reader(r#"{"a": {"b": [1, {"c": true}]}}"#);
        let mut paths = Vec::new();
        while let Some(token) = reader.advance()? {
            if token.is_value_start() {
                paths.push(reader.path());
            }
        }
        // The path reported after a token points at the current or potential next
        // element: after BeginArray it is the first item, after an array item it
        // is the next item
        assert_eq!(
            vec![
                "".to_owned(),
                "a".to_owned(),
                "a.b[0]".to_owned(),
                "a.b[1]".to_owned(),
                "a.b[1]".to_owned(),
                "a.b[1].c".to_owned(),
            ],
            paths
        );
        Ok(())
    }

    #[test]
    fn path_tracking_disabled() {
        let settings = ReaderSettings {
            track_path: false,
            ..Default::default()
        };
        let mut reader = JsonTextReader::new_custom(SliceSource::new(b"[1"), settings);
        let error = loop {
            match reader.advance() {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert_eq!(
            "Unexpected end when reading JSON. Path '', line 1, position 2.",
            error.to_string()
        );
    }

    #[test]
    fn skip_values() -> TestResult {
        let mut reader = reader(r#"{"a": [{}, [1, 2], "s"], "b": 3}"#);
        assert_eq!(Some(Token::BeginObject), reader.advance()?);
        assert_eq!(Some(Token::Name("a".to_owned())), reader.advance()?);
        reader.skip_value()?;
        assert_eq!(Some(Token::Name("b".to_owned())), reader.advance()?);
        assert_eq!(Some(Token::Int(3)), reader.advance()?);
        assert_eq!(Some(Token::EndObject), reader.advance()?);
        Ok(())
    }

    /// A source yielding the data in chunks of fixed size
    struct ChunkedSource<'a> {
        data: &'a [u8],
        pos: usize,
        chunk_size: usize,
    }

    impl ByteSource for ChunkedSource<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
            let count = self
                .chunk_size
                .min(buf.len())
                .min(self.data.len() - self.pos);
            buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
            self.pos += count;
            Ok(count)
        }
    }

    /// A source which reports `WouldBlock` before every chunk
    struct BlockingEverySource<'a> {
        data: &'a [u8],
        pos: usize,
        chunk_size: usize,
        block_next: bool,
    }

    impl ByteSource for BlockingEverySource<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
            if self.block_next && self.pos < self.data.len() {
                self.block_next = false;
                return Err(std::io::Error::new(ErrorKind::WouldBlock, "no data yet"));
            }
            self.block_next = true;
            let count = self
                .chunk_size
                .min(buf.len())
                .min(self.data.len() - self.pos);
            buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
            self.pos += count;
            Ok(count)
        }
    }

    fn read_all_tokens_suspending<S: ByteSource>(
        mut reader: JsonTextReader<S>,
    ) -> Result<Vec<Token>, ReaderError> {
        let mut tokens = Vec::new();
        loop {
            match reader.advance() {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => return Ok(tokens),
                // Retry; the source will have data eventually
                Err(e) if e.is_incomplete() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    #[test]
    fn chunked_input_equivalence() -> TestResult {
        let json = r#"{"nested": {"values": [1234567890, -0.5e10, true, false, null, "text \"quotes\" 􏿿", "ä€", {}, []]}, "other": 3.14159265358979323846264338327}"#;

        let expected = read_all(json)?;
        assert!(!expected.is_empty());

        for chunk_size in [1, 2, 3, 7] {
            let reader = JsonTextReader::new(ChunkedSource {
                data: json.as_bytes(),
                pos: 0,
                chunk_size,
            });
            let tokens = read_all_tokens_suspending(reader)?;
            assert_eq!(expected, tokens, "chunk size {chunk_size}");
        }

        // Suspend-capable mode: WouldBlock before every 2-byte chunk
        let reader = JsonTextReader::new(BlockingEverySource {
            data: json.as_bytes(),
            pos: 0,
            chunk_size: 2,
            block_next: true,
        });
        let tokens = read_all_tokens_suspending(reader)?;
        assert_eq!(expected, tokens);
        Ok(())
    }

    #[test]
    fn chunked_input_identical_errors() {
        let json = r#"{"a": [1, 01]}"#;

        let full_error = match read_all(json) {
            Err(ReaderError::Syntax(e)) => e,
            result => panic!("Expected syntax error, got: {result:?}"),
        };

        let mut reader = JsonTextReader::new(BlockingEverySource {
            data: json.as_bytes(),
            pos: 0,
            chunk_size: 1,
            block_next: true,
        });
        let chunked_error = loop {
            match reader.advance() {
                Ok(_) => continue,
                Err(e) if e.is_incomplete() => continue,
                Err(ReaderError::Syntax(e)) => break e,
                Err(e) => panic!("Expected syntax error, got: {e:?}"),
            }
        };

        // Identical error, including path, line and position
        assert_eq!(full_error, chunked_error);
        assert_eq!(
            "Input string '01' is not a valid number. Path 'a[1]', line 1, position 11.",
            chunked_error.to_string()
        );
    }

    #[test]
    fn incomplete_leaves_state_intact() -> TestResult {
        // One WouldBlock before every single byte; additionally interleave
        // advance() calls so suspension happens in the middle of tokens
        let json = r#"["string value", 12.5, null]"#;
        let mut reader = JsonTextReader::new(BlockingEverySource {
            data: json.as_bytes(),
            pos: 0,
            chunk_size: 1,
            block_next: true,
        });

        let mut tokens = Vec::new();
        let mut incomplete_count = 0;
        loop {
            match reader.advance() {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => break,
                Err(e) if e.is_incomplete() => {
                    incomplete_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        assert_eq!(
            vec![
                Token::BeginArray,
                Token::String("string value".to_owned()),
                Token::Float(12.5),
                Token::Null,
                Token::EndArray,
            ],
            tokens
        );
        // Suspended at least once per byte
        assert!(incomplete_count >= json.len());
        Ok(())
    }

    #[test]
    fn bom_is_rejected() {
        assert_syntax_error(
            "\u{FEFF}1",
            "Unexpected character encountered while parsing value: ï. Path '', line 1, position 0.",
        );
    }
}
