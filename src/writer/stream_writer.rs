//! Streaming implementation of a JSON writer

use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use num_bigint::BigInt;

use super::*;
use crate::reader::json_path::{format_path, PathPiece};
use crate::reader::{SyntaxErrorKind, TokenRead};

pub(crate) const WRITER_BUF_SIZE: usize = 1024;

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

/// A JSON writer which writes data to a [`Write`]
///
/// This writer internally buffers data so it is normally not necessary to wrap the
/// provided writer in a [`std::io::BufWriter`]. The data written to the underlying
/// writer is valid UTF-8 data without a leading byte order mark.
///
/// Misuse which would produce malformed JSON, such as writing a value when a member
/// name is expected, fails with [`WriterError::InvalidState`]; nothing is written in
/// that case. Once the JSON document is complete, [`close`](Self::close) must be
/// called to auto-complete any open containers and flush the internal buffer.
pub struct JsonTextWriter<W: Write> {
    writer: W,
    buf: [u8; WRITER_BUF_SIZE],
    /// Index (starting at 0) within [`buf`](Self::buf) where to write next,
    /// respectively how many bytes have already been written to the buffer
    buf_write_pos: usize,
    /// Whether the current array or object is empty, or at top-level whether
    /// at least one value has been written already
    is_empty: bool,
    expects_name: bool,
    stack: Vec<Frame>,
    indentation_level: u32,
    json_path: Vec<PathPiece>,

    settings: WriterSettings,
}

// Implementation with public constructor methods
impl<W: Write> JsonTextWriter<W> {
    /// Creates a JSON writer with [default settings](WriterSettings::default)
    pub fn new(writer: W) -> Self {
        JsonTextWriter::new_custom(writer, WriterSettings::default())
    }

    /// Creates a JSON writer with custom settings
    pub fn new_custom(writer: W, settings: WriterSettings) -> Self {
        Self {
            writer,
            buf: [0_u8; WRITER_BUF_SIZE],
            buf_write_pos: 0,
            is_empty: true,
            expects_name: false,
            stack: Vec::with_capacity(16),
            indentation_level: 0,
            json_path: Vec::with_capacity(16),
            settings,
        }
    }

    /// Gets the settings of this writer
    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }
}

// Implementation with low level byte writing methods
impl<W: Write> JsonTextWriter<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let mut pos = 0;
        while pos < bytes.len() {
            let copied_count = (self.buf.len() - self.buf_write_pos).min(bytes.len() - pos);
            self.buf[self.buf_write_pos..(self.buf_write_pos + copied_count)]
                .copy_from_slice(&bytes[pos..(pos + copied_count)]);
            self.buf_write_pos += copied_count;
            pos += copied_count;

            if self.buf_write_pos >= self.buf.len() {
                // write_all retries on `ErrorKind::Interrupted`, as desired
                self.writer.write_all(&self.buf)?;
                self.buf_write_pos = 0;
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriterError> {
        // write_all retries on `ErrorKind::Interrupted`, as desired
        self.writer.write_all(&self.buf[0..self.buf_write_pos])?;
        self.buf_write_pos = 0;
        self.writer.flush()?;
        Ok(())
    }
}

// Implementation with JSON structure state inspection methods, and general value methods
impl<W: Write> JsonTextWriter<W> {
    fn is_in_array(&self) -> bool {
        self.stack
            .last()
            .map_or(false, |f| f.container == Container::Array)
    }

    fn is_in_object(&self) -> bool {
        self.stack
            .last()
            .map_or(false, |f| f.container == Container::Object)
    }

    fn state(&self) -> WriteState {
        match self.stack.last().map(|f| f.container) {
            Some(Container::Object) => {
                if !self.expects_name {
                    WriteState::Property
                } else if self.is_empty {
                    WriteState::ObjectStart
                } else {
                    WriteState::Object
                }
            }
            Some(Container::Array) => {
                if self.is_empty {
                    WriteState::ArrayStart
                } else {
                    WriteState::Array
                }
            }
            None => {
                if self.is_empty {
                    WriteState::Start
                } else {
                    WriteState::Finished
                }
            }
        }
    }

    fn invalid_state<T>(&self, token: TokenKind) -> Result<T, WriterError> {
        Err(WriterError::InvalidState {
            token,
            state: self.state(),
            path: self.path(),
        })
    }

    fn increase_indentation(&mut self) {
        self.indentation_level += 1;
    }

    fn decrease_indentation(&mut self) {
        self.indentation_level -= 1;
    }

    fn write_indentation(&mut self) -> Result<(), WriterError> {
        if let Some(unit) = self.settings.indentation.clone() {
            for _ in 0..self.indentation_level {
                self.write_bytes(unit.as_bytes())?;
            }
        }
        Ok(())
    }

    fn before_container_element(&mut self) -> Result<(), WriterError> {
        let pretty = self.settings.indentation.is_some();
        if self.is_empty {
            if pretty {
                // Convert "[" (respectively "{") to "[\n..."
                self.write_bytes(b"\n")?;
                self.increase_indentation();
                self.write_indentation()?;
            }
        } else {
            #[allow(clippy::collapsible_else_if)]
            if pretty {
                self.write_bytes(b",\n")?;
                self.write_indentation()?;
            } else {
                self.write_bytes(b",")?;
            }
        }
        Ok(())
    }

    /// Performs state checks and writes separators in front of a value token
    fn before_value(&mut self, token: TokenKind) -> Result<(), WriterError> {
        match self.state() {
            WriteState::Start | WriteState::Property | WriteState::ArrayStart | WriteState::Array => {}
            WriteState::ObjectStart | WriteState::Object | WriteState::Finished => {
                return self.invalid_state(token);
            }
        }

        if self.is_in_array() {
            self.before_container_element()?;
        }
        self.is_empty = false;

        if self.is_in_object() {
            // After this value a name will be expected
            self.expects_name = true;
        }

        Ok(())
    }

    /// Path bookkeeping after a value has been fully written
    fn finish_value(&mut self) {
        if self.is_in_array() {
            if let Some(PathPiece::Index(i)) = self.json_path.last_mut() {
                *i += 1;
            }
        }
    }

    fn on_container_end(&mut self) -> Result<(), WriterError> {
        let frame = self.stack.pop();

        if !self.is_empty && self.settings.indentation.is_some() {
            self.write_bytes(b"\n")?;
            self.decrease_indentation();
            self.write_indentation()?;
        }

        match frame.map(|f| (f.container, f.has_path_piece)) {
            Some((Container::Array, _)) => {
                self.json_path.pop();
            }
            Some((Container::Object, true)) => {
                self.json_path.pop();
            }
            _ => {}
        }

        // Enclosing container is not empty since this method call here is processing its child
        self.is_empty = false;

        // If after pop() call above currently in object, then expecting a member name
        self.expects_name = self.is_in_object();
        self.finish_value();
        Ok(())
    }
}

// Implementation with string writing methods
impl<W: Write> JsonTextWriter<W> {
    fn should_escape(&self, c: char) -> bool {
        matches!(c, '"' | '\\')
        // Control characters which must be escaped per JSON specification
        || matches!(c, '\u{0}'..='\u{1F}')
            || (self.settings.escape_non_ascii && !c.is_ascii())
    }

    fn write_escaped_char(&mut self, c: char) -> Result<(), WriterError> {
        fn get_unicode_escape(value: u32) -> [u8; 4] {
            // For convenience `value` is u32, but it is actually u16
            debug_assert!(value <= u16::MAX as u32);

            fn to_hex(i: u32) -> u8 {
                match i {
                    0..=9 => b'0' + i as u8,
                    10..=15 => b'A' + (i - 10) as u8,
                    _ => unreachable!("Unexpected value {i}"),
                }
            }

            [
                to_hex(value >> 12 & 15),
                to_hex(value >> 8 & 15),
                to_hex(value >> 4 & 15),
                to_hex(value & 15),
            ]
        }

        let escape = match c {
            '"' => "\\\"",
            '\\' => "\\\\",
            '\u{0008}' => "\\b",
            '\u{000C}' => "\\f",
            '\n' => "\\n",
            '\r' => "\\r",
            '\t' => "\\t",
            '\0'..='\u{FFFF}' => {
                self.write_bytes(b"\\u")?;
                self.write_bytes(&get_unicode_escape(c as u32))?;
                return Ok(());
            }
            _ => {
                // Encode as surrogate pair
                let temp = (c as u32) - 0x10000;
                let high = (temp >> 10) + 0xD800;
                let low = (temp & ((1 << 10) - 1)) + 0xDC00;

                self.write_bytes(b"\\u")?;
                self.write_bytes(&get_unicode_escape(high))?;

                self.write_bytes(b"\\u")?;
                self.write_bytes(&get_unicode_escape(low))?;
                return Ok(());
            }
        };
        self.write_bytes(escape.as_bytes())
    }

    fn write_string_escaped(&mut self, value: &str) -> Result<(), WriterError> {
        self.write_bytes(b"\"")?;

        let bytes = value.as_bytes();
        let mut next_to_write_index = 0;

        for (index, char) in value.char_indices() {
            if self.should_escape(char) {
                if index > next_to_write_index {
                    self.write_bytes(&bytes[next_to_write_index..index])?;
                }
                self.write_escaped_char(char)?;
                next_to_write_index = index + char.len_utf8();
            }
        }
        // Write remaining bytes
        if next_to_write_index < bytes.len() {
            self.write_bytes(&bytes[next_to_write_index..])?;
        }

        self.write_bytes(b"\"")
    }
}

// Implementation with the token writing methods
impl<W: Write> JsonTextWriter<W> {
    /// Begins writing a JSON object
    pub fn begin_object(&mut self) -> Result<(), WriterError> {
        self.before_value(TokenKind::BeginObject)?;
        self.stack.push(Frame {
            container: Container::Object,
            has_path_piece: false,
        });
        self.is_empty = true;
        self.expects_name = true;
        self.write_bytes(b"{")
    }

    /// Writes the closing bracket `}` of the current JSON object
    pub fn end_object(&mut self) -> Result<(), WriterError> {
        match self.state() {
            WriteState::ObjectStart | WriteState::Object => {}
            _ => return self.invalid_state(TokenKind::EndObject),
        }
        self.on_container_end()?;
        self.write_bytes(b"}")
    }

    /// Begins writing a JSON array
    pub fn begin_array(&mut self) -> Result<(), WriterError> {
        self.before_value(TokenKind::BeginArray)?;
        self.stack.push(Frame {
            container: Container::Array,
            has_path_piece: false,
        });
        self.is_empty = true;
        // Only relevant for objects; will be restored when the enclosing object continues
        self.expects_name = false;
        self.json_path.push(PathPiece::Index(0));
        self.write_bytes(b"[")
    }

    /// Writes the closing bracket `]` of the current JSON array
    pub fn end_array(&mut self) -> Result<(), WriterError> {
        match self.state() {
            WriteState::ArrayStart | WriteState::Array => {}
            _ => return self.invalid_state(TokenKind::EndArray),
        }
        self.on_container_end()?;
        self.write_bytes(b"]")
    }

    /// Writes the name of the next JSON object member
    ///
    /// Characters are automatically escaped in the JSON output if necessary.
    /// This method does not detect or prevent duplicate member names.
    pub fn name(&mut self, name: &str) -> Result<(), WriterError> {
        match self.state() {
            WriteState::ObjectStart | WriteState::Object => {}
            _ => return self.invalid_state(TokenKind::Name),
        }
        self.before_container_element()?;
        self.write_string_escaped(name)?;
        self.write_bytes(if self.settings.indentation.is_some() {
            b": "
        } else {
            b":"
        })?;
        self.expects_name = false;

        let has_piece = self.stack.last().map_or(false, |f| f.has_path_piece);
        if has_piece {
            if let Some(last) = self.json_path.last_mut() {
                *last = PathPiece::Member(name.to_owned());
            }
        } else {
            self.json_path.push(PathPiece::Member(name.to_owned()));
            if let Some(frame) = self.stack.last_mut() {
                frame.has_path_piece = true;
            }
        }

        Ok(())
    }

    /// Writes a JSON string value
    ///
    /// Characters are automatically escaped in the JSON output if necessary.
    pub fn string_value(&mut self, value: &str) -> Result<(), WriterError> {
        self.before_value(TokenKind::String)?;
        self.write_string_escaped(value)?;
        self.finish_value();
        Ok(())
    }

    /// Writes a JSON boolean value
    pub fn bool_value(&mut self, value: bool) -> Result<(), WriterError> {
        self.before_value(TokenKind::Bool)?;
        self.write_bytes(if value { b"true" } else { b"false" })?;
        self.finish_value();
        Ok(())
    }

    /// Writes a JSON null value
    pub fn null_value(&mut self) -> Result<(), WriterError> {
        self.before_value(TokenKind::Null)?;
        self.write_bytes(b"null")?;
        self.finish_value();
        Ok(())
    }

    /// Writes the non-standard `undefined` literal
    pub fn undefined_value(&mut self) -> Result<(), WriterError> {
        self.before_value(TokenKind::Undefined)?;
        self.write_bytes(b"undefined")?;
        self.finish_value();
        Ok(())
    }

    /// Writes an integer JSON number value
    pub fn int_value(&mut self, value: i64) -> Result<(), WriterError> {
        self.before_value(TokenKind::Int)?;
        self.write_bytes(value.to_string().as_bytes())?;
        self.finish_value();
        Ok(())
    }

    /// Writes an arbitrary precision integer JSON number value
    pub fn bigint_value(&mut self, value: &BigInt) -> Result<(), WriterError> {
        self.before_value(TokenKind::BigInt)?;
        self.write_bytes(value.to_string().as_bytes())?;
        self.finish_value();
        Ok(())
    }

    /// Writes a floating point JSON number value
    ///
    /// Finite values are written in their minimal round-trippable representation,
    /// with at least one fractional digit so that the value reads back as a floating
    /// point number. Non-finite values follow
    /// [`non_finite_handling`](WriterSettings::non_finite_handling); by default they
    /// fail with [`WriterError::InvalidNumber`].
    pub fn float_value(&mut self, value: f64) -> Result<(), WriterError> {
        if !value.is_finite() {
            return match self.settings.non_finite_handling {
                NonFiniteHandling::Error => Err(WriterError::InvalidNumber(format!(
                    "non-finite number: {value}"
                ))),
                NonFiniteHandling::Literal => {
                    self.before_value(TokenKind::Float)?;
                    let literal: &[u8] = if value.is_nan() {
                        b"NaN"
                    } else if value > 0.0 {
                        b"Infinity"
                    } else {
                        b"-Infinity"
                    };
                    self.write_bytes(literal)?;
                    self.finish_value();
                    Ok(())
                }
                NonFiniteHandling::Null => self.null_value(),
            };
        }

        self.before_value(TokenKind::Float)?;
        let mut string = value.to_string();
        if !string.contains(['.', 'e', 'E']) {
            string.push_str(".0");
        }
        self.write_bytes(string.as_bytes())?;
        self.finish_value();
        Ok(())
    }

    /// Writes a fixed-point decimal JSON number value
    ///
    /// A value with an all-zero fractional part still emits one fractional digit
    /// (for example `0.0`) to preserve its contracted precision.
    pub fn decimal_value(&mut self, value: &BigDecimal) -> Result<(), WriterError> {
        self.before_value(TokenKind::Decimal)?;
        let mut string = value.to_string();
        if !string.contains(['.', 'e', 'E']) {
            string.push_str(".0");
        }
        self.write_bytes(string.as_bytes())?;
        self.finish_value();
        Ok(())
    }

    /// Writes a date value as JSON string
    ///
    /// The textual form follows [`date_format_handling`](WriterSettings::date_format_handling).
    pub fn date_value(&mut self, value: &DateTime<FixedOffset>) -> Result<(), WriterError> {
        let string = match self.settings.date_format_handling {
            DateFormatHandling::Iso => value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            DateFormatHandling::Legacy => {
                let millis = value.timestamp_millis();
                let offset_seconds = value.offset().local_minus_utc();
                if offset_seconds == 0 {
                    format!("/Date({millis})/")
                } else {
                    let sign = if offset_seconds < 0 { '-' } else { '+' };
                    let abs = offset_seconds.unsigned_abs();
                    format!("/Date({millis}{sign}{:02}{:02})/", abs / 3600, (abs % 3600) / 60)
                }
            }
        };
        self.before_value(TokenKind::Date)?;
        self.write_string_escaped(&string)?;
        self.finish_value();
        Ok(())
    }

    /// Writes a byte array value as base64 JSON string
    pub fn bytes_value(&mut self, value: &[u8]) -> Result<(), WriterError> {
        self.before_value(TokenKind::Bytes)?;
        let encoded = BASE64.encode(value);
        self.write_string_escaped(&encoded)?;
        self.finish_value();
        Ok(())
    }

    /// Writes a pre-rendered JSON fragment verbatim
    ///
    /// The fragment is not validated; the caller is responsible for it being a
    /// well-formed JSON value.
    pub fn raw_value(&mut self, value: &str) -> Result<(), WriterError> {
        self.before_value(TokenKind::Raw)?;
        self.write_bytes(value.as_bytes())?;
        self.finish_value();
        Ok(())
    }

    /// Accepts a comment without emitting anything
    ///
    /// Comments are input trivia; the writer never emits them.
    pub fn comment(&mut self, _text: &str) -> Result<(), WriterError> {
        Ok(())
    }

    /// Consumes one value's worth of tokens from the reader and writes them
    ///
    /// Formatting and escaping follow this writer's settings, so whitespace and
    /// comments of the source document are not preserved. A reader which ends
    /// prematurely surfaces as [`WriterError::IncompleteRead`] naming the reader's
    /// truncation path; the already written prefix is not rolled back.
    pub fn write_all_from(&mut self, reader: &mut dyn TokenRead) -> Result<(), TransferError> {
        let mut depth = 0_usize;
        loop {
            let token = match reader.advance() {
                Ok(Some(token)) => token,
                Ok(None) => {
                    return Err(TransferError::Writer(WriterError::IncompleteRead {
                        path: reader.path(),
                    }));
                }
                Err(ReaderError::Syntax(e)) if e.kind == SyntaxErrorKind::UnexpectedEnd => {
                    return Err(TransferError::Writer(WriterError::IncompleteRead {
                        path: e.path,
                    }));
                }
                Err(e) => return Err(e.into()),
            };
            match &token {
                Token::Comment(_) => continue,
                Token::BeginObject | Token::BeginArray => {
                    self.write_token(&token)?;
                    depth += 1;
                }
                Token::EndObject | Token::EndArray => {
                    self.write_token(&token)?;
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Name(_) => self.write_token(&token)?,
                _ => {
                    self.write_token(&token)?;
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Completes the document and flushes the buffer
    ///
    /// Open containers are auto-completed: a dangling member name receives a `null`
    /// value and the necessary end tokens are emitted. Per
    /// [`close_output`](WriterSettings::close_output) the underlying sink is either
    /// dropped (`None` is returned) or handed back (`Some(sink)`).
    pub fn close(mut self) -> Result<Option<W>, WriterError> {
        while !self.stack.is_empty() {
            if self.is_in_object() {
                if !self.expects_name {
                    // Auto-complete the dangling member
                    self.null_value()?;
                }
                self.end_object()?;
            } else {
                self.end_array()?;
            }
        }
        self.flush()?;
        if self.settings.close_output {
            Ok(None)
        } else {
            Ok(Some(self.writer))
        }
    }
}

impl<W: Write> TokenWrite for JsonTextWriter<W> {
    fn write_token(&mut self, token: &Token) -> Result<(), WriterError> {
        match token {
            Token::BeginObject => self.begin_object(),
            Token::EndObject => self.end_object(),
            Token::BeginArray => self.begin_array(),
            Token::EndArray => self.end_array(),
            Token::Name(name) => self.name(name),
            Token::String(value) => self.string_value(value),
            Token::Int(value) => self.int_value(*value),
            Token::BigInt(value) => self.bigint_value(value),
            Token::Float(value) => self.float_value(*value),
            Token::Decimal(value) => self.decimal_value(value),
            Token::Bool(value) => self.bool_value(*value),
            Token::Null => self.null_value(),
            Token::Undefined => self.undefined_value(),
            Token::Date(value) => self.date_value(value),
            Token::Bytes(value) => self.bytes_value(value),
            Token::Comment(text) => self.comment(text),
            Token::Raw(value) => self.raw_value(value),
        }
    }

    fn write_name(&mut self, name: &str) -> Result<(), WriterError> {
        self.name(name)
    }

    fn write_string(&mut self, value: &str) -> Result<(), WriterError> {
        self.string_value(value)
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn path(&self) -> String {
        format_path(&self.json_path)
    }
}
