//! The line-oriented text format used for table backups.
//!
//! Line 1 is a header of column names, every following record is one row.
//! Fields are separated by [`DELIMITER`] and wrapped in [`QUOTE`] only when
//! they contain the delimiter, a quote, CR or LF; embedded quotes are
//! doubled. An empty unquoted field is `NULL`, a quoted empty field (`""`)
//! is the empty string. Quoted fields may span several physical lines.
//!
//! Storage-level encodings live here too: floating point values travel as
//! the hex digits of their IEEE-754 bit pattern and blobs as padded
//! standard base64.
//!
//! # Examples
//!
//! ```
//! use record_store_core::interchange::{escape, join_row, split_record};
//!
//! assert_eq!(escape(Some("a,b")), "\"a,b\"");
//! let line = join_row(&[Some("1".into()), None, Some("say \"hi\"".into())]);
//! assert_eq!(line, "1,,\"say \"\"hi\"\"\"");
//! assert_eq!(
//!     split_record(&line),
//!     vec![Some("1".into()), None, Some("say \"hi\"".into())]
//! );
//! ```

use std::io::{self, BufRead};

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{CoreError, Result};
use crate::types::{SqlValue, StorageClass};

/// Field separator.
pub const DELIMITER: char = ',';

/// Quote character.
pub const QUOTE: char = '"';

/// Escapes one field value. `None` becomes an empty field.
pub fn escape(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if value.is_empty() {
        return "\"\"".to_string();
    }
    if value.contains([DELIMITER, QUOTE, '\r', '\n']) {
        let mut out = String::with_capacity(value.len() + 2);
        out.push(QUOTE);
        for c in value.chars() {
            if c == QUOTE {
                out.push(QUOTE);
            }
            out.push(c);
        }
        out.push(QUOTE);
        out
    } else {
        value.to_string()
    }
}

/// Reverses [`escape`] for a single field token.
///
/// Tokens not wrapped in quotes are returned unchanged.
pub fn unescape(token: &str) -> String {
    if token.len() >= 2 && token.starts_with(QUOTE) && token.ends_with(QUOTE) {
        token[1..token.len() - 1].replace("\"\"", "\"")
    } else {
        token.to_string()
    }
}

/// Escapes every value and joins them with the delimiter.
pub fn join_row(values: &[Option<String>]) -> String {
    values
        .iter()
        .map(|v| escape(v.as_deref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Splits one logical record into its fields.
///
/// Unquoted empty fields yield `None`. A quote appearing inside an unquoted
/// field is kept literally.
pub fn split_record(record: &str) -> Vec<Option<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    current.push(QUOTE);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == DELIMITER {
            fields.push(finish_field(&mut current, quoted));
            quoted = false;
        } else if c == QUOTE && current.is_empty() && !quoted {
            quoted = true;
            in_quotes = true;
        } else {
            current.push(c);
        }
    }
    fields.push(finish_field(&mut current, quoted));
    fields
}

fn finish_field(current: &mut String, quoted: bool) -> Option<String> {
    let value = std::mem::take(current);
    if quoted || !value.is_empty() {
        Some(value)
    } else {
        None
    }
}

/// Reads logical records from interchange text.
///
/// A record ends at the first line break outside quotes, so a quoted value
/// containing newlines is returned as one record with the newlines intact.
pub struct RecordReader<R> {
    inner: R,
    line: usize,
}

impl<R: BufRead> RecordReader<R> {
    /// Wraps a buffered reader.
    pub fn new(inner: R) -> Self {
        Self { inner, line: 0 }
    }

    /// Physical lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Returns the next record without its terminator, or `None` at end of
    /// input.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] when input ends inside a
    /// quoted value, and propagates read errors.
    pub fn next_record(&mut self) -> io::Result<Option<String>> {
        let mut record = String::new();
        let mut quotes = 0usize;
        loop {
            let start = record.len();
            let read = self.inner.read_line(&mut record)?;
            if read == 0 {
                if record.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unterminated quoted value starting before line {}", self.line),
                ));
            }
            self.line += 1;
            quotes += record[start..].matches(QUOTE).count();
            if quotes % 2 == 0 {
                break;
            }
        }
        if record.ends_with('\n') {
            record.pop();
            if record.ends_with('\r') {
                record.pop();
            }
        }
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Encodes an `f64` as the 16 lowercase hex digits of its bit pattern.
pub fn encode_f64(value: f64) -> String {
    format!("{:016x}", value.to_bits())
}

/// Decodes a value written by [`encode_f64`].
///
/// Also accepts the older signed form, where the bit pattern was printed as
/// a signed 64-bit integer in radix 16 (`-401c3910c8d016b0`) and leading
/// zeros were dropped.
pub fn decode_f64(text: &str) -> Result<f64> {
    let text = text.trim();
    let bits = if text.starts_with('-') {
        i64::from_str_radix(text, 16).map(|v| v as u64)
    } else {
        u64::from_str_radix(text, 16)
    }
    .map_err(|e| CoreError::ConversionError(format!("invalid double bits '{text}': {e}")))?;
    Ok(f64::from_bits(bits))
}

/// Encodes an `f32` as the 8 lowercase hex digits of its bit pattern.
pub fn encode_f32(value: f32) -> String {
    format!("{:08x}", value.to_bits())
}

/// Decodes a value written by [`encode_f32`].
///
/// Older backups stored floats as decimal text (`1.618034`, `NaN`); those
/// are recognised by their decimal point or special name and parsed as
/// decimal.
pub fn decode_f32(text: &str) -> Result<f32> {
    let text = text.trim();
    if text.contains('.') || matches!(text, "NaN" | "Infinity" | "-Infinity") {
        let normalized = text.replace("Infinity", "inf");
        return normalized
            .parse::<f32>()
            .map_err(|e| CoreError::ConversionError(format!("invalid float '{text}': {e}")));
    }
    let bits = if text.starts_with('-') {
        i32::from_str_radix(text, 16).map(|v| v as u32)
    } else {
        u32::from_str_radix(text, 16)
    }
    .map_err(|e| CoreError::ConversionError(format!("invalid float bits '{text}': {e}")))?;
    Ok(f32::from_bits(bits))
}

/// Encodes bytes as padded standard base64 without line breaks.
pub fn encode_blob(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes padded standard base64.
pub fn decode_blob(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| CoreError::ConversionError(format!("invalid base64: {e}")))
}

/// Encodes a stored value by its storage class alone.
///
/// Used for columns that no converter describes: integers as decimal,
/// reals as hex bits, text verbatim, blobs as base64.
pub fn encode_stored(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(v) => Some(v.to_string()),
        SqlValue::Real(v) => Some(encode_f64(*v)),
        SqlValue::Text(v) => Some(v.clone()),
        SqlValue::Blob(v) => Some(encode_blob(v)),
    }
}

/// Decodes interchange text into a stored value of the given class.
pub fn decode_stored(class: StorageClass, text: &str) -> Result<SqlValue> {
    Ok(match class {
        StorageClass::Integer => SqlValue::Integer(text.trim().parse().map_err(|e| {
            CoreError::ConversionError(format!("invalid integer '{text}': {e}"))
        })?),
        StorageClass::Real => SqlValue::Real(decode_f64(text)?),
        StorageClass::Text => SqlValue::Text(text.to_string()),
        StorageClass::Blob => SqlValue::Blob(decode_blob(text)?),
    })
}
