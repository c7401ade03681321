//! Reply Values
//!
//! Every `ok` payload is coerced into a [`Value`] according to the
//! [`ResultKind`] the command table assigns to the command.

use crate::commands::table::ResultKind;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// A coerced reply value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Reply of an integer command (`set`, `incr`, `zget`, ...)
    Integer(i64),

    /// Reply of a float command (`zavg`)
    Float(f64),

    /// Reply of a string command (`get`, `qpop`, ...), binary safe
    String(Bytes),

    /// Reply of a boolean command (`exists`, `hexists`, ...)
    Boolean(bool),

    /// Raw payload of a list command (`keys`, `hgetall`, `info`, ...)
    List(Vec<Bytes>),
}

/// Errors that can occur while coercing a payload.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoerceError {
    /// A scalar kind needs at least one payload element
    #[error("empty payload")]
    EmptyPayload,

    /// The first element is not a base-10 integer
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// The first element is not a floating point number
    #[error("invalid float: {0:?}")]
    InvalidFloat(String),
}

impl ResultKind {
    /// Coerces a reply payload (status already stripped) into a [`Value`].
    ///
    /// # Example
    ///
    /// ```
    /// use ssdb_client::commands::{ResultKind, Value};
    /// use bytes::Bytes;
    ///
    /// let value = ResultKind::Boolean.coerce(vec![Bytes::from("5")]).unwrap();
    /// assert_eq!(value, Value::Boolean(true));
    /// ```
    pub fn coerce(self, payload: Vec<Bytes>) -> Result<Value, CoerceError> {
        match self {
            ResultKind::List => Ok(Value::List(payload)),
            ResultKind::Integer => parse_integer(&first(payload)?).map(Value::Integer),
            ResultKind::Float => parse_float(&first(payload)?).map(Value::Float),
            ResultKind::String => first(payload).map(Value::String),
            ResultKind::Boolean => {
                parse_integer(&first(payload)?).map(|n| Value::Boolean(n != 0))
            }
        }
    }
}

/// Scalar kinds only look at the first payload element.
fn first(payload: Vec<Bytes>) -> Result<Bytes, CoerceError> {
    payload.into_iter().next().ok_or(CoerceError::EmptyPayload)
}

fn parse_integer(raw: &[u8]) -> Result<i64, CoerceError> {
    let text = String::from_utf8_lossy(raw);
    text.trim()
        .parse()
        .map_err(|_| CoerceError::InvalidInteger(text.into_owned()))
}

fn parse_float(raw: &[u8]) -> Result<f64, CoerceError> {
    let text = String::from_utf8_lossy(raw);
    text.trim()
        .parse()
        .map_err(|_| CoerceError::InvalidFloat(text.into_owned()))
}

impl Value {
    /// Returns the inner integer, if this is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the inner float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the inner boolean, if this is a `Boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the raw bytes of a `String`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    /// Returns a `String` value as `&str` if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the elements of a `List`.
    pub fn as_list(&self) -> Option<&[Bytes]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Consumes self and returns the elements if this is a `List`.
    pub fn into_list(self) -> Option<Vec<Bytes>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Pairs up a flat `List` (`hgetall`, `scan`, `zrange`, ...) into
    /// key/value tuples. A trailing odd element is dropped.
    pub fn into_pairs(self) -> Option<Vec<(Bytes, Bytes)>> {
        let items = self.into_list()?;
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            pairs.push((k, v));
        }
        Some(pairs)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::Float(x) => write!(f, "(float) {}", x),
            Value::Boolean(b) => write!(f, "(boolean) {}", b),
            Value::String(data) => fmt_bytes(f, data),
            Value::List(items) => {
                if items.is_empty() {
                    write!(f, "(empty list)")
                } else {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}) ", i + 1)?;
                        fmt_bytes(f, item)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

fn fmt_bytes(f: &mut fmt::Formatter<'_>, data: &[u8]) -> fmt::Result {
    match std::str::from_utf8(data) {
        Ok(s) => write!(f, "\"{}\"", s),
        Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
    }
}
