//! Command Module
//!
//! This module holds everything the client knows about individual commands:
//! which kind of value each one returns, how that value is coerced, and how
//! parameters are turned into wire bytes.
//!
//! ## Architecture
//!
//! ```text
//! Client::set("k", ...)       Response "ok" ["1"]
//!       │                            │
//!       ▼                            ▼
//! ┌─────────────────┐       ┌─────────────────┐
//! │     ToArg       │       │  Command Table  │  set => Integer
//! │  (arg module)   │       │ (table module)  │
//! └────────┬────────┘       └────────┬────────┘
//!          │                         │
//!          ▼                         ▼
//!   Vec<Bytes> params        ResultKind::coerce  →  Value::Integer(1)
//! ```
//!
//! ## Result Kinds
//!
//! - `Integer`: `set`, `del`, `incr`, `hsize`, `zget`, `qsize`, ...
//! - `Float`: `zavg`
//! - `String`: `get`, `hget`, `qpop`, ...
//! - `Boolean`: `exists`, `hexists`, `zexists`
//! - `List`: `keys`, `scan`, `hgetall`, `zrange`, `info`, ...

pub mod arg;
pub mod table;
pub mod value;

// Re-export the command table and values
pub use arg::ToArg;
pub use table::{result_kind, result_kind_or_default, ResultKind, COMMANDS};
pub use value::{CoerceError, Value};
