//! Command Table
//!
//! Static mapping from command name to the kind its `ok` payload is coerced
//! to. The list lives in a single macro, `for_each_command!`, which feeds
//! both the lookup below and the typed methods on
//! [`Client`](crate::client::Client), so the two can never drift apart.
//!
//! Commands missing from the table can still be issued through
//! [`Client::call`](crate::client::Client::call); their replies are treated as
//! strings.

/// The kind a reply payload is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// First payload element parsed as a base-10 `i64`
    Integer,
    /// First payload element parsed as an `f64`
    Float,
    /// First payload element, verbatim
    String,
    /// First payload element parsed as an integer, non-zero is `true`
    Boolean,
    /// The whole payload, unchanged
    List,
}

impl ResultKind {
    /// Lowercase name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Integer => "integer",
            ResultKind::Float => "float",
            ResultKind::String => "string",
            ResultKind::Boolean => "boolean",
            ResultKind::List => "list",
        }
    }
}

/// Invokes `$callback!` with the full `name => Kind` command list.
macro_rules! for_each_command {
    ($callback:ident) => {
        $callback! {
            // Key-value
            set => Integer,
            setx => Integer,
            expire => Integer,
            ttl => Integer,
            setnx => Integer,
            get => String,
            getset => String,
            del => Integer,
            incr => Integer,
            exists => Boolean,
            getbit => Integer,
            setbit => Integer,
            countbit => Integer,
            substr => String,
            strlen => Integer,
            keys => List,
            scan => List,
            rscan => List,
            multi_set => Integer,
            multi_get => List,
            multi_del => Integer,

            // Hash
            hset => Integer,
            hget => String,
            hdel => Integer,
            hincr => Integer,
            hexists => Boolean,
            hsize => Integer,
            hlist => List,
            hrlist => List,
            hkeys => List,
            hgetall => List,
            hscan => List,
            hrscan => List,
            hclear => Integer,
            multi_hset => Integer,
            multi_hget => List,
            multi_hdel => Integer,

            // Sorted set
            zset => Integer,
            zget => Integer,
            zdel => Integer,
            zincr => Integer,
            zexists => Boolean,
            zsize => Integer,
            zlist => List,
            zrlist => List,
            zkeys => List,
            zscan => List,
            zrscan => List,
            zrank => Integer,
            zrrank => Integer,
            zrange => List,
            zrrange => List,
            zclear => Integer,
            zcount => Integer,
            zsum => Integer,
            zavg => Float,
            zremrangebyrank => Integer,
            zremrangebyscore => Integer,
            multi_zset => Integer,
            multi_zget => List,
            multi_zdel => Integer,

            // Queue
            qsize => Integer,
            qclear => Integer,
            qfront => String,
            qback => String,
            qget => String,
            qslice => List,
            qpush => String,
            qpush_front => Integer,
            qpush_back => Integer,
            qpop => String,
            qpop_front => String,
            qpop_back => String,
            qlist => List,
            qrlist => List,

            // Server
            info => List,
        }
    };
}

pub(crate) use for_each_command;

macro_rules! define_command_table {
    ($($name:ident => $kind:ident),* $(,)?) => {
        /// Every known command with the kind of its reply, in table order.
        pub static COMMANDS: &[(&str, ResultKind)] = &[
            $((stringify!($name), ResultKind::$kind)),*
        ];

        /// Looks up the result kind of a known command.
        pub fn result_kind(command: &str) -> Option<ResultKind> {
            match command {
                $(stringify!($name) => Some(ResultKind::$kind),)*
                _ => None,
            }
        }
    };
}

for_each_command!(define_command_table);

/// Result kind used for dispatch: unknown commands default to strings.
pub fn result_kind_or_default(command: &str) -> ResultKind {
    result_kind(command).unwrap_or(ResultKind::String)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_kinds() {
        assert_eq!(result_kind("set"), Some(ResultKind::Integer));
        assert_eq!(result_kind("get"), Some(ResultKind::String));
        assert_eq!(result_kind("exists"), Some(ResultKind::Boolean));
        assert_eq!(result_kind("zavg"), Some(ResultKind::Float));
        assert_eq!(result_kind("hgetall"), Some(ResultKind::List));
        assert_eq!(result_kind("qpush_front"), Some(ResultKind::Integer));
    }

    #[test]
    fn test_unknown_command_defaults_to_string() {
        assert_eq!(result_kind("flushdb"), None);
        assert_eq!(result_kind_or_default("flushdb"), ResultKind::String);
        // Lookup is case sensitive, like the wire protocol
        assert_eq!(result_kind("SET"), None);
    }

    #[test]
    fn test_table_has_no_duplicates() {
        let names: HashSet<_> = COMMANDS.iter().map(|(name, _)| *name).collect();
        assert_eq!(names.len(), COMMANDS.len());
        assert_eq!(COMMANDS.len(), 76);
    }

    #[test]
    fn test_table_and_lookup_agree() {
        for (name, kind) in COMMANDS {
            assert_eq!(result_kind(name), Some(*kind), "command {}", name);
        }
    }
}
