//! Logic Values
//!
//! This module defines the four-valued logic used on every node in the
//! circuit graph.
//!
//! # The Four States
//!
//! - `False` / `True`: the two definite binary levels.
//! - `Unknown`: the value cannot be determined, e.g. a gate fed by an
//!   unconnected input, or a flip-flop that has never seen a clock edge.
//! - `HighZ`: high impedance, an output that is not driving its line.
//!
//! Gate evaluation treats `HighZ` inputs like `Unknown`: a floating input
//! cannot decide a gate. A gate output can still be definite when the
//! operation is already decided by the definite inputs alone (an AND with a
//! `False` input is `False` no matter what the other inputs are).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single-bit logic level.
///
/// `Default` is `False`, which is also the value an input node is reset to
/// when its incoming wire is destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicValue {
    /// Definite low.
    #[default]
    False,
    /// Definite high.
    True,
    /// Indeterminate level.
    Unknown,
    /// High impedance, nothing is driving the line.
    HighZ,
}

impl LogicValue {
    /// Whether the value is one of the two definite binary levels.
    pub fn is_definite(self) -> bool {
        matches!(self, LogicValue::False | LogicValue::True)
    }

    /// The definite boolean level, if there is one.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            LogicValue::False => Some(false),
            LogicValue::True => Some(true),
            LogicValue::Unknown | LogicValue::HighZ => None,
        }
    }

    /// Logical negation. Indefinite inputs stay indefinite.
    pub fn negate(self) -> LogicValue {
        match self {
            LogicValue::False => LogicValue::True,
            LogicValue::True => LogicValue::False,
            LogicValue::Unknown | LogicValue::HighZ => LogicValue::Unknown,
        }
    }

    /// N-ary AND. `False` decides the result; otherwise any indefinite
    /// input degrades the result to `Unknown`.
    pub fn and_all(values: impl IntoIterator<Item = LogicValue>) -> LogicValue {
        let mut out = LogicValue::True;
        for v in values {
            match v.as_bool() {
                Some(false) => return LogicValue::False,
                Some(true) => {}
                None => out = LogicValue::Unknown,
            }
        }
        out
    }

    /// N-ary OR. `True` decides the result; otherwise any indefinite input
    /// degrades the result to `Unknown`.
    pub fn or_all(values: impl IntoIterator<Item = LogicValue>) -> LogicValue {
        let mut out = LogicValue::False;
        for v in values {
            match v.as_bool() {
                Some(true) => return LogicValue::True,
                Some(false) => {}
                None => out = LogicValue::Unknown,
            }
        }
        out
    }

    /// N-ary XOR (odd parity). A single indefinite input makes the result
    /// `Unknown`; parity cannot be decided early.
    pub fn xor_all(values: impl IntoIterator<Item = LogicValue>) -> LogicValue {
        let mut parity = false;
        for v in values {
            match v.as_bool() {
                Some(b) => parity ^= b,
                None => return LogicValue::Unknown,
            }
        }
        LogicValue::from(parity)
    }
}

impl From<bool> for LogicValue {
    fn from(level: bool) -> Self {
        if level {
            LogicValue::True
        } else {
            LogicValue::False
        }
    }
}

impl fmt::Display for LogicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = match self {
            LogicValue::False => "0",
            LogicValue::True => "1",
            LogicValue::Unknown => "X",
            LogicValue::HighZ => "Z",
        };
        f.write_str(glyph)
    }
}
