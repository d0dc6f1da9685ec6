//! Persisted Schema
//!
//! Plain-data records describing a circuit graph: one collection per
//! component category plus a `wires` array of `[source, dest, options?]`
//! triples. This is the exact shape exchanged with the persistence
//! collaborator; decoding is strict (`deny_unknown_fields`), so a record
//! produced by a newer schema fails loudly instead of silently dropping
//! fields onto an instance.
//!
//! The records carry a format version. The engine only ever consumes the
//! current version; migrating older files is the host's job, before
//! `load_graph` is called.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::graph::{GateOp, LogicValue};

/// The schema version this engine reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

/// A complete persisted circuit graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphRecord {
    /// Format version; must equal [`SCHEMA_VERSION`].
    pub version: u32,
    /// Driven input pins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputRecord>,
    /// Probe output pins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputRecord>,
    /// Gates, including inverters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<GateRecord>,
    /// Everything else: clocks, flip-flops, registers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<PartRecord>,
    /// Wire triples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wires: Vec<WireRecord>,
}

impl GraphRecord {
    /// An empty record at the current schema version.
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            gates: Vec::new(),
            components: Vec::new(),
            wires: Vec::new(),
        }
    }

    /// Parse a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for GraphRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A driven input pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The level the pin is currently driving.
    pub value: LogicValue,
    /// The pin's output node.
    pub pin: u64,
}

/// A probe output pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The pin's input node.
    pub pin: u64,
}

/// The operation tag of a persisted gate. `Not` is a gate in the persisted
/// format even though the engine models it as its own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateOpRecord {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
}

impl From<GateOp> for GateOpRecord {
    fn from(op: GateOp) -> Self {
        match op {
            GateOp::And => GateOpRecord::And,
            GateOp::Or => GateOpRecord::Or,
            GateOp::Xor => GateOpRecord::Xor,
            GateOp::Nand => GateOpRecord::Nand,
            GateOp::Nor => GateOpRecord::Nor,
            GateOp::Xnor => GateOpRecord::Xnor,
        }
    }
}

impl GateOpRecord {
    /// The n-ary gate operation, or `None` for `Not`.
    pub fn gate_op(self) -> Option<GateOp> {
        match self {
            GateOpRecord::And => Some(GateOp::And),
            GateOpRecord::Or => Some(GateOp::Or),
            GateOpRecord::Xor => Some(GateOp::Xor),
            GateOpRecord::Nand => Some(GateOp::Nand),
            GateOpRecord::Nor => Some(GateOp::Nor),
            GateOpRecord::Xnor => Some(GateOp::Xnor),
            GateOpRecord::Not => None,
        }
    }
}

/// A persisted gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub op: GateOpRecord,
    /// Input node ids, in pin order.
    pub inputs: Vec<u64>,
    /// The single output node id.
    pub output: u64,
}

/// A persisted component outside the input/output/gate categories.
///
/// Internally tagged by `kind`. Serde cannot combine internal tagging with
/// unknown-field rejection, so these records are the one lenient spot in
/// the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PartRecord {
    Clock {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        period_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase_ms: Option<u64>,
        /// Output level at the moment of saving.
        level: bool,
        pin: u64,
    },
    FlipFlop {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        d: u64,
        clk: u64,
        q: u64,
        qn: u64,
        stored: LogicValue,
    },
    Register {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        d: Vec<u64>,
        clk: u64,
        q: Vec<u64>,
        stored: Vec<LogicValue>,
    },
}

/// Optional third element of a wire triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireOptionsRecord {
    /// Rendering-only routing points.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub via: Vec<[f64; 2]>,
    /// Custom propagation delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_delay: Option<u64>,
    /// Rendering-only style override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl WireOptionsRecord {
    /// Whether every option is at its default, in which case the triple is
    /// written without its third element.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A wire triple: `[source, dest]` or `[source, dest, options]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    /// Source node id.
    pub source: u64,
    /// Destination node id.
    pub dest: u64,
    pub options: Option<WireOptionsRecord>,
}

impl WireRecord {
    /// A bare wire with no options.
    pub fn plain(source: u64, dest: u64) -> Self {
        Self {
            source,
            dest,
            options: None,
        }
    }
}

impl Serialize for WireRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.options.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.source)?;
        seq.serialize_element(&self.dest)?;
        if let Some(options) = &self.options {
            seq.serialize_element(options)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for WireRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WireVisitor;

        impl<'de> Visitor<'de> for WireVisitor {
            type Value = WireRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [source, dest, options?] wire triple")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireRecord, A::Error> {
                let source = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let dest = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let options = seq.next_element()?;
                if seq.next_element::<IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(WireRecord { source, dest, options })
            }
        }

        deserializer.deserialize_seq(WireVisitor)
    }
}
