//! Circuit Graph
//!
//! This module implements the data model of the simulation: nodes (pins),
//! wires, components and the registry that owns them all.
//!
//! # Overview
//!
//! A circuit is a directed graph where:
//!
//! - Components are the logic elements (gates, pins, clocks, flip-flops)
//! - Nodes are the single-bit connection points components expose
//! - Wires connect one output node to one input node and carry a
//!   propagation delay
//!
//! The graph is purely structural. Values move across wires only through
//! the simulation runtime, which schedules deliveries on the timeline and
//! feeds the recalculation engine.
//!
//! # Design Decisions
//!
//! 1. All entities live in one centralized registry indexed by id, so wire
//!    endpoints resolve in O(1) and destroyed entities disappear from
//!    every lookup at once.
//!
//! 2. Component kinds are a closed enum rather than trait objects. The set
//!    of kinds is fixed per release of the editor, and exhaustive matching
//!    catches a half-added kind at compile time.
//!
//! 3. Ids are graph-owned, enabling independent simulation instances to
//!    coexist (nested subcircuits) without shared global state.

mod component;
mod node;
mod registry;
mod value;
mod wire;

pub use component::{
    ClockState, Component, ComponentId, ComponentKind, FlipFlopState, GateOp, LifecycleState,
    OutputValues, RegisterState,
};
pub use node::{Node, NodeDirection, NodeId};
pub use registry::{ConnectError, Graph, GraphError};
pub use value::LogicValue;
pub use wire::{Wire, WireAttrs, WireId};
