//! Relay Core
//!
//! This crate provides the simulation engine behind the Relay digital
//! logic editor. It implements:
//!
//! - The circuit data model (components, wires, single-bit nodes)
//! - Round-based incremental recalculation with cycle protection
//! - A discrete-event timeline with pause/play/step and wire delays
//! - The serialization boundary consumed by the host's persistence layer
//!
//! Everything visual lives in the host application: rendering, gesture
//! handling, toolbars, undo stacks. The host drives this crate through a
//! [`Simulation`] instance and observes it through node reads and the
//! timeline state observer.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: components, wires, nodes and the registry that owns them
//! - `sim`: the recalculation engine and the coordinating runtime
//! - `timeline`: the discrete-event scheduler over logical time
//! - `persist`: record types and best-effort graph load/dump
//!
//! # Example
//!
//! ```rust
//! use relay_core::{ComponentKind, GateOp, LogicValue, SimConfig, Simulation};
//! use std::time::Duration;
//!
//! let mut sim = Simulation::with_config(SimConfig {
//!     default_wire_delay: Duration::ZERO,
//!     ..Default::default()
//! });
//!
//! // Two driven inputs feeding an AND gate into a probe.
//! let a = sim.add_component(ComponentKind::input(LogicValue::True));
//! let b = sim.add_component(ComponentKind::input(LogicValue::True));
//! let and = sim.add_component(ComponentKind::gate(GateOp::And, 2));
//! let probe = sim.add_component(ComponentKind::Output);
//!
//! let a_out = sim.graph().component(a).unwrap().outputs()[0];
//! let b_out = sim.graph().component(b).unwrap().outputs()[0];
//! let and_in0 = sim.graph().component(and).unwrap().inputs()[0];
//! let and_in1 = sim.graph().component(and).unwrap().inputs()[1];
//! let and_out = sim.graph().component(and).unwrap().outputs()[0];
//! let probe_in = sim.graph().component(probe).unwrap().inputs()[0];
//!
//! sim.connect(a_out, and_in0).unwrap();
//! sim.connect(b_out, and_in1).unwrap();
//! sim.connect(and_out, probe_in).unwrap();
//!
//! sim.settle();
//! assert_eq!(sim.output_value(probe), Some(LogicValue::True));
//! ```

pub mod graph;
pub mod persist;
pub mod sim;
pub mod timeline;

pub use graph::{
    ClockState, Component, ComponentId, ComponentKind, ConnectError, FlipFlopState, GateOp, Graph,
    GraphError, LifecycleState, LogicValue, Node, NodeDirection, NodeId, RegisterState, Wire,
    WireAttrs, WireId,
};
pub use persist::{GraphRecord, LoadError, LoadIssue, LoadReport, SCHEMA_VERSION};
pub use sim::{SettleSummary, SimConfig, SimError, SimEvent, Simulation};
pub use timeline::{
    ManualClock, SimTime, SystemClock, Timeline, TimelineError, TimelineState, WallClock,
};
