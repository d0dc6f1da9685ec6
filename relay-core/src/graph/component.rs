//! Components
//!
//! This module defines the logic elements of the circuit: gates, I/O pins,
//! clocks and sequential elements. Component kinds form a closed enum, so
//! adding a kind is a single registration point and every dispatch over
//! kinds is checked for exhaustiveness at compile time.
//!
//! # Recalculation Contract
//!
//! [`ComponentKind::recalc`] computes the component's output tuple from the
//! current input values and the kind's internal state. It is deterministic
//! and cannot reach the graph: the signature only hands it the input values.
//! Sequential kinds (flip-flop, register) update their internal latches
//! here; nothing else is mutated. Writing the returned values into the
//! output nodes is the recalculation engine's job.
//!
//! # Lifecycle
//!
//! `SPAWNING -> NORMAL -> DEAD`. A spawning component is an unconfirmed
//! placement preview: it participates in live recalculation so the preview
//! shows correct values, but it is excluded from persisted output. `DEAD`
//! is terminal and only ever observed transiently, while a component is
//! being torn out of the registry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use super::node::NodeId;
use super::value::LogicValue;

/// Unique identifier for a component.
///
/// Stable across save/load, like node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ComponentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Placement preview: recalculates, but is not persisted.
    Spawning,
    /// Confirmed placement.
    Normal,
    /// Terminal; excluded from all further recalculation.
    Dead,
}

/// The boolean operation of an n-ary gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateOp {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

impl GateOp {
    /// Evaluate the gate over its input values.
    pub fn eval(self, inputs: &[LogicValue]) -> LogicValue {
        let vals = inputs.iter().copied();
        match self {
            GateOp::And => LogicValue::and_all(vals),
            GateOp::Or => LogicValue::or_all(vals),
            GateOp::Xor => LogicValue::xor_all(vals),
            GateOp::Nand => LogicValue::and_all(vals).negate(),
            GateOp::Nor => LogicValue::or_all(vals).negate(),
            GateOp::Xnor => LogicValue::xor_all(vals).negate(),
        }
    }
}

/// Internal state of a clock component.
///
/// The output toggles every half period; the simulation runtime drives the
/// toggling through scheduled ticks, so a paused timeline freezes every
/// clock in the circuit.
#[derive(Debug, Clone)]
pub struct ClockState {
    period: Duration,
    phase: Option<Duration>,
    level: bool,
}

impl ClockState {
    /// A clock with the given full-cycle period, starting low.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            phase: None,
            level: false,
        }
    }

    /// Offset of the first edge from the moment the clock enters the
    /// circuit. Defaults to half the period.
    pub fn with_phase(mut self, phase: Duration) -> Self {
        self.phase = Some(phase);
        self
    }

    pub(crate) fn with_level(mut self, level: bool) -> Self {
        self.level = level;
        self
    }

    /// Full-cycle period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Explicit first-edge offset, if one was set.
    pub fn phase(&self) -> Option<Duration> {
        self.phase
    }

    /// Time until the first edge after the clock enters the circuit.
    pub fn first_edge(&self) -> Duration {
        self.phase.unwrap_or(self.period / 2)
    }

    /// Time between consecutive edges.
    pub fn edge_interval(&self) -> Duration {
        self.period / 2
    }

    /// Current output level.
    pub fn level(&self) -> bool {
        self.level
    }

    pub(crate) fn toggle(&mut self) {
        self.level = !self.level;
    }
}

/// Internal state of a rising-edge D flip-flop.
#[derive(Debug, Clone)]
pub struct FlipFlopState {
    stored: LogicValue,
    prev_clock: LogicValue,
}

impl FlipFlopState {
    /// A flip-flop that has never captured: stored bit is `Unknown`.
    pub fn new() -> Self {
        Self::with_stored(LogicValue::Unknown)
    }

    /// A flip-flop restored with a known stored bit.
    pub fn with_stored(stored: LogicValue) -> Self {
        Self {
            stored,
            prev_clock: LogicValue::Unknown,
        }
    }

    /// The currently stored bit.
    pub fn stored(&self) -> LogicValue {
        self.stored
    }
}

impl Default for FlipFlopState {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal state of a width-N rising-edge register.
#[derive(Debug, Clone)]
pub struct RegisterState {
    stored: SmallVec<[LogicValue; 8]>,
    prev_clock: LogicValue,
}

impl RegisterState {
    /// A register of the given width that has never captured.
    pub fn new(width: usize) -> Self {
        Self::with_stored(smallvec![LogicValue::Unknown; width])
    }

    /// A register restored with known stored bits.
    pub fn with_stored(stored: SmallVec<[LogicValue; 8]>) -> Self {
        Self {
            stored,
            prev_clock: LogicValue::Unknown,
        }
    }

    /// Number of bits held.
    pub fn width(&self) -> usize {
        self.stored.len()
    }

    /// The currently stored bits.
    pub fn stored(&self) -> &[LogicValue] {
        &self.stored
    }
}

/// Output tuple produced by one recalculation.
pub type OutputValues = SmallVec<[LogicValue; 2]>;

/// The closed set of component kinds.
#[derive(Debug, Clone)]
pub enum ComponentKind {
    /// A driven input pin. Its internal value is set by the host (user
    /// toggles, test harness) and surfaces on its single output node.
    Input { value: LogicValue },
    /// A probe pin. Displays whatever arrives at its single input node.
    Output,
    /// An n-ary gate, arity fixed at construction.
    Gate { op: GateOp, arity: usize },
    /// An inverter.
    Not,
    /// A free-running clock.
    Clock(ClockState),
    /// A rising-edge D flip-flop: inputs `[d, clk]`, outputs `[q, qn]`.
    FlipFlop(FlipFlopState),
    /// A width-N rising-edge register: inputs `[d0..dN-1, clk]`, outputs
    /// `[q0..qN-1]`.
    Register(RegisterState),
}

impl ComponentKind {
    /// An input pin driving the given value.
    pub fn input(value: LogicValue) -> Self {
        ComponentKind::Input { value }
    }

    /// An n-ary gate. Arity below 2 is clamped to 2.
    pub fn gate(op: GateOp, arity: usize) -> Self {
        ComponentKind::Gate {
            op,
            arity: arity.max(2),
        }
    }

    /// Number of input nodes this kind carries. Fixed for the component's
    /// lifetime.
    pub fn input_count(&self) -> usize {
        match self {
            ComponentKind::Input { .. } | ComponentKind::Clock(_) => 0,
            ComponentKind::Output | ComponentKind::Not => 1,
            ComponentKind::Gate { arity, .. } => *arity,
            ComponentKind::FlipFlop(_) => 2,
            ComponentKind::Register(r) => r.width() + 1,
        }
    }

    /// Number of output nodes this kind carries.
    pub fn output_count(&self) -> usize {
        match self {
            ComponentKind::Output => 0,
            ComponentKind::Input { .. }
            | ComponentKind::Gate { .. }
            | ComponentKind::Not
            | ComponentKind::Clock(_) => 1,
            ComponentKind::FlipFlop(_) => 2,
            ComponentKind::Register(r) => r.width(),
        }
    }

    /// Short tag naming the kind, used in logs and the persisted format.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ComponentKind::Input { .. } => "input",
            ComponentKind::Output => "output",
            ComponentKind::Gate { .. } => "gate",
            ComponentKind::Not => "not",
            ComponentKind::Clock(_) => "clock",
            ComponentKind::FlipFlop(_) => "flipflop",
            ComponentKind::Register(_) => "register",
        }
    }

    /// Compute the output tuple from the current input values and internal
    /// state. `inputs` holds the effective values of the component's input
    /// nodes, in pin order.
    pub fn recalc(&mut self, inputs: &[LogicValue]) -> OutputValues {
        match self {
            ComponentKind::Input { value } => smallvec![*value],
            ComponentKind::Output => SmallVec::new(),
            ComponentKind::Gate { op, .. } => smallvec![op.eval(inputs)],
            ComponentKind::Not => smallvec![inputs[0].negate()],
            ComponentKind::Clock(clock) => smallvec![LogicValue::from(clock.level())],
            ComponentKind::FlipFlop(ff) => {
                let d = inputs[0];
                let clk = inputs[1];
                if rising_edge(ff.prev_clock, clk) {
                    ff.stored = d;
                }
                ff.prev_clock = clk;
                smallvec![ff.stored, ff.stored.negate()]
            }
            ComponentKind::Register(reg) => {
                let width = reg.width();
                let clk = inputs[width];
                if rising_edge(reg.prev_clock, clk) {
                    reg.stored.copy_from_slice(&inputs[..width]);
                }
                reg.prev_clock = clk;
                reg.stored.iter().copied().collect()
            }
        }
    }
}

/// A rising edge requires a definite low-to-high transition; an edge out of
/// an indeterminate level does not capture.
fn rising_edge(prev: LogicValue, now: LogicValue) -> bool {
    prev == LogicValue::False && now == LogicValue::True
}

/// A logic element with fixed sets of input and output nodes.
#[derive(Debug)]
pub struct Component {
    id: ComponentId,
    kind: ComponentKind,
    /// Optional user-facing name, carried through save/load.
    label: Option<String>,
    inputs: SmallVec<[NodeId; 4]>,
    outputs: SmallVec<[NodeId; 2]>,
    state: LifecycleState,
    needs_recalc: bool,
}

impl Component {
    pub(crate) fn new(
        id: ComponentId,
        kind: ComponentKind,
        inputs: SmallVec<[NodeId; 4]>,
        outputs: SmallVec<[NodeId; 2]>,
        state: LifecycleState,
    ) -> Self {
        debug_assert_eq!(inputs.len(), kind.input_count());
        debug_assert_eq!(outputs.len(), kind.output_count());
        Self {
            id,
            kind,
            label: None,
            inputs,
            outputs,
            state,
            needs_recalc: false,
        }
    }

    /// Get the component's ID.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Get the component's kind and internal state.
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ComponentKind {
        &mut self.kind
    }

    /// The user-facing label, if one is set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Set or clear the user-facing label.
    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    /// Input node ids, in pin order.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Output node ids, in pin order.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// Whether the component is flagged for recalculation.
    pub fn needs_recalc(&self) -> bool {
        self.needs_recalc
    }

    pub(crate) fn set_needs_recalc(&mut self, needs: bool) {
        self.needs_recalc = needs;
    }

    /// Recompute the output tuple from the given input values. See
    /// [`ComponentKind::recalc`].
    pub fn recalc(&mut self, inputs: &[LogicValue]) -> OutputValues {
        self.kind.recalc(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicValue::{False, True, Unknown};

    fn run(kind: &mut ComponentKind, inputs: &[LogicValue]) -> OutputValues {
        kind.recalc(inputs)
    }

    #[test]
    fn gate_layouts() {
        assert_eq!(ComponentKind::gate(GateOp::And, 3).input_count(), 3);
        assert_eq!(ComponentKind::gate(GateOp::And, 3).output_count(), 1);
        // Arity is clamped to at least 2.
        assert_eq!(ComponentKind::gate(GateOp::Or, 0).input_count(), 2);
        assert_eq!(ComponentKind::Not.input_count(), 1);
        assert_eq!(ComponentKind::input(False).input_count(), 0);
        assert_eq!(ComponentKind::Output.output_count(), 0);
    }

    #[test]
    fn gate_truth_values() {
        let mut and = ComponentKind::gate(GateOp::And, 2);
        assert_eq!(run(&mut and, &[True, True])[0], True);
        assert_eq!(run(&mut and, &[True, False])[0], False);

        let mut nand = ComponentKind::gate(GateOp::Nand, 2);
        assert_eq!(run(&mut nand, &[True, True])[0], False);

        let mut xnor = ComponentKind::gate(GateOp::Xnor, 2);
        assert_eq!(run(&mut xnor, &[True, True])[0], True);
        assert_eq!(run(&mut xnor, &[True, Unknown])[0], Unknown);
    }

    #[test]
    fn flip_flop_captures_on_rising_edge_only() {
        let mut ff = ComponentKind::FlipFlop(FlipFlopState::new());

        // Clock low: nothing captured yet.
        let out = run(&mut ff, &[True, False]);
        assert_eq!(out[0], Unknown);

        // Rising edge: capture d.
        let out = run(&mut ff, &[True, True]);
        assert_eq!(out[0], True);
        assert_eq!(out[1], False);

        // d changes while clock stays high: no capture.
        let out = run(&mut ff, &[False, True]);
        assert_eq!(out[0], True);

        // Falling edge: no capture.
        let out = run(&mut ff, &[False, False]);
        assert_eq!(out[0], True);

        // Next rising edge picks up the new d.
        let out = run(&mut ff, &[False, True]);
        assert_eq!(out[0], False);
        assert_eq!(out[1], True);
    }

    #[test]
    fn flip_flop_ignores_edges_out_of_unknown() {
        let mut ff = ComponentKind::FlipFlop(FlipFlopState::new());
        // First ever clock sample is a transition from Unknown, not an edge.
        let out = run(&mut ff, &[True, True]);
        assert_eq!(out[0], Unknown);
    }

    #[test]
    fn register_captures_all_bits() {
        let mut reg = ComponentKind::Register(RegisterState::new(3));
        assert_eq!(reg.input_count(), 4);
        assert_eq!(reg.output_count(), 3);

        run(&mut reg, &[True, False, True, False]);
        let out = run(&mut reg, &[True, False, True, True]);
        assert_eq!(&out[..], &[True, False, True]);
    }

    #[test]
    fn clock_surfaces_its_level() {
        let mut kind = ComponentKind::Clock(ClockState::new(Duration::from_millis(100)));
        assert_eq!(run(&mut kind, &[])[0], False);

        if let ComponentKind::Clock(clock) = &mut kind {
            clock.toggle();
        }
        assert_eq!(run(&mut kind, &[])[0], True);
    }

    #[test]
    fn clock_edge_times() {
        let clock = ClockState::new(Duration::from_millis(100));
        assert_eq!(clock.first_edge(), Duration::from_millis(50));
        assert_eq!(clock.edge_interval(), Duration::from_millis(50));

        let offset = ClockState::new(Duration::from_millis(100)).with_phase(Duration::from_millis(10));
        assert_eq!(offset.first_edge(), Duration::from_millis(10));
    }
}
