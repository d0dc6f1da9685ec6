//! Simulation Runtime
//!
//! The runtime is the central coordinator that ties the circuit graph, the
//! recalculation engine and the discrete-event timeline together. It owns
//! all three; there is no global state, so independent simulations (e.g. a
//! nested subcircuit editor) can coexist without cross-talk.
//!
//! # How It Works
//!
//! 1. A host action (toggling an input pin, connecting a wire, a forced
//!    override) marks the affected components dirty.
//!
//! 2. `settle()` runs the recalculation engine. Changed outputs propagate
//!    immediately across zero-delay wires; deliveries across delayed wires
//!    are scheduled on the timeline.
//!
//! 3. When the timeline fires, deliveries copy values into destination
//!    input nodes and mark the owning components dirty; clock ticks toggle
//!    the clock's level and reschedule the next edge. Every fired batch is
//!    followed by a settle, so the circuit is quiescent (or warned about)
//!    before the host observes it.
//!
//! A failed callback is caught and logged; its siblings in the same tick
//! still fire and the timeline keeps running. Deliveries whose wire or
//! node has been destroyed in the meantime are dropped with a debug log:
//! destroyed entities leave every registry immediately, so a stale
//! delivery is a cheap "not found".
//!
//! # Concurrency
//!
//! Single-threaded, run-to-completion. The host funnels both interaction
//! handlers and timer wakeups into this one object; nothing here suspends
//! or locks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::graph::{
    ComponentId, ComponentKind, ConnectError, Graph, GraphError, LogicValue, NodeId, WireAttrs,
    WireId,
};
use crate::sim::recalc::Recalculator;
use crate::timeline::{
    Firing, SimTime, SystemClock, Timeline, TimelineError, TimelineState, WallClock,
};

/// Safety cap on events drained by [`Simulation::run_until_idle`]; a
/// free-running clock never goes idle.
const IDLE_STEP_CAP: usize = 10_000;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Delay used by wires without a custom delay.
    pub default_wire_delay: Duration,
    /// Recalculation rounds per settle pass before a combinational cycle
    /// is assumed.
    pub recalc_round_cap: usize,
    /// Fire this far behind schedule and the timeline slips its epoch
    /// instead of racing to catch up.
    pub lateness_slip: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_wire_delay: Duration::from_millis(100),
            recalc_round_cap: 1000,
            lateness_slip: Duration::from_millis(100),
        }
    }
}

/// Error raised by runtime operations on specific entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("unknown component {0}")]
    UnknownComponent(u64),
    #[error("component {0} is not an input pin")]
    NotAnInput(u64),
    #[error("unknown node {0}")]
    UnknownNode(u64),
    #[error("node {0} is not an output")]
    NotAnOutput(u64),
    #[error("component {0} is not a clock")]
    NotAClock(u64),
}

/// An event on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Copy `value` into the destination of `wire` and mark its owner.
    DeliverWire { wire: WireId, value: LogicValue },
    /// Toggle a clock component and schedule its next edge.
    ClockTick { component: ComponentId },
}

/// Summary of one settle pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleSummary {
    /// Recalculation rounds executed.
    pub rounds: usize,
    /// `false` when the round cap was hit.
    pub converged: bool,
}

/// A complete simulation instance: graph, recalculation engine and
/// timeline.
pub struct Simulation {
    pub(crate) graph: Graph,
    pub(crate) recalc: Recalculator,
    pub(crate) timeline: Timeline<SimEvent>,
    pub(crate) config: SimConfig,
}

impl Simulation {
    /// A simulation on the system clock with default configuration.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// A simulation on the system clock.
    pub fn with_config(config: SimConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }

    /// A simulation on an explicit clock, e.g. a
    /// [`ManualClock`](crate::timeline::ManualClock) in tests.
    pub fn with_clock(config: SimConfig, clock: impl WallClock + 'static) -> Self {
        Self {
            graph: Graph::new(),
            recalc: Recalculator::new(config.recalc_round_cap),
            timeline: Timeline::new(clock, config.lateness_slip),
            config,
        }
    }

    /// The circuit graph, read-only. Mutation goes through the runtime so
    /// dirty bookkeeping stays consistent.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The engine configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Place a confirmed component. Clocks schedule their first edge
    /// immediately.
    pub fn add_component(&mut self, kind: ComponentKind) -> ComponentId {
        let id = self.graph.insert_component(kind);
        self.after_insert(id);
        id
    }

    /// Place an unconfirmed preview. It recalculates like any other
    /// component so the host can show live values, but it is excluded from
    /// persisted output until confirmed.
    pub fn add_preview(&mut self, kind: ComponentKind) -> ComponentId {
        let id = self.graph.insert_preview(kind);
        self.after_insert(id);
        id
    }

    pub(crate) fn after_insert(&mut self, id: ComponentId) {
        self.recalc.mark_dirty(&mut self.graph, id);
        if let Some(ComponentKind::Clock(clock)) = self.graph.component(id).map(|c| c.kind()) {
            let first = clock.first_edge();
            self.timeline
                .schedule_after(first, "clock tick", SimEvent::ClockTick { component: id });
        }
    }

    /// Confirm a preview placement.
    pub fn confirm_component(&mut self, id: ComponentId) -> Result<(), GraphError> {
        self.graph.confirm_component(id)
    }

    /// Destroy a component and everything attached to it. Downstream
    /// components whose inputs were reset are flagged for recalculation;
    /// deliveries already in flight toward the destroyed nodes are dropped
    /// when they fire.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), GraphError> {
        let disturbed = self.graph.remove_component(id)?;
        for owner in disturbed {
            self.recalc.mark_dirty(&mut self.graph, owner);
        }
        Ok(())
    }

    /// Connect an output node to a free input node with default
    /// attributes.
    pub fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<WireId, ConnectError> {
        self.connect_with(source, dest, WireAttrs::default())
    }

    /// Connect an output node to a free input node. The new wire is seeded
    /// with the source's current level, delivered like any other change.
    pub fn connect_with(
        &mut self,
        source: NodeId,
        dest: NodeId,
        attrs: WireAttrs,
    ) -> Result<WireId, ConnectError> {
        let wire = self.graph.connect_with(source, dest, attrs)?;
        let src_value = self
            .graph
            .node(source)
            .map(|n| n.effective_value())
            .unwrap_or_default();
        let dest_value = self.graph.node(dest).map(|n| n.value()).unwrap_or_default();
        if src_value != dest_value {
            self.send_across(wire, src_value);
        }
        Ok(wire)
    }

    /// Destroy a wire. The destination input resets to the default level
    /// and its component is flagged for recalculation.
    pub fn disconnect(&mut self, wire: WireId) -> Result<(), GraphError> {
        let dest_owner = self.graph.remove_wire(wire)?;
        self.recalc.mark_dirty(&mut self.graph, dest_owner);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Drive an input pin. Takes effect on the next settle.
    pub fn set_input(&mut self, id: ComponentId, value: LogicValue) -> Result<(), SimError> {
        let component = self
            .graph
            .component_mut(id)
            .ok_or(SimError::UnknownComponent(id.raw()))?;
        match component.kind_mut() {
            ComponentKind::Input { value: stored } => *stored = value,
            _ => return Err(SimError::NotAnInput(id.raw())),
        }
        self.recalc.mark_dirty(&mut self.graph, id);
        Ok(())
    }

    /// The effective value of a node.
    pub fn read_node(&self, node: NodeId) -> Option<LogicValue> {
        self.graph.node(node).map(|n| n.effective_value())
    }

    /// The value a component currently shows: for probe pins the value at
    /// their input node, otherwise the value at the first output node.
    pub fn output_value(&self, id: ComponentId) -> Option<LogicValue> {
        let component = self.graph.component(id)?;
        let node = match component.kind() {
            ComponentKind::Output => *component.inputs().first()?,
            _ => *component.outputs().first()?,
        };
        self.read_node(node)
    }

    /// Force an output node to a fixed value, superseding whatever its
    /// component computes. The change propagates like a computed one.
    pub fn force_node(&mut self, node: NodeId, value: LogicValue) -> Result<(), SimError> {
        self.set_forced(node, Some(value))
    }

    /// Clear a forced override; the node's computed value becomes visible
    /// again and propagates.
    pub fn release_node(&mut self, node: NodeId) -> Result<(), SimError> {
        self.set_forced(node, None)
    }

    fn set_forced(&mut self, node: NodeId, forced: Option<LogicValue>) -> Result<(), SimError> {
        let n = self
            .graph
            .node_mut(node)
            .ok_or(SimError::UnknownNode(node.raw()))?;
        if !n.direction().is_output() {
            return Err(SimError::NotAnOutput(node.raw()));
        }
        if n.set_forced(forced) {
            self.emit_node_change(node);
        }
        Ok(())
    }

    /// Propagate a node's current effective value across all its wires.
    fn emit_node_change(&mut self, node_id: NodeId) {
        let Some(node) = self.graph.node(node_id) else {
            return;
        };
        let value = node.effective_value();
        let wires: SmallVec<[WireId; 2]> = node.outgoing().iter().copied().collect();
        for wire in wires {
            self.send_across(wire, value);
        }
    }

    /// Carry a value across one wire: immediately for zero-delay wires,
    /// as a scheduled delivery otherwise.
    fn send_across(&mut self, wire_id: WireId, value: LogicValue) {
        let Some(wire) = self.graph.wire(wire_id) else {
            return;
        };
        let delay = wire.effective_delay(self.config.default_wire_delay);
        let dest = wire.dest();
        if delay.is_zero() {
            if let Some(node) = self.graph.node_mut(dest) {
                if node.set_value(value) {
                    let owner = node.owner();
                    self.recalc.mark_dirty(&mut self.graph, owner);
                }
            }
        } else {
            self.timeline.schedule_after(
                delay,
                "wire delivery",
                SimEvent::DeliverWire { wire: wire_id, value },
            );
        }
    }

    // ------------------------------------------------------------------
    // Recalculation and the timeline
    // ------------------------------------------------------------------

    /// Run recalculation to quiescence (or the round cap) and schedule the
    /// resulting delayed deliveries.
    pub fn settle(&mut self) -> SettleSummary {
        let report = self.recalc.settle(&mut self.graph, self.config.default_wire_delay);
        for delivery in report.deliveries {
            self.timeline.schedule_after(
                delivery.delay,
                "wire delivery",
                SimEvent::DeliverWire {
                    wire: delivery.wire,
                    value: delivery.value,
                },
            );
        }
        SettleSummary {
            rounds: report.rounds,
            converged: report.converged,
        }
    }

    /// Current logical time.
    pub fn now(&self) -> SimTime {
        self.timeline.now()
    }

    /// Freeze logical time.
    pub fn pause(&mut self) {
        self.timeline.pause();
    }

    /// Resume logical time, preserving pending offsets.
    pub fn play(&mut self) {
        self.timeline.play();
    }

    /// Whether logical time is frozen.
    pub fn is_paused(&self) -> bool {
        self.timeline.is_paused()
    }

    /// The observable scheduler state.
    pub fn timeline_state(&self) -> TimelineState {
        self.timeline.state()
    }

    /// Register the scheduler state observer; see
    /// [`Timeline::set_observer`].
    pub fn set_state_observer(&mut self, observer: impl FnMut(TimelineState) + 'static) {
        self.timeline.set_observer(observer);
    }

    /// Real time until the next scheduled event, for the host's run loop.
    pub fn next_wakeup(&self) -> Option<Duration> {
        self.timeline.next_wakeup()
    }

    /// While paused, jump to exactly the next scheduled event, fire its
    /// whole bucket and settle the fallout. Returns the time stepped to.
    pub fn step(&mut self) -> Result<SimTime, TimelineError> {
        let firing = self.timeline.step()?;
        let time = firing.time;
        self.apply_firing(firing);
        self.settle();
        Ok(time)
    }

    /// While running, fire everything that has become due. Returns the
    /// number of events applied.
    pub fn poll(&mut self) -> usize {
        let mut fired = 0;
        while let Some(firing) = self.timeline.poll() {
            fired += firing.entries.len();
            self.apply_firing(firing);
            self.settle();
        }
        fired
    }

    /// Pause and advance logical time to exactly `target`, firing every
    /// event scheduled at or before it.
    pub fn run_until(&mut self, target: SimTime) -> Result<(), TimelineError> {
        self.timeline.pause();
        self.settle();
        while let Some(next) = self.timeline.next_time() {
            if next > target {
                break;
            }
            self.step()?;
        }
        if self.timeline.now() < target {
            self.timeline.seek(target)?;
        }
        Ok(())
    }

    /// Pause and drain scheduled events until nothing is pending. Returns
    /// `false` if the safety cap was hit first, which a circuit with a
    /// free-running clock always will.
    pub fn run_until_idle(&mut self) -> bool {
        self.timeline.pause();
        self.settle();
        let mut steps = 0;
        while self.timeline.has_callbacks() {
            if steps >= IDLE_STEP_CAP {
                warn!(steps, "run_until_idle hit its safety cap; circuit never goes idle");
                return false;
            }
            if self.step().is_err() {
                break;
            }
            steps += 1;
        }
        true
    }

    fn apply_firing(&mut self, firing: Firing<SimEvent>) {
        let time = firing.time;
        for entry in firing.entries {
            if let Err(err) = self.apply_event(entry.event, time) {
                // A failing callback must not disturb its siblings.
                error!(callback = entry.description, %err, "scheduled callback failed");
            }
        }
    }

    fn apply_event(&mut self, event: SimEvent, time: SimTime) -> Result<(), SimError> {
        match event {
            SimEvent::DeliverWire { wire, value } => {
                let Some(w) = self.graph.wire(wire) else {
                    debug!(wire = wire.raw(), "dropping delivery for destroyed wire");
                    return Ok(());
                };
                let dest = w.dest();
                let Some(node) = self.graph.node_mut(dest) else {
                    debug!(node = dest.raw(), "dropping delivery for destroyed node");
                    return Ok(());
                };
                if node.set_value(value) {
                    let owner = node.owner();
                    self.recalc.mark_dirty(&mut self.graph, owner);
                }
                Ok(())
            }
            SimEvent::ClockTick { component } => {
                let Some(comp) = self.graph.component_mut(component) else {
                    debug!(component = component.raw(), "dropping tick for destroyed component");
                    return Ok(());
                };
                let ComponentKind::Clock(clock) = comp.kind_mut() else {
                    return Err(SimError::NotAClock(component.raw()));
                };
                clock.toggle();
                let interval = clock.edge_interval();
                self.recalc.mark_dirty(&mut self.graph, component);
                self.timeline.schedule_at(
                    time + interval,
                    "clock tick",
                    SimEvent::ClockTick { component },
                );
                Ok(())
            }
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ClockState;
    use crate::timeline::ManualClock;

    fn zero_delay_sim() -> Simulation {
        let config = SimConfig {
            default_wire_delay: Duration::ZERO,
            ..Default::default()
        };
        Simulation::with_clock(config, ManualClock::new())
    }

    fn delayed_sim() -> Simulation {
        Simulation::with_clock(SimConfig::default(), ManualClock::new())
    }

    #[test]
    fn input_drives_probe_through_inverter() {
        let mut sim = zero_delay_sim();
        let source = sim.add_component(ComponentKind::input(LogicValue::False));
        let inverter = sim.add_component(ComponentKind::Not);
        let probe = sim.add_component(ComponentKind::Output);

        let source_out = sim.graph().component(source).unwrap().outputs()[0];
        let not_in = sim.graph().component(inverter).unwrap().inputs()[0];
        let not_out = sim.graph().component(inverter).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];

        sim.connect(source_out, not_in).unwrap();
        sim.connect(not_out, probe_in).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::True));

        sim.set_input(source, LogicValue::True).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));
    }

    #[test]
    fn connect_seeds_the_new_wire() {
        let mut sim = zero_delay_sim();
        let source = sim.add_component(ComponentKind::input(LogicValue::True));
        let probe = sim.add_component(ComponentKind::Output);
        let source_out = sim.graph().component(source).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];

        sim.settle();
        // The source output already carries True when the wire appears.
        sim.connect(source_out, probe_in).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::True));
    }

    #[test]
    fn set_input_rejects_non_inputs() {
        let mut sim = zero_delay_sim();
        let probe = sim.add_component(ComponentKind::Output);
        assert_eq!(
            sim.set_input(probe, LogicValue::True),
            Err(SimError::NotAnInput(probe.raw()))
        );
    }

    #[test]
    fn delayed_delivery_arrives_on_time() {
        let mut sim = delayed_sim();
        let source = sim.add_component(ComponentKind::input(LogicValue::False));
        let probe = sim.add_component(ComponentKind::Output);
        let source_out = sim.graph().component(source).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];

        sim.connect_with(
            source_out,
            probe_in,
            WireAttrs {
                delay: Some(Duration::from_millis(40)),
                ..Default::default()
            },
        )
        .unwrap();
        sim.run_until(SimTime::from_millis(1)).unwrap();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));

        sim.set_input(source, LogicValue::True).unwrap();
        sim.settle();

        // One millisecond early: nothing yet.
        sim.run_until(SimTime::from_millis(40)).unwrap();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));

        sim.run_until(SimTime::from_millis(41)).unwrap();
        assert_eq!(sim.output_value(probe), Some(LogicValue::True));
    }

    #[test]
    fn stale_delivery_is_dropped_after_disconnect() {
        let mut sim = delayed_sim();
        let source = sim.add_component(ComponentKind::input(LogicValue::False));
        let probe = sim.add_component(ComponentKind::Output);
        let source_out = sim.graph().component(source).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];

        let wire = sim
            .connect_with(
                source_out,
                probe_in,
                WireAttrs {
                    delay: Some(Duration::from_millis(40)),
                    ..Default::default()
                },
            )
            .unwrap();

        sim.set_input(source, LogicValue::True).unwrap();
        sim.pause();
        sim.settle();

        // The delivery is in flight; destroying the wire does not retract
        // it, but firing it finds nothing to hit.
        sim.disconnect(wire).unwrap();
        sim.settle();
        let fired = sim.step().unwrap();
        assert_eq!(fired, SimTime::from_millis(40));
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));
    }

    #[test]
    fn clock_toggles_on_schedule() {
        let mut sim = delayed_sim();
        let clock = sim.add_component(ComponentKind::Clock(ClockState::new(Duration::from_millis(100))));
        let probe = sim.add_component(ComponentKind::Output);
        let clock_out = sim.graph().component(clock).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];
        sim.connect_with(
            clock_out,
            probe_in,
            WireAttrs {
                delay: Some(Duration::from_millis(1)),
                ..Default::default()
            },
        )
        .unwrap();

        sim.run_until(SimTime::from_millis(10)).unwrap();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));

        // First edge at 50ms, delivered at 51ms.
        sim.run_until(SimTime::from_millis(60)).unwrap();
        assert_eq!(sim.output_value(probe), Some(LogicValue::True));

        // Second edge at 100ms.
        sim.run_until(SimTime::from_millis(110)).unwrap();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));
    }

    #[test]
    fn forced_override_propagates_and_releases() {
        let mut sim = zero_delay_sim();
        let source = sim.add_component(ComponentKind::input(LogicValue::False));
        let probe = sim.add_component(ComponentKind::Output);
        let source_out = sim.graph().component(source).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];
        sim.connect(source_out, probe_in).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));

        sim.force_node(source_out, LogicValue::True).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::True));

        sim.release_node(source_out).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));
    }

    #[test]
    fn forcing_an_input_node_is_rejected() {
        let mut sim = zero_delay_sim();
        let probe = sim.add_component(ComponentKind::Output);
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];
        assert_eq!(
            sim.force_node(probe_in, LogicValue::True),
            Err(SimError::NotAnOutput(probe_in.raw()))
        );
    }

    #[test]
    fn removing_a_component_resets_downstream() {
        let mut sim = zero_delay_sim();
        let source = sim.add_component(ComponentKind::input(LogicValue::True));
        let probe = sim.add_component(ComponentKind::Output);
        let source_out = sim.graph().component(source).unwrap().outputs()[0];
        let probe_in = sim.graph().component(probe).unwrap().inputs()[0];
        sim.connect(source_out, probe_in).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::True));

        sim.remove_component(source).unwrap();
        sim.settle();
        assert_eq!(sim.output_value(probe), Some(LogicValue::False));
        assert_eq!(sim.graph().wire_count(), 0);
    }

    #[test]
    fn run_until_idle_caps_on_free_running_clocks() {
        let mut sim = delayed_sim();
        sim.add_component(ComponentKind::Clock(ClockState::new(Duration::from_millis(2))));
        assert!(!sim.run_until_idle());
    }
}
