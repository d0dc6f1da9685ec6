//! Serialization Boundary
//!
//! Converts between live graphs and the persisted record shape. The engine
//! owns no files and no formats beyond this hook; undo/redo snapshots and
//! on-disk persistence are the host's business, built on `dump_graph` and
//! `load_graph`.
//!
//! # Loading
//!
//! Loading is best-effort: a malformed component or a wire referencing an
//! unknown node is skipped and reported in the [`LoadReport`], and the
//! rest of the record still loads. Only a schema version mismatch refuses
//! the whole record, because migration is an external step that must run
//! first.
//!
//! Components are constructed and settled once *before* wires are
//! connected; wiring first would feed half-built neighborhoods into the
//! recalculation engine and produce spurious cycle warnings on dense
//! circuits.

mod schema;

use smallvec::SmallVec;
use thiserror::Error;

use crate::graph::{
    ClockState, ComponentId, ComponentKind, ConnectError, FlipFlopState, GraphError,
    LifecycleState, NodeId, RegisterState, WireAttrs,
};
use crate::sim::Simulation;
use std::time::Duration;

pub use schema::{
    GateOpRecord, GraphRecord, InputRecord, OutputRecord, PartRecord, WireOptionsRecord,
    WireRecord, GateRecord, SCHEMA_VERSION,
};

/// Fatal load failure: the record as a whole cannot be consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("unsupported schema version {found}, expected {expected}; run migration first")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// One skipped entity in a best-effort load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadIssue {
    #[error("component {id} skipped: {reason}")]
    Component { id: u64, reason: GraphError },
    #[error("component {id} skipped: {reason}")]
    MalformedComponent { id: u64, reason: String },
    #[error("wire {source}->{dest} skipped: {reason}")]
    Wire {
        source: u64,
        dest: u64,
        #[source]
        reason: ConnectError,
    },
}

/// Outcome of a best-effort load.
#[derive(Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Entities that were skipped, in record order.
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    /// Whether everything loaded.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Simulation {
    /// Replace the current circuit with the contents of a record.
    ///
    /// Clears the graph, the pending recalculation set and the timeline,
    /// then rebuilds best-effort: skipped entities land in the report.
    /// The reconstructed circuit is settled before returning; wire values
    /// are copied directly at connection time, so a quiescent dump loads
    /// back into the same quiescent state.
    pub fn load_graph(&mut self, record: &GraphRecord) -> Result<LoadReport, LoadError> {
        if record.version != SCHEMA_VERSION {
            return Err(LoadError::UnsupportedVersion {
                found: record.version,
                expected: SCHEMA_VERSION,
            });
        }

        self.graph.clear();
        self.recalc.clear();
        self.timeline.clear();
        let mut report = LoadReport::default();

        for input in &record.inputs {
            self.load_component(
                ComponentKind::input(input.value),
                input.id,
                &[],
                &[input.pin],
                input.label.clone(),
                &mut report,
            );
        }
        for output in &record.outputs {
            self.load_component(
                ComponentKind::Output,
                output.id,
                &[output.pin],
                &[],
                output.label.clone(),
                &mut report,
            );
        }
        for gate in &record.gates {
            let kind = match gate.op.gate_op() {
                Some(op) => {
                    if gate.inputs.len() < 2 {
                        report.issues.push(LoadIssue::MalformedComponent {
                            id: gate.id,
                            reason: format!("gate needs at least 2 inputs, has {}", gate.inputs.len()),
                        });
                        continue;
                    }
                    ComponentKind::gate(op, gate.inputs.len())
                }
                None => {
                    if gate.inputs.len() != 1 {
                        report.issues.push(LoadIssue::MalformedComponent {
                            id: gate.id,
                            reason: format!("inverter needs exactly 1 input, has {}", gate.inputs.len()),
                        });
                        continue;
                    }
                    ComponentKind::Not
                }
            };
            self.load_component(
                kind,
                gate.id,
                &gate.inputs,
                &[gate.output],
                gate.label.clone(),
                &mut report,
            );
        }
        for part in &record.components {
            self.load_part(part, &mut report);
        }

        // Components settle once before any wire exists, so partially
        // wired neighborhoods never feed the cycle warning.
        self.settle();

        for wire in &record.wires {
            self.load_wire(wire, &mut report);
        }
        self.settle();

        Ok(report)
    }

    fn load_part(&mut self, part: &PartRecord, report: &mut LoadReport) {
        match part {
            PartRecord::Clock {
                id,
                label,
                period_ms,
                phase_ms,
                level,
                pin,
            } => {
                if *period_ms == 0 {
                    report.issues.push(LoadIssue::MalformedComponent {
                        id: *id,
                        reason: "clock period must be positive".to_owned(),
                    });
                    return;
                }
                let mut clock = ClockState::new(Duration::from_millis(*period_ms)).with_level(*level);
                if let Some(phase) = phase_ms {
                    clock = clock.with_phase(Duration::from_millis(*phase));
                }
                self.load_component(
                    ComponentKind::Clock(clock),
                    *id,
                    &[],
                    &[*pin],
                    label.clone(),
                    report,
                );
            }
            PartRecord::FlipFlop {
                id,
                label,
                d,
                clk,
                q,
                qn,
                stored,
            } => {
                self.load_component(
                    ComponentKind::FlipFlop(FlipFlopState::with_stored(*stored)),
                    *id,
                    &[*d, *clk],
                    &[*q, *qn],
                    label.clone(),
                    report,
                );
            }
            PartRecord::Register {
                id,
                label,
                d,
                clk,
                q,
                stored,
            } => {
                let width = stored.len();
                if width == 0 || d.len() != width || q.len() != width {
                    report.issues.push(LoadIssue::MalformedComponent {
                        id: *id,
                        reason: format!(
                            "register pin counts disagree: {} d, {} q, {} stored bits",
                            d.len(),
                            q.len(),
                            width
                        ),
                    });
                    return;
                }
                let state = RegisterState::with_stored(stored.iter().copied().collect());
                let mut inputs: Vec<u64> = d.clone();
                inputs.push(*clk);
                self.load_component(
                    ComponentKind::Register(state),
                    *id,
                    &inputs,
                    q,
                    label.clone(),
                    report,
                );
            }
        }
    }

    fn load_component(
        &mut self,
        kind: ComponentKind,
        id: u64,
        input_ids: &[u64],
        output_ids: &[u64],
        label: Option<String>,
        report: &mut LoadReport,
    ) {
        let inputs: SmallVec<[NodeId; 4]> = input_ids.iter().map(|n| NodeId::from(*n)).collect();
        let outputs: SmallVec<[NodeId; 4]> = output_ids.iter().map(|n| NodeId::from(*n)).collect();
        match self
            .graph
            .insert_component_with_ids(kind, ComponentId::from(id), &inputs, &outputs)
        {
            Ok(component_id) => {
                if let Some(component) = self.graph.component_mut(component_id) {
                    component.set_label(label);
                }
                self.after_insert(component_id);
            }
            Err(reason) => report.issues.push(LoadIssue::Component { id, reason }),
        }
    }

    fn load_wire(&mut self, wire: &WireRecord, report: &mut LoadReport) {
        let options = wire.options.clone().unwrap_or_default();
        let attrs = WireAttrs {
            delay: options.propagation_delay.map(Duration::from_millis),
            waypoints: options.via,
            style: options.style,
        };
        let source = NodeId::from(wire.source);
        let dest = NodeId::from(wire.dest);
        match self.graph.connect_with(source, dest, attrs) {
            Ok(_) => {
                // Loading reconstructs a consistent snapshot: the source's
                // settled value lands in the destination immediately, not
                // through a delayed delivery.
                let value = self
                    .graph
                    .node(source)
                    .map(|n| n.effective_value())
                    .unwrap_or_default();
                if let Some(dest_node) = self.graph.node_mut(dest) {
                    if dest_node.set_value(value) {
                        let owner = dest_node.owner();
                        self.recalc.mark_dirty(&mut self.graph, owner);
                    }
                }
            }
            Err(reason) => report.issues.push(LoadIssue::Wire {
                source: wire.source,
                dest: wire.dest,
                reason,
            }),
        }
    }

    /// Enumerate the live circuit into a record. Unconfirmed placement
    /// previews and their wires are excluded.
    pub fn dump_graph(&self) -> GraphRecord {
        let mut record = GraphRecord::new();

        for component in self.graph.components() {
            if component.state() == LifecycleState::Spawning {
                continue;
            }
            let id = component.id().raw();
            let label = component.label().map(str::to_owned);
            let inputs: Vec<u64> = component.inputs().iter().map(|n| n.raw()).collect();
            let outputs: Vec<u64> = component.outputs().iter().map(|n| n.raw()).collect();

            match component.kind() {
                ComponentKind::Input { value } => record.inputs.push(InputRecord {
                    id,
                    label,
                    value: *value,
                    pin: outputs[0],
                }),
                ComponentKind::Output => record.outputs.push(OutputRecord {
                    id,
                    label,
                    pin: inputs[0],
                }),
                ComponentKind::Gate { op, .. } => record.gates.push(GateRecord {
                    id,
                    label,
                    op: (*op).into(),
                    inputs,
                    output: outputs[0],
                }),
                ComponentKind::Not => record.gates.push(GateRecord {
                    id,
                    label,
                    op: GateOpRecord::Not,
                    inputs,
                    output: outputs[0],
                }),
                ComponentKind::Clock(clock) => record.components.push(PartRecord::Clock {
                    id,
                    label,
                    period_ms: clock.period().as_millis() as u64,
                    phase_ms: clock.phase().map(|p| p.as_millis() as u64),
                    level: clock.level(),
                    pin: outputs[0],
                }),
                ComponentKind::FlipFlop(ff) => record.components.push(PartRecord::FlipFlop {
                    id,
                    label,
                    d: inputs[0],
                    clk: inputs[1],
                    q: outputs[0],
                    qn: outputs[1],
                    stored: ff.stored(),
                }),
                ComponentKind::Register(reg) => {
                    let width = reg.width();
                    record.components.push(PartRecord::Register {
                        id,
                        label,
                        d: inputs[..width].to_vec(),
                        clk: inputs[width],
                        q: outputs,
                        stored: reg.stored().to_vec(),
                    });
                }
            }
        }

        for wire in self.graph.wires() {
            if self.endpoint_is_spawning(wire.source()) || self.endpoint_is_spawning(wire.dest()) {
                continue;
            }
            let options = WireOptionsRecord {
                via: wire.waypoints().to_vec(),
                propagation_delay: wire.custom_delay().map(|d| d.as_millis() as u64),
                style: wire.style().map(str::to_owned),
            };
            record.wires.push(WireRecord {
                source: wire.source().raw(),
                dest: wire.dest().raw(),
                options: (!options.is_empty()).then_some(options),
            });
        }

        record
    }

    fn endpoint_is_spawning(&self, node: NodeId) -> bool {
        self.graph
            .node(node)
            .and_then(|n| self.graph.component(n.owner()))
            .map(|c| c.state() == LifecycleState::Spawning)
            .unwrap_or(false)
    }
}
