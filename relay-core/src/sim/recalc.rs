//! Recalculation Engine
//!
//! The engine keeps the set of components whose outputs may be stale and
//! recomputes them in rounds until the graph is quiescent.
//!
//! # Algorithm
//!
//! 1. `mark_dirty` adds a component to the pending set (idempotently) and
//!    flags it.
//!
//! 2. A settle pass snapshots the pending set, clears it, and recomputes
//!    every snapshotted component in insertion order. Writing a changed
//!    output propagates across the node's wires: a zero-delay wire copies
//!    the value into the destination immediately and marks the downstream
//!    component for the *next* round; a delayed wire becomes a pending
//!    delivery handed back to the caller, which schedules it on the
//!    timeline. The engine itself never touches the timeline.
//!
//! 3. Rounds repeat until the pending set is empty or the round cap is
//!    hit. The cap guards against combinational feedback loops: the pass
//!    is abandoned with a warning, values stay as last computed, and the
//!    engine remains usable. There is no smarter cycle detection on
//!    purpose; capped-and-warned matches how existing circuits behave.
//!
//! Cross-round convergence is order-independent for acyclic graphs; within
//! a round the snapshot's insertion order is the documented tie-break.

use std::mem;
use std::time::Duration;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::graph::{ComponentId, Graph, LifecycleState, LogicValue, NodeId, WireId};

/// A value copy that must cross a delayed wire. Produced by a settle pass;
/// the simulation runtime schedules it on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    /// The wire the value travels across.
    pub wire: WireId,
    /// The value to copy into the wire's destination node.
    pub value: LogicValue,
    /// How long after the moment of the settle pass the value arrives.
    pub delay: Duration,
}

/// Outcome of one settle pass.
#[derive(Debug)]
pub struct SettleReport {
    /// Rounds executed.
    pub rounds: usize,
    /// `false` when the round cap was hit and the pass abandoned.
    pub converged: bool,
    /// Deliveries across delayed wires, for the caller to schedule.
    pub deliveries: Vec<PendingDelivery>,
}

/// The recalculation engine: a pending set plus the settle loop.
#[derive(Debug)]
pub struct Recalculator {
    /// Components awaiting recomputation, in marking order.
    dirty: IndexSet<ComponentId>,
    round_cap: usize,
}

impl Recalculator {
    /// An engine with the given round cap.
    pub fn new(round_cap: usize) -> Self {
        Self {
            dirty: IndexSet::new(),
            round_cap,
        }
    }

    /// Flag a component for recomputation. Idempotent while already
    /// pending.
    pub fn mark_dirty(&mut self, graph: &mut Graph, id: ComponentId) {
        if let Some(component) = graph.component_mut(id) {
            if component.state() == LifecycleState::Dead {
                return;
            }
            component.set_needs_recalc(true);
        }
        self.dirty.insert(id);
    }

    /// Whether nothing is pending.
    pub fn is_quiescent(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Number of pending components.
    pub fn pending_count(&self) -> usize {
        self.dirty.len()
    }

    /// Drop all pending work, e.g. when the graph is cleared.
    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    /// Run recalculation rounds until quiescent or the round cap is hit.
    /// `default_delay` resolves wires without a custom delay.
    pub fn settle(&mut self, graph: &mut Graph, default_delay: Duration) -> SettleReport {
        let mut deliveries = Vec::new();
        let mut rounds = 0;

        while !self.dirty.is_empty() {
            if rounds == self.round_cap {
                warn!(
                    rounds,
                    pending = self.dirty.len(),
                    "recalculation did not converge, likely a combinational cycle; abandoning pass"
                );
                // Abandon: values stay as last computed and the next
                // external event starts a fresh pass.
                let abandoned = mem::take(&mut self.dirty);
                for id in abandoned {
                    if let Some(component) = graph.component_mut(id) {
                        component.set_needs_recalc(false);
                    }
                }
                return SettleReport {
                    rounds,
                    converged: false,
                    deliveries,
                };
            }
            rounds += 1;

            let snapshot = mem::take(&mut self.dirty);
            trace!(round = rounds, components = snapshot.len(), "recalculation round");
            for id in snapshot {
                self.recalc_component(graph, id, default_delay, &mut deliveries);
            }
        }

        SettleReport {
            rounds,
            converged: true,
            deliveries,
        }
    }

    fn recalc_component(
        &mut self,
        graph: &mut Graph,
        id: ComponentId,
        default_delay: Duration,
        deliveries: &mut Vec<PendingDelivery>,
    ) {
        // A component may have been destroyed after it was marked; stale
        // ids are simply not found.
        let Some(component) = graph.component(id) else {
            return;
        };
        if component.state() == LifecycleState::Dead {
            return;
        }

        let input_ids: SmallVec<[_; 4]> = component.inputs().iter().copied().collect();
        let output_ids: SmallVec<[_; 2]> = component.outputs().iter().copied().collect();

        let input_values: SmallVec<[LogicValue; 4]> = input_ids
            .iter()
            .map(|node_id| {
                graph
                    .node(*node_id)
                    .map(|n| n.effective_value())
                    .unwrap_or(LogicValue::Unknown)
            })
            .collect();

        let Some(component) = graph.component_mut(id) else {
            return;
        };
        component.set_needs_recalc(false);
        let outputs = component.recalc(&input_values);
        debug_assert_eq!(outputs.len(), output_ids.len());

        for (node_id, new_value) in output_ids.iter().zip(outputs) {
            self.propagate_output(graph, *node_id, new_value, default_delay, deliveries);
        }
    }

    /// Write a freshly computed value into an output node and, if its
    /// effective value changed, propagate it across the node's wires.
    fn propagate_output(
        &mut self,
        graph: &mut Graph,
        node_id: NodeId,
        new_value: LogicValue,
        default_delay: Duration,
        deliveries: &mut Vec<PendingDelivery>,
    ) {
        let Some(node) = graph.node_mut(node_id) else {
            return;
        };
        let before = node.effective_value();
        node.set_value(new_value);
        let after = node.effective_value();
        // A forced override swallows computed changes entirely.
        if after == before {
            return;
        }
        let wires: SmallVec<[WireId; 2]> = node.outgoing().iter().copied().collect();

        for wire_id in wires {
            let Some(wire) = graph.wire(wire_id) else {
                continue;
            };
            let delay = wire.effective_delay(default_delay);
            let dest = wire.dest();
            if delay.is_zero() {
                // Immediate combinational propagation: lands in the next
                // round of this same pass.
                if let Some(dest_node) = graph.node_mut(dest) {
                    if dest_node.set_value(after) {
                        let owner = dest_node.owner();
                        self.mark_dirty(graph, owner);
                    }
                }
            } else {
                deliveries.push(PendingDelivery {
                    wire: wire_id,
                    value: after,
                    delay,
                });
            }
        }
    }
}
