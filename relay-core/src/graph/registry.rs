//! Graph Registry
//!
//! The `Graph` owns every live component, wire and node. It is the one
//! shared mutable structure of the engine and is only ever touched from the
//! single active turn, so there is no locking anywhere.
//!
//! # Design Decisions
//!
//! 1. Components, wires and nodes live in `IndexMap`s. Iteration follows
//!    insertion order, which gives deterministic dumps and the stable
//!    processing order the recalculation engine documents.
//!
//! 2. Nodes are owned centrally and indexed by id, not embedded in their
//!    components. Components hold node ids. This keeps wire endpoints a
//!    plain id lookup and turns most stale-reference bugs into "not found"
//!    conditions, because destroyed entities leave the index immediately.
//!
//! 3. Ids are allocated by the graph itself, never from global counters, so
//!    independent graphs (e.g. nested subcircuit editors) cannot cross-talk.
//!    The load path may insert entities with explicit ids; allocators are
//!    bumped past them so later interactive placements stay unique.

use indexmap::IndexMap;
use smallvec::SmallVec;
use thiserror::Error;

use super::component::{Component, ComponentId, ComponentKind, LifecycleState};
use super::node::{Node, NodeDirection, NodeId};
use super::wire::{Wire, WireAttrs, WireId};

/// Error raised by structural graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("unknown component {0}")]
    UnknownComponent(u64),
    #[error("unknown wire {0}")]
    UnknownWire(u64),
    #[error("unknown node {0}")]
    UnknownNode(u64),
    #[error("id {0} is already in use")]
    IdInUse(u64),
    #[error("component {id} declares {declared} {direction} pins, its kind needs {expected}")]
    PinCountMismatch {
        id: u64,
        direction: &'static str,
        declared: usize,
        expected: usize,
    },
}

/// Error raised by an invalid connection attempt. The graph is left
/// untouched when any of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("unknown node {0}")]
    UnknownNode(u64),
    #[error("source node {0} is not an output")]
    SourceNotOutput(u64),
    #[error("destination node {0} is not an input")]
    DestinationNotInput(u64),
    #[error("destination node {0} already has an incoming wire")]
    DestinationTaken(u64),
}

/// The authoritative registry of all live components, wires and nodes.
#[derive(Debug, Default)]
pub struct Graph {
    components: IndexMap<ComponentId, Component>,
    wires: IndexMap<WireId, Wire>,
    nodes: IndexMap<NodeId, Node>,
    next_component_id: u64,
    next_wire_id: u64,
    next_node_id: u64,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Insert a confirmed component, allocating its nodes.
    pub fn insert_component(&mut self, kind: ComponentKind) -> ComponentId {
        self.insert_with_state(kind, LifecycleState::Normal)
    }

    /// Insert a placement preview. It recalculates like any other
    /// component but is excluded from persisted output until confirmed.
    pub fn insert_preview(&mut self, kind: ComponentKind) -> ComponentId {
        self.insert_with_state(kind, LifecycleState::Spawning)
    }

    fn insert_with_state(&mut self, kind: ComponentKind, state: LifecycleState) -> ComponentId {
        let id = ComponentId::from(self.next_component_id);
        self.next_component_id += 1;

        let inputs = self.alloc_nodes(id, NodeDirection::Input, kind.input_count());
        let outputs = self.alloc_nodes(id, NodeDirection::Output, kind.output_count());
        self.components
            .insert(id, Component::new(id, kind, inputs, outputs.into_iter().collect(), state));
        id
    }

    fn alloc_nodes(
        &mut self,
        owner: ComponentId,
        direction: NodeDirection,
        count: usize,
    ) -> SmallVec<[NodeId; 4]> {
        (0..count)
            .map(|_| {
                let id = NodeId::from(self.next_node_id);
                self.next_node_id += 1;
                self.nodes.insert(id, Node::new(id, direction, owner));
                id
            })
            .collect()
    }

    /// Insert a component with explicit ids, as found in a persisted
    /// record. Pin counts must match the kind's layout and no id may be in
    /// use; nothing is inserted on error.
    pub fn insert_component_with_ids(
        &mut self,
        kind: ComponentKind,
        id: ComponentId,
        input_ids: &[NodeId],
        output_ids: &[NodeId],
    ) -> Result<ComponentId, GraphError> {
        if self.components.contains_key(&id) {
            return Err(GraphError::IdInUse(id.raw()));
        }
        if input_ids.len() != kind.input_count() {
            return Err(GraphError::PinCountMismatch {
                id: id.raw(),
                direction: "input",
                declared: input_ids.len(),
                expected: kind.input_count(),
            });
        }
        if output_ids.len() != kind.output_count() {
            return Err(GraphError::PinCountMismatch {
                id: id.raw(),
                direction: "output",
                declared: output_ids.len(),
                expected: kind.output_count(),
            });
        }
        for node_id in input_ids.iter().chain(output_ids) {
            if self.nodes.contains_key(node_id) {
                return Err(GraphError::IdInUse(node_id.raw()));
            }
        }

        for (ids, direction) in [
            (input_ids, NodeDirection::Input),
            (output_ids, NodeDirection::Output),
        ] {
            for node_id in ids {
                self.nodes.insert(*node_id, Node::new(*node_id, direction, id));
                self.next_node_id = self.next_node_id.max(node_id.raw() + 1);
            }
        }
        self.next_component_id = self.next_component_id.max(id.raw() + 1);

        let inputs = input_ids.iter().copied().collect();
        let outputs = output_ids.iter().copied().collect();
        self.components.insert(
            id,
            Component::new(id, kind, inputs, outputs, LifecycleState::Normal),
        );
        Ok(id)
    }

    /// Confirm a spawning preview. Idempotent for already-confirmed
    /// components.
    pub fn confirm_component(&mut self, id: ComponentId) -> Result<(), GraphError> {
        let component = self
            .components
            .get_mut(&id)
            .ok_or(GraphError::UnknownComponent(id.raw()))?;
        if component.state() == LifecycleState::Spawning {
            component.set_state(LifecycleState::Normal);
        }
        Ok(())
    }

    /// Destroy a component: all its nodes leave the index and every wire
    /// touching them is removed. Returns the owners of input nodes in
    /// *other* components whose incoming wire was destroyed (their values
    /// were reset, so they need recalculation).
    pub fn remove_component(&mut self, id: ComponentId) -> Result<Vec<ComponentId>, GraphError> {
        let component = self
            .components
            .get_mut(&id)
            .ok_or(GraphError::UnknownComponent(id.raw()))?;
        component.set_state(LifecycleState::Dead);

        let node_ids: Vec<NodeId> = component
            .inputs()
            .iter()
            .chain(component.outputs())
            .copied()
            .collect();

        // Collect every wire touching this component before mutating.
        let mut doomed_wires: Vec<WireId> = Vec::new();
        for node_id in &node_ids {
            if let Some(node) = self.nodes.get(node_id) {
                doomed_wires.extend(node.incoming());
                doomed_wires.extend(node.outgoing().iter().copied());
            }
        }

        let mut disturbed = Vec::new();
        for wire_id in doomed_wires {
            if let Ok(dest_owner) = self.remove_wire(wire_id) {
                if dest_owner != id {
                    disturbed.push(dest_owner);
                }
            }
        }

        for node_id in &node_ids {
            self.nodes.shift_remove(node_id);
        }
        self.components.shift_remove(&id);
        Ok(disturbed)
    }

    /// Look up a component.
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Look up a component mutably.
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(&id)
    }

    /// Iterate over live components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    // ------------------------------------------------------------------
    // Wires
    // ------------------------------------------------------------------

    /// Connect an output node to a free input node with default attributes.
    pub fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<WireId, ConnectError> {
        self.connect_with(source, dest, WireAttrs::default())
    }

    /// Connect an output node to a free input node. Validation happens
    /// before any mutation: on error neither node changes.
    pub fn connect_with(
        &mut self,
        source: NodeId,
        dest: NodeId,
        attrs: WireAttrs,
    ) -> Result<WireId, ConnectError> {
        let source_node = self
            .nodes
            .get(&source)
            .ok_or(ConnectError::UnknownNode(source.raw()))?;
        if !source_node.direction().is_output() {
            return Err(ConnectError::SourceNotOutput(source.raw()));
        }
        let dest_node = self
            .nodes
            .get(&dest)
            .ok_or(ConnectError::UnknownNode(dest.raw()))?;
        if !dest_node.direction().is_input() {
            return Err(ConnectError::DestinationNotInput(dest.raw()));
        }
        if !dest_node.is_free() {
            return Err(ConnectError::DestinationTaken(dest.raw()));
        }

        let id = WireId::from(self.next_wire_id);
        self.next_wire_id += 1;
        self.wires.insert(id, Wire::new(id, source, dest, attrs));

        // Unwraps cannot fail: both nodes were just looked up.
        if let Some(node) = self.nodes.get_mut(&source) {
            node.attach_outgoing(id);
        }
        if let Some(node) = self.nodes.get_mut(&dest) {
            node.attach_incoming(id);
        }
        Ok(id)
    }

    /// Destroy a wire: the destination input's slot is freed and its value
    /// reset to the default level. The source node keeps its value. Returns
    /// the destination node's owner so the caller can flag it for
    /// recalculation.
    pub fn remove_wire(&mut self, id: WireId) -> Result<ComponentId, GraphError> {
        let wire = self
            .wires
            .shift_remove(&id)
            .ok_or(GraphError::UnknownWire(id.raw()))?;

        if let Some(node) = self.nodes.get_mut(&wire.source()) {
            node.detach_outgoing(id);
        }
        let mut dest_owner = None;
        if let Some(node) = self.nodes.get_mut(&wire.dest()) {
            node.detach_incoming();
            dest_owner = Some(node.owner());
        }
        dest_owner.ok_or(GraphError::UnknownNode(wire.dest().raw()))
    }

    /// Look up a wire.
    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(&id)
    }

    /// Iterate over live wires in insertion order.
    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.wires.values()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Look up a node mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    // ------------------------------------------------------------------
    // Whole-graph operations
    // ------------------------------------------------------------------

    /// Remove everything. Id allocators keep counting so references held
    /// across a clear can never alias a new entity.
    pub fn clear(&mut self) {
        self.components.clear();
        self.wires.clear();
        self.nodes.clear();
    }

    /// Number of live components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of live wires.
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
