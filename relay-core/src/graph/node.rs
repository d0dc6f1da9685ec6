//! Graph Nodes
//!
//! This module defines the nodes that live in the circuit graph: the
//! single-bit input and output pins owned by components.
//!
//! A node stores its current logic value and, for output nodes, an optional
//! forced override set by the host's diagnostic mode. Setting a value does
//! not propagate anywhere by itself; propagation across wires is the
//! simulation runtime's job. `set_value` only reports whether the stored
//! value actually changed so callers can skip redundant work.

use smallvec::SmallVec;

use super::component::ComponentId;
use super::value::LogicValue;
use super::wire::WireId;

/// Unique identifier for a node in the circuit graph.
///
/// Ids are allocated by the owning [`Graph`](super::Graph) and are stable
/// across save/load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Whether a node is an input pin or an output pin of its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDirection {
    /// The node receives a value from at most one incoming wire.
    Input,
    /// The node drives zero or more outgoing wires.
    Output,
}

impl NodeDirection {
    /// Whether this is an input pin.
    pub fn is_input(self) -> bool {
        matches!(self, NodeDirection::Input)
    }

    /// Whether this is an output pin.
    pub fn is_output(self) -> bool {
        matches!(self, NodeDirection::Output)
    }
}

/// A single-bit connection point on a component.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// Input or output pin.
    direction: NodeDirection,

    /// The component this node belongs to. A node never outlives its
    /// component.
    owner: ComponentId,

    /// The current stored value.
    value: LogicValue,

    /// Optional override that supersedes the stored value. Only ever set on
    /// output nodes, by the host's diagnostic mode.
    forced: Option<LogicValue>,

    /// The incoming wire, for input nodes. `None` doubles as the "free"
    /// connection state.
    incoming: Option<WireId>,

    /// Outgoing wires, for output nodes. Outputs are not capacity-limited.
    outgoing: SmallVec<[WireId; 2]>,
}

impl Node {
    pub(crate) fn new(id: NodeId, direction: NodeDirection, owner: ComponentId) -> Self {
        Self {
            id,
            direction,
            owner,
            value: LogicValue::default(),
            forced: None,
            incoming: None,
            outgoing: SmallVec::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's direction.
    pub fn direction(&self) -> NodeDirection {
        self.direction
    }

    /// Get the owning component's ID.
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    /// The stored value, ignoring any forced override.
    pub fn value(&self) -> LogicValue {
        self.value
    }

    /// The forced override, if one is set.
    pub fn forced(&self) -> Option<LogicValue> {
        self.forced
    }

    /// The value observed by the rest of the circuit: the forced override
    /// if present, otherwise the stored value.
    pub fn effective_value(&self) -> LogicValue {
        self.forced.unwrap_or(self.value)
    }

    /// Store a new value. Returns `true` if the stored value actually
    /// changed, `false` for a redundant write.
    pub fn set_value(&mut self, value: LogicValue) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }

    /// Set or clear the forced override. Returns `true` if the effective
    /// value changed as a result.
    pub(crate) fn set_forced(&mut self, forced: Option<LogicValue>) -> bool {
        let before = self.effective_value();
        self.forced = forced;
        self.effective_value() != before
    }

    /// Whether an input node can accept a wire. Output nodes are never
    /// "taken".
    pub fn is_free(&self) -> bool {
        match self.direction {
            NodeDirection::Input => self.incoming.is_none(),
            NodeDirection::Output => true,
        }
    }

    /// Whether any wire touches this node. Used by hosts to render
    /// connection indicators; the core itself does not branch on it.
    pub fn is_connected(&self) -> bool {
        self.incoming.is_some() || !self.outgoing.is_empty()
    }

    /// The incoming wire of an input node, if connected.
    pub fn incoming(&self) -> Option<WireId> {
        self.incoming
    }

    /// The outgoing wires of an output node.
    pub fn outgoing(&self) -> &[WireId] {
        &self.outgoing
    }

    pub(crate) fn attach_incoming(&mut self, wire: WireId) {
        debug_assert!(self.direction.is_input() && self.incoming.is_none());
        self.incoming = Some(wire);
    }

    pub(crate) fn detach_incoming(&mut self) {
        self.incoming = None;
        // A disconnected input falls back to the default level.
        self.value = LogicValue::default();
    }

    pub(crate) fn attach_outgoing(&mut self, wire: WireId) {
        debug_assert!(self.direction.is_output());
        self.outgoing.push(wire);
    }

    pub(crate) fn detach_outgoing(&mut self, wire: WireId) {
        self.outgoing.retain(|w| *w != wire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(direction: NodeDirection) -> Node {
        Node::new(NodeId::from(0), direction, ComponentId::from(0))
    }

    #[test]
    fn set_value_reports_actual_changes() {
        let mut node = test_node(NodeDirection::Output);
        assert_eq!(node.value(), LogicValue::False);

        assert!(node.set_value(LogicValue::True));
        assert!(!node.set_value(LogicValue::True));
        assert!(node.set_value(LogicValue::Unknown));
    }

    #[test]
    fn effective_value_prefers_forced_override() {
        let mut node = test_node(NodeDirection::Output);
        node.set_value(LogicValue::False);

        assert!(node.set_forced(Some(LogicValue::True)));
        assert_eq!(node.effective_value(), LogicValue::True);
        assert_eq!(node.value(), LogicValue::False);

        // Clearing the override restores the stored value.
        assert!(node.set_forced(None));
        assert_eq!(node.effective_value(), LogicValue::False);
    }

    #[test]
    fn forcing_the_stored_value_is_not_a_change() {
        let mut node = test_node(NodeDirection::Output);
        node.set_value(LogicValue::True);
        assert!(!node.set_forced(Some(LogicValue::True)));
    }

    #[test]
    fn input_connection_state() {
        let mut node = test_node(NodeDirection::Input);
        assert!(node.is_free());

        node.attach_incoming(WireId::from(7));
        assert!(!node.is_free());
        assert_eq!(node.incoming(), Some(WireId::from(7)));

        node.set_value(LogicValue::True);
        node.detach_incoming();
        assert!(node.is_free());
        // Detaching resets the value to the default level.
        assert_eq!(node.value(), LogicValue::False);
    }

    #[test]
    fn outputs_are_never_taken() {
        let mut node = test_node(NodeDirection::Output);
        node.attach_outgoing(WireId::from(1));
        node.attach_outgoing(WireId::from(2));
        assert!(node.is_free());
        assert_eq!(node.outgoing().len(), 2);

        node.detach_outgoing(WireId::from(1));
        assert_eq!(node.outgoing(), &[WireId::from(2)]);
    }
}
