//! Wires
//!
//! A wire is a directed connection from one output node to one input node.
//! It is the unit across which the simulation runtime schedules delayed
//! value deliveries: when the source node's effective value changes, a copy
//! of the new value is scheduled to arrive at the destination after the
//! wire's propagation delay.
//!
//! Waypoints and style are carried opaquely for the host's renderer; the
//! core never interprets them.

use std::time::Duration;

use super::node::NodeId;

/// Unique identifier for a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireId(u64);

impl WireId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for WireId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Optional attributes supplied when connecting a wire.
#[derive(Debug, Clone, Default)]
pub struct WireAttrs {
    /// Custom propagation delay. Falls back to the configured global
    /// default when absent.
    pub delay: Option<Duration>,
    /// Rendering-only routing points, ignored by the simulation.
    pub waypoints: Vec<[f64; 2]>,
    /// Rendering-only style override, ignored by the simulation.
    pub style: Option<String>,
}

/// A directed, delay-carrying connection between two nodes.
#[derive(Debug)]
pub struct Wire {
    id: WireId,
    /// Source node; always an output pin.
    source: NodeId,
    /// Destination node; always an input pin with no other incoming wire.
    dest: NodeId,
    delay: Option<Duration>,
    waypoints: Vec<[f64; 2]>,
    style: Option<String>,
}

impl Wire {
    pub(crate) fn new(id: WireId, source: NodeId, dest: NodeId, attrs: WireAttrs) -> Self {
        Self {
            id,
            source,
            dest,
            delay: attrs.delay,
            waypoints: attrs.waypoints,
            style: attrs.style,
        }
    }

    /// Get the wire's ID.
    pub fn id(&self) -> WireId {
        self.id
    }

    /// The source output node.
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// The destination input node.
    pub fn dest(&self) -> NodeId {
        self.dest
    }

    /// The custom delay, if one was set on this wire.
    pub fn custom_delay(&self) -> Option<Duration> {
        self.delay
    }

    /// The delay used for deliveries across this wire: the custom delay if
    /// set, otherwise the supplied global default.
    pub fn effective_delay(&self, default: Duration) -> Duration {
        self.delay.unwrap_or(default)
    }

    /// Rendering-only routing points.
    pub fn waypoints(&self) -> &[[f64; 2]] {
        &self.waypoints
    }

    /// Rendering-only style override.
    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_delay_falls_back_to_default() {
        let default = Duration::from_millis(100);

        let plain = Wire::new(
            WireId::from(0),
            NodeId::from(1),
            NodeId::from(2),
            WireAttrs::default(),
        );
        assert_eq!(plain.effective_delay(default), default);

        let custom = Wire::new(
            WireId::from(1),
            NodeId::from(1),
            NodeId::from(2),
            WireAttrs {
                delay: Some(Duration::from_millis(25)),
                ..Default::default()
            },
        );
        assert_eq!(custom.effective_delay(default), Duration::from_millis(25));
    }
}
