//! Simulation Engine
//!
//! This module implements the live half of the engine: the recalculation
//! engine that recomputes dirty components in rounds, and the runtime that
//! coordinates recalculation with the discrete-event timeline.
//!
//! The split mirrors the two ways values move through a circuit:
//!
//! - Combinational fallout resolves synchronously inside one settle pass
//!   (the recalculation engine).
//! - Anything carrying a delay crosses the timeline as a scheduled event
//!   and re-enters recalculation when it fires (the runtime).

mod recalc;
mod runtime;

pub use recalc::{PendingDelivery, Recalculator, SettleReport};
pub use runtime::{SettleSummary, SimConfig, SimError, SimEvent, Simulation};
