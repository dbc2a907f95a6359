//! Adapters connecting the subsystems to the simulated board and shelf.

pub mod event_fanout;
pub mod payload;
pub mod shelf;

pub use event_fanout::EventFanout;
pub use payload::SimulatedPayload;
pub use shelf::{BusWires, ShelfError, SimulatedShelf};
