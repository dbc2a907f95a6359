//! # IPMC Runtime Library
//!
//! Wires the IPMC subsystems together. The `ipmc-runtime` binary runs them;
//! the library is exposed for end-to-end tests.
//!
//! ```text
//!                     ┌──────────── IpmcContainer ─────────────┐
//!  SimulatedShelf ⇄ MemoryBus A/B ⇄ IpmbService ⇄ PicmgHandler │
//!                     │                  ↑             ↓       │
//!                     │      EventFanout ┴── HotswapController │
//!                     │           ↓                ⇅           │
//!                     │     InMemoryEventBus   SimulatedPayload│
//!                     └────────────────────────────────────────┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod container;
pub mod runtime;

pub use container::{ConfigError, HotswapSettings, IpmcConfig, IpmcContainer};
pub use runtime::IpmcRuntime;
