//! Coexistence with an external radio arbiter.
//!
//! The [`Coexistence`] engine negotiates transceiver access with an off-chip arbiter that shares
//! spectrum or an antenna between several radios. Access is requested with a pair of bit-banged
//! messages on a single request line and granted or withdrawn through two deny inputs, one per
//! radio direction. Withdrawal is reported to every protocol registered with the shared
//! [`arbiter::Arbiter`] through its coexistence sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use xcvr_coex::arbiter::{Arbiter, ProtocolId};
//! use xcvr_coex::{Coexistence, Config, Direction, Pins};
//!
//! static ARBITER: Arbiter<'static> = Arbiter::new(xcvr_coex::arbiter::Config::new());
//!
//! let coex = Coexistence::new(&ARBITER, Pins { request, tx_deny, rx_deny }, clock, Config::new())?;
//! coex.register(ProtocolId::Ble, 1, &ble_coex_events)?;
//!
//! match coex.request_access(Direction::Tx) {
//!     Ok(()) => {
//!         // Transmit, then give the access back.
//!         coex.release_access()?;
//!     }
//!     Err(Error::Denied) => {
//!         // Retry policy belongs to the caller.
//!     }
//!     Err(e) => return Err(e),
//! }
//!
//! // In the deny-line GPIO interrupt handler:
//! coex.on_deny_interrupt(Direction::Tx)?;
//! ```
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod bitbang;
mod clock;
mod coex;
mod gpio;
#[cfg_attr(not(feature = "stats"), allow(dead_code))]
mod stats;
pub mod wire;

pub use xcvr_arbiter as arbiter;

pub use arbiter::{Error, Event, Notify, ProtocolId, RetVal};
pub use bitbang::{BitBang, FRAME_UNITS};
#[cfg(feature = "dwt")]
pub use clock::DwtClock;
pub use clock::{TickSource, Timestamp};
pub use coex::{Coexistence, Config, Pins, RfState};
pub use gpio::{DenyLevel, DenyState, EdgeInterrupt};
#[cfg(feature = "stats")]
pub use stats::{DirectionStats, Statistics};
pub use wire::{Direction, PriorityFlags};
