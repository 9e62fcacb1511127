//! Arbitration of a single shared radio transceiver between protocol stacks.
//!
//! Protocol stacks register a notification sink and a fixed priority with the [`Arbiter`], then
//! bracket every radio operation with [`Arbiter::acquire`] and [`Arbiter::release`]. Ownership is
//! exclusive and re-entrant; a strictly higher priority stack may preempt the current owner, and
//! releasing the transceiver offers it to every other stack in priority order.
//!
//! # Example
//!
//! ```rust,no_run
//! use xcvr_arbiter::{Arbiter, Config, Event, ProtocolId, RetVal};
//!
//! static ARBITER: Arbiter<'static> = Arbiter::new(Config::new());
//!
//! fn ble_events(event: Event) -> RetVal {
//!     match event {
//!         Event::Abort => {
//!             // Stop the current radio event right away.
//!             RetVal::SUCCESS
//!         }
//!         Event::GetInactivityDuration => RetVal::from_duration_us(10_000),
//!         _ => RetVal::SUCCESS,
//!     }
//! }
//!
//! ARBITER.register(ProtocolId::Ble, 1, &ble_events).unwrap();
//!
//! if ARBITER.acquire(ProtocolId::Ble, false).is_ok() {
//!     // Use the radio.
//!     ARBITER.release(ProtocolId::Ble).unwrap();
//! }
//! ```
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod arbiter;
mod error;
mod mask;
mod protocol;
pub mod registry;

pub use arbiter::*;
pub use error::{Error, RetVal};
pub use mask::*;
pub use protocol::*;
pub use registry::Registry;
