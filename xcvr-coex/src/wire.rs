//! Messages understood by the external coexistence arbiter.
//!
//! Two message types share the request line. A Type-7 message carries the per-direction priority
//! flags in its low bits below a fixed `0b111` tag. A Type-0 message carries the direction being
//! requested. A Type-7 message with every priority bit cleared tells the arbiter that all access
//! is released.

/// Radio direction of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Receive.
    Rx,
    /// Transmit.
    Tx,
}

/// Per-direction "high priority" flags reported to the external arbiter.
///
/// The bit positions are the ones used in the Type-7 message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriorityFlags(u8);

impl PriorityFlags {
    /// No direction has high priority.
    pub const NONE: PriorityFlags = PriorityFlags(0);
    /// Receive has high priority.
    pub const RX: PriorityFlags = PriorityFlags(1 << 0);
    /// Transmit has high priority.
    pub const TX: PriorityFlags = PriorityFlags(1 << 2);
    /// Both directions have high priority.
    pub const ALL: PriorityFlags = PriorityFlags(Self::RX.0 | Self::TX.0);

    const fn bit(direction: Direction) -> u8 {
        match direction {
            Direction::Rx => Self::RX.0,
            Direction::Tx => Self::TX.0,
        }
    }

    /// Returns `true` if `direction` has high priority.
    pub const fn contains(self, direction: Direction) -> bool {
        self.0 & Self::bit(direction) != 0
    }

    /// Set or clear the flag for `direction`.
    pub fn set(&mut self, direction: Direction, high: bool) {
        if high {
            self.0 |= Self::bit(direction);
        } else {
            self.0 &= !Self::bit(direction);
        }
    }

    /// The raw flag bits.
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Tag occupying the top three bits of a Type-7 message.
pub const TYPE7_TAG: u8 = 0b111 << 5;

/// Type-7 message with every priority bit cleared.
pub const RELEASE_MESSAGE: u8 = TYPE7_TAG;

const REQUEST_TX: u8 = 1 << 2;
const REQUEST_RX: u8 = 1 << 3;

/// Type-7 message carrying `flags`.
pub const fn priority_message(flags: PriorityFlags) -> u8 {
    TYPE7_TAG | (flags.bits() & PriorityFlags::ALL.bits())
}

/// Type-0 message requesting `direction`.
pub const fn request_message(direction: Direction) -> u8 {
    match direction {
        Direction::Tx => REQUEST_TX,
        Direction::Rx => REQUEST_RX,
    }
}
