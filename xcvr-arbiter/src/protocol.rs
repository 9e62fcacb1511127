//! Protocol identities and the notification contract.

use crate::RetVal;

/// A protocol stack sharing the transceiver.
///
/// "No protocol" is expressed as `Option::<ProtocolId>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolId {
    /// Bluetooth Low Energy link layer.
    Ble,
    /// IEEE 802.15.4 MAC.
    Ieee802154,
    /// Proprietary generic FSK stack.
    GenFsk,
    /// ANT.
    Ant,
}

impl ProtocolId {
    /// Number of real protocols.
    pub const COUNT: usize = 4;

    /// Every protocol, in declaration order.
    pub const ALL: [ProtocolId; Self::COUNT] = [
        ProtocolId::Ble,
        ProtocolId::Ieee802154,
        ProtocolId::GenFsk,
        ProtocolId::Ant,
    ];

    /// Arena index of this protocol.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look a protocol up by its arena index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }
}

/// A notification delivered to a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The sink was just registered.
    Init,
    /// The protocol now owns the transceiver.
    Active,
    /// The protocol must stop using the transceiver immediately.
    Abort,
    /// The transceiver is free.
    Idle,
    /// The protocol's ownership ended through its own release.
    Release,
    /// Asks for the protocol's self-reported inactivity, in microseconds.
    GetInactivityDuration,
}

/// Which of a protocol's two callback slots a sink occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    /// Internal arbitration notifications.
    Arbitration,
    /// External coexistence grant/deny notifications.
    Coexistence,
}

/// A notification sink registered by a protocol stack.
///
/// Sinks may be invoked from interrupt context with interrupts masked, and may call back into
/// the arbiter (for example, acquiring the transceiver from an `Idle` notification).
pub trait Notify: Sync {
    /// Deliver `event`. See [`RetVal`] for how the returned word is interpreted.
    fn notify(&self, event: Event) -> RetVal;
}

impl<F> Notify for F
where
    F: Fn(Event) -> RetVal + Sync,
{
    fn notify(&self, event: Event) -> RetVal {
        self(event)
    }
}
