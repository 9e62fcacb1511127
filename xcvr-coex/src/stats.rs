//! Coexistence counters.

use crate::wire::Direction;

/// Counters for one radio direction. All counters only ever increase (saturating).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectionStats {
    /// Requests signalled to the external arbiter.
    pub requests: u32,
    /// Low priority receive requests granted locally without signalling.
    pub immediate_grants: u32,
    /// Requests granted after the sample window.
    pub grants: u32,
    /// Requests still denied when the sample window elapsed.
    pub timeouts: u32,
    /// Releases while this direction's deny line was monitored.
    pub releases: u32,
    /// Aborts raised by this direction's deny line.
    pub aborts: u32,
}

/// Snapshot of the coexistence counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Statistics {
    /// Receive counters.
    pub rx: DirectionStats,
    /// Transmit counters.
    pub tx: DirectionStats,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Requests,
    ImmediateGrants,
    Grants,
    Timeouts,
    Releases,
    Aborts,
}

impl Statistics {
    /// All counters zero.
    pub const fn new() -> Self {
        const ZERO: DirectionStats = DirectionStats {
            requests: 0,
            immediate_grants: 0,
            grants: 0,
            timeouts: 0,
            releases: 0,
            aborts: 0,
        };
        Statistics { rx: ZERO, tx: ZERO }
    }

    /// Counters for `direction`.
    pub fn direction(&self, direction: Direction) -> &DirectionStats {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    pub(crate) fn bump(&mut self, direction: Direction, counter: Counter) {
        let stats = match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        };
        let value = match counter {
            Counter::Requests => &mut stats.requests,
            Counter::ImmediateGrants => &mut stats.immediate_grants,
            Counter::Grants => &mut stats.grants,
            Counter::Timeouts => &mut stats.timeouts,
            Counter::Releases => &mut stats.releases,
            Counter::Aborts => &mut stats.aborts,
        };
        *value = value.saturating_add(1);
    }
}
