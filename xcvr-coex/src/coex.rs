use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::arbiter::{Arbiter, Error, Event, Notify, ProtocolId};
use crate::bitbang::BitBang;
use crate::clock::{delay_us, TickSource, Timestamp};
use crate::gpio::{gpio_fault, is_denied, DenyLevel, DenyState, EdgeInterrupt};
#[cfg(feature = "stats")]
use crate::stats::Statistics;
use crate::stats::Counter;
use crate::wire::{self, Direction, PriorityFlags};

/// Direction of the access currently negotiated with the external arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RfState {
    /// No access is held.
    Idle,
    /// Receive access is held.
    Rx,
    /// Transmit access is held.
    Tx,
}

impl From<Direction> for RfState {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Rx => RfState::Rx,
            Direction::Tx => RfState::Tx,
        }
    }
}

/// Coexistence timing and signalling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Tick source ticks per bit-banged bit.
    pub bit_ticks: u32,
    /// Guard interval between the priority and request messages, in microseconds.
    pub prio_signal_time_us: u32,
    /// Time the external arbiter is given to answer a request before the deny line is sampled,
    /// in microseconds.
    pub sample_delay_us: u32,
    /// Priority flags in effect after initialization.
    pub default_priority: PriorityFlags,
    /// Level at which the deny lines read as denied.
    pub deny_level: DenyLevel,
}

impl Config {
    /// Defaults: 1 Mbit/s signalling on a 64 MHz tick source, transmit high priority, deny
    /// lines active high.
    pub const fn new() -> Self {
        Config {
            bit_ticks: 64,
            prio_signal_time_us: 5,
            sample_delay_us: 30,
            default_priority: PriorityFlags::TX,
            deny_level: DenyLevel::High,
        }
    }

    /// Derive the bit period from the tick source frequency and the signalling rate.
    pub const fn with_baud_rate(mut self, tick_hz: u32, baud: u32) -> Self {
        self.bit_ticks = if baud == 0 { 0 } else { tick_hz / baud };
        self
    }

    /// Check that the configuration can drive the request line.
    pub fn validate(&self) -> Result<(), Error> {
        if self.bit_ticks == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// The three lines connecting the radio to the external arbiter.
pub struct Pins<REQ, TXD, RXD> {
    /// Output carrying the bit-banged priority and request messages.
    pub request: REQ,
    /// Input reporting whether transmit access is denied.
    pub tx_deny: TXD,
    /// Input reporting whether receive access is denied.
    pub rx_deny: RXD,
}

struct State<REQ, TXD, RXD, CLK> {
    pins: Pins<REQ, TXD, RXD>,
    clock: CLK,
    codec: BitBang,
    config: Config,
    enabled: bool,
    priority: PriorityFlags,
    rf_state: RfState,
    monitored: Direction,
    #[cfg(feature = "stats")]
    stats: Statistics,
}

impl<REQ, TXD, RXD, CLK> State<REQ, TXD, RXD, CLK>
where
    REQ: OutputPin,
    TXD: InputPin + EdgeInterrupt,
    RXD: InputPin + EdgeInterrupt,
    CLK: TickSource + Timestamp,
{
    fn count(&mut self, direction: Direction, counter: Counter) {
        #[cfg(feature = "stats")]
        self.stats.bump(direction, counter);
        #[cfg(not(feature = "stats"))]
        let _ = (direction, counter);
    }

    fn is_denied(&mut self, line: Direction) -> Result<bool, Error> {
        let level = self.config.deny_level;
        match line {
            Direction::Tx => is_denied(&mut self.pins.tx_deny, level),
            Direction::Rx => is_denied(&mut self.pins.rx_deny, level),
        }
    }

    fn set_interrupt(&mut self, line: Direction, enabled: bool) {
        match (line, enabled) {
            (Direction::Tx, true) => self.pins.tx_deny.enable_interrupt(),
            (Direction::Tx, false) => self.pins.tx_deny.disable_interrupt(),
            (Direction::Rx, true) => self.pins.rx_deny.enable_interrupt(),
            (Direction::Rx, false) => self.pins.rx_deny.disable_interrupt(),
        }
    }

    fn clear_pending(&mut self, line: Direction) {
        match line {
            Direction::Tx => self.pins.tx_deny.clear_pending(),
            Direction::Rx => self.pins.rx_deny.clear_pending(),
        }
    }

    fn send(&mut self, byte: u8) -> Result<(), Error> {
        self.codec
            .send(&mut self.pins.request, &mut self.clock, byte)
            .map_err(gpio_fault)
    }

    // Priority message, guard interval, request message.
    fn request_grant(&mut self, direction: Direction) -> Result<(), Error> {
        let priority = wire::priority_message(self.priority);
        let request = wire::request_message(direction);
        critical_section::with(|_| {
            self.send(priority)?;
            delay_us(&mut self.clock, self.config.prio_signal_time_us);
            self.send(request)
        })
    }

    fn release(&mut self) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        let line = self.monitored;
        self.set_interrupt(line, false);
        self.rf_state = RfState::Idle;
        self.count(line, Counter::Releases);
        self.send(wire::RELEASE_MESSAGE)
    }
}

/// Negotiates transceiver access with an external coexistence arbiter.
///
/// Requests are signalled on a single bit-banged output line. The arbiter answers on two deny
/// inputs, one per direction. While access is held, the edge interrupt of the matching deny line
/// is armed and its handler, [`Coexistence::on_deny_interrupt`], tells every protocol registered
/// for coexistence notifications when access is withdrawn (`Abort`) or regained (`Idle`).
///
/// Protocol registrations live in the shared [`Arbiter`] registry.
pub struct Coexistence<'a, REQ, TXD, RXD, CLK, M: RawMutex = CriticalSectionRawMutex> {
    arbiter: &'a Arbiter<'a, M>,
    inner: Mutex<M, RefCell<State<REQ, TXD, RXD, CLK>>>,
}

impl<'a, REQ, TXD, RXD, CLK, M> Coexistence<'a, REQ, TXD, RXD, CLK, M>
where
    REQ: OutputPin,
    TXD: InputPin + EdgeInterrupt,
    RXD: InputPin + EdgeInterrupt,
    CLK: TickSource + Timestamp,
    M: RawMutex,
{
    /// Initialize the coexistence interface.
    ///
    /// Drives the request line to its idle level, enables coexistence, initializes the clock,
    /// signals a release to the external arbiter and leaves both deny-line interrupts disarmed.
    pub fn new(
        arbiter: &'a Arbiter<'a, M>,
        mut pins: Pins<REQ, TXD, RXD>,
        clock: CLK,
        config: Config,
    ) -> Result<Self, Error> {
        config.validate()?;
        pins.request.set_high().map_err(gpio_fault)?;

        let this = Coexistence {
            arbiter,
            inner: Mutex::new(RefCell::new(State {
                pins,
                clock,
                codec: BitBang::new(config.bit_ticks),
                config,
                enabled: false,
                priority: config.default_priority,
                rf_state: RfState::Idle,
                monitored: Direction::Tx,
                #[cfg(feature = "stats")]
                stats: Statistics::new(),
            })),
        };

        this.enable();
        this.with_inner(|state| -> Result<(), Error> {
            state.clock.init();
            state.release()?;
            for line in [Direction::Tx, Direction::Rx] {
                state.set_interrupt(line, false);
                state.clear_pending(line);
            }
            Ok(())
        })?;

        debug!("coex: initialized, priority {:?}", config.default_priority);
        Ok(this)
    }

    fn with_inner<F: FnOnce(&mut State<REQ, TXD, RXD, CLK>) -> R, R>(&self, f: F) -> R {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            f(&mut inner)
        })
    }

    /// The arbiter holding the protocol registry.
    pub fn arbiter(&self) -> &'a Arbiter<'a, M> {
        self.arbiter
    }

    /// Register `protocol` for coexistence notifications.
    ///
    /// Shares the protocol's place in the priority chain with its arbitration registration.
    pub fn register(&self, protocol: ProtocolId, priority: u8, callback: &'a dyn Notify) -> Result<(), Error> {
        self.arbiter.register_coex(protocol, priority, callback)
    }

    /// Enable coexistence signalling.
    pub fn enable(&self) {
        self.with_inner(|state| state.enabled = true)
    }

    /// Release any held access and disable coexistence signalling.
    ///
    /// While disabled, every request is granted without signalling.
    pub fn disable(&self) -> Result<(), Error> {
        self.with_inner(|state| {
            let released = state.release();
            state.enabled = false;
            released
        })
    }

    /// Returns `true` if coexistence signalling is enabled.
    pub fn is_enabled(&self) -> bool {
        self.with_inner(|state| state.enabled)
    }

    /// Set whether `direction` is reported as high priority in future requests.
    pub fn set_priority(&self, direction: Direction, high: bool) {
        self.with_inner(|state| state.priority.set(direction, high))
    }

    /// Current priority flags.
    pub fn priority(&self) -> PriorityFlags {
        self.with_inner(|state| state.priority)
    }

    /// Ask the external arbiter for access in `direction`.
    ///
    /// A receive request without receive priority is granted immediately without signalling, as
    /// is every request while coexistence is disabled. Otherwise the priority and request
    /// messages are sent, and the deny line for `direction` is sampled once the sample window
    /// has passed. If it still denies access the request is released again and
    /// `Err(Error::Denied)` is returned; the caller decides whether to retry. A request line
    /// failure while signalling is followed by a release attempt and returned as `Error::Gpio`.
    pub fn request_access(&self, direction: Direction) -> Result<(), Error> {
        let started = self.inner.lock(|inner| -> Result<Option<u32>, Error> {
            let mut state = inner.borrow_mut();
            if direction == Direction::Rx && !state.priority.contains(Direction::Rx) {
                state.count(direction, Counter::ImmediateGrants);
                return Ok(None);
            }
            if !state.enabled {
                return Ok(None);
            }

            state.count(direction, Counter::Requests);
            let previous = state.monitored;
            if previous != direction {
                state.set_interrupt(previous, false);
                state.monitored = direction;
            }
            if let Err(e) = state.request_grant(direction) {
                // Best effort: leave the request line on a complete release frame.
                let _ = state.release();
                return Err(e);
            }
            Ok(Some(state.clock.timestamp()))
        })?;

        let Some(started) = started else {
            return Ok(());
        };

        while !self.with_inner(|state| state.clock.elapsed_us(started) >= state.config.sample_delay_us) {
            core::hint::spin_loop();
        }

        self.with_inner(|state| {
            if state.is_denied(direction)? {
                debug!("coex: {:?} access denied", direction);
                state.count(direction, Counter::Timeouts);
                state.release()?;
                return Err(Error::Denied);
            }

            trace!("coex: {:?} access granted", direction);
            state.set_interrupt(direction, true);
            state.rf_state = direction.into();
            state.count(direction, Counter::Grants);
            Ok(())
        })
    }

    /// Re-signal priority and request for a new direction within an access already held, for
    /// example a receive right after a transmit.
    ///
    /// The deny line is not sampled. Fails with `Err(Error::Denied)` when no access is held.
    pub fn change_access(&self, direction: Direction) -> Result<(), Error> {
        self.with_inner(|state| {
            if !state.enabled {
                return Ok(());
            }
            if state.rf_state == RfState::Idle {
                debug!("coex: no access held, cannot change to {:?}", direction);
                return Err(Error::Denied);
            }
            state.rf_state = direction.into();
            state.request_grant(direction)
        })
    }

    /// Give up the held access and signal the release to the external arbiter.
    pub fn release_access(&self) -> Result<(), Error> {
        self.with_inner(|state| state.release())
    }

    /// Sample both deny lines.
    pub fn deny_state(&self) -> Result<DenyState, Error> {
        self.with_inner(|state| {
            let tx = state.is_denied(Direction::Tx)?;
            let rx = state.is_denied(Direction::Rx)?;
            Ok(if tx || rx { DenyState::Denied } else { DenyState::Granted })
        })
    }

    /// Direction of the access currently held.
    pub fn rf_state(&self) -> RfState {
        self.with_inner(|state| state.rf_state)
    }

    /// Deny line watched by the edge interrupt.
    pub fn monitored_line(&self) -> Direction {
        self.with_inner(|state| state.monitored)
    }

    /// Deny-line interrupt handler body, shared by both lines.
    ///
    /// Call from the edge interrupt of `line`. If the line now denies access every registered
    /// coexistence sink gets `Abort`; otherwise they all get `Idle` in ascending priority order.
    /// Sink faults are reported after every sink has been notified.
    pub fn on_deny_interrupt(&self, line: Direction) -> Result<(), Error> {
        self.inner.lock(|inner| -> Result<(), Error> {
            let event = {
                let mut state = inner.borrow_mut();
                state.clear_pending(line);
                if !state.enabled {
                    return Ok(());
                }
                if state.is_denied(line)? {
                    state.count(line, Counter::Aborts);
                    Event::Abort
                } else {
                    Event::Idle
                }
            };

            debug!("coex: {:?} deny line changed, broadcasting {:?}", line, event);
            self.arbiter.broadcast_coex(event)
        })
    }

    /// Snapshot of the coexistence counters.
    #[cfg(feature = "stats")]
    pub fn statistics(&self) -> Statistics {
        self.with_inner(|state| state.stats)
    }

    /// Zero the coexistence counters.
    #[cfg(feature = "stats")]
    pub fn reset_statistics(&self) {
        self.with_inner(|state| state.stats = Statistics::new())
    }
}
