//! Exclusive transceiver ownership between protocol stacks.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;

use crate::error::Outcome;
use crate::registry::Registry;
use crate::{Error, Event, Notify, ProtocolId, RetVal, Slot};

/// Arbiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Let a strictly higher priority protocol take the transceiver from its current owner
    /// without `force`.
    pub preemption: bool,
}

impl Config {
    /// Preemption enabled.
    pub const fn new() -> Self {
        Config { preemption: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared<'a> {
    registry: Registry<'a>,
    active: Option<ProtocolId>,
    lock_count: u32,
    preemption: bool,
}

impl<'a> Shared<'a> {
    fn arbitration_callback(&self, protocol: ProtocolId) -> Result<&'a dyn Notify, Error> {
        self.registry
            .callback(protocol, Slot::Arbitration)
            .ok_or(Error::InvalidParameter)
    }

    fn rank(&self, protocol: ProtocolId) -> u8 {
        self.registry.priority(protocol).unwrap_or(u8::MAX)
    }
}

enum Grant<'a> {
    Idle(&'a dyn Notify),
    Nested,
    Preempt {
        owner: ProtocolId,
        owner_callback: Option<&'a dyn Notify>,
        callback: &'a dyn Notify,
    },
}

/// Grants exclusive ownership of the transceiver to one protocol at a time.
///
/// All state lives behind a single blocking mutex. Every operation runs entirely inside that
/// mutex, so `M` decides which interrupts are masked during a transition. Notification sinks are
/// called without any internal borrow held and may re-enter the arbiter.
pub struct Arbiter<'a, M: RawMutex = CriticalSectionRawMutex> {
    inner: Mutex<M, RefCell<Shared<'a>>>,
}

impl<'a, M: RawMutex> Arbiter<'a, M> {
    /// Create an idle arbiter with an empty registry.
    pub const fn new(config: Config) -> Self {
        Arbiter {
            inner: Mutex::new(RefCell::new(Shared {
                registry: Registry::new(),
                active: None,
                lock_count: 0,
                preemption: config.preemption,
            })),
        }
    }

    fn with_inner<F: FnOnce(&mut Shared<'a>) -> R, R>(&self, f: F) -> R {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            f(&mut inner)
        })
    }

    /// Register `protocol`'s arbitration sink.
    ///
    /// The first registration of a slot splices the protocol into the priority chain and sends
    /// `Init` to the sink. Registering again only replaces the sink.
    pub fn register(&self, protocol: ProtocolId, priority: u8, callback: &'a dyn Notify) -> Result<(), Error> {
        self.attach(protocol, priority, Slot::Arbitration, callback)
    }

    /// Register `protocol`'s coexistence sink. Follows the same rules as [`Arbiter::register`].
    pub fn register_coex(&self, protocol: ProtocolId, priority: u8, callback: &'a dyn Notify) -> Result<(), Error> {
        self.attach(protocol, priority, Slot::Coexistence, callback)
    }

    fn attach(&self, protocol: ProtocolId, priority: u8, slot: Slot, callback: &'a dyn Notify) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let fresh = inner.borrow_mut().registry.attach(protocol, priority, slot, callback);
            if !fresh {
                trace!("xcvr: replaced {:?} sink of {:?}", slot, protocol);
                return Ok(());
            }
            debug!("xcvr: registered {:?} sink of {:?}", slot, protocol);
            callback.notify(Event::Init).to_result().inspect_err(|_| {
                warn!("xcvr: {:?} failed init", protocol);
            })
        })
    }

    /// Take ownership of the transceiver for `protocol`.
    ///
    /// Acquiring while already the owner nests; every nested acquire needs its own release.
    /// Another owner is displaced with an `Abort` when `force` is set, or when preemption is
    /// enabled and `protocol` has a strictly higher priority. A fault reported by the displaced
    /// owner is returned as `Err(Error::Callback)`, but the takeover still happens.
    pub fn acquire(&self, protocol: ProtocolId, force: bool) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let grant = {
                let mut state = inner.borrow_mut();
                let callback = state.arbitration_callback(protocol)?;
                let active = state.active;
                match active {
                    None => {
                        state.active = Some(protocol);
                        state.lock_count = 1;
                        Grant::Idle(callback)
                    }
                    Some(owner) if owner == protocol => {
                        state.lock_count += 1;
                        Grant::Nested
                    }
                    Some(owner) => {
                        let preempts = state.preemption && state.rank(protocol) < state.rank(owner);
                        if !(force || preempts) {
                            debug!("xcvr: {:?} denied, owned by {:?}", protocol, owner);
                            return Err(Error::Denied);
                        }
                        Grant::Preempt {
                            owner,
                            owner_callback: state.registry.callback(owner, Slot::Arbitration),
                            callback,
                        }
                    }
                }
            };

            match grant {
                Grant::Idle(callback) => {
                    trace!("xcvr: {:?} acquired", protocol);
                    activate(protocol, callback);
                    Ok(())
                }
                Grant::Nested => Ok(()),
                Grant::Preempt {
                    owner,
                    owner_callback,
                    callback,
                } => {
                    debug!("xcvr: {:?} preempts {:?}", protocol, owner);
                    let mut outcome = Outcome::new();
                    outcome.record(owner_callback.map_or(RetVal::SUCCESS, |cb| cb.notify(Event::Abort)));

                    // An owner releasing from its `Abort` sink lets the idle fan-out hand the
                    // transceiver to someone else, who is displaced in turn.
                    let mut displaced = owner;
                    loop {
                        let intruder = {
                            let mut state = inner.borrow_mut();
                            let active = state.active;
                            match active {
                                Some(current) if current == protocol => {
                                    trace!("xcvr: {:?} acquired during preemption", protocol);
                                    state.lock_count += 1;
                                    return outcome.into_result();
                                }
                                Some(current) if current != displaced => {
                                    Some((current, state.registry.callback(current, Slot::Arbitration)))
                                }
                                _ => None,
                            }
                        };
                        let Some((current, current_callback)) = intruder else {
                            break;
                        };
                        debug!("xcvr: {:?} took over during preemption, aborting", current);
                        outcome.record(current_callback.map_or(RetVal::SUCCESS, |cb| cb.notify(Event::Abort)));
                        displaced = current;
                    }

                    {
                        let mut state = inner.borrow_mut();
                        state.active = Some(protocol);
                        state.lock_count = 1;
                    }
                    activate(protocol, callback);
                    outcome.into_result()
                }
            }
        })
    }

    /// Give up one level of ownership.
    ///
    /// When the last level is released the owner gets `Release`, the transceiver becomes idle
    /// and every other registered protocol is offered it through `Idle`. Releasing while nobody
    /// owns the transceiver just repeats the idle fan-out. Releasing on behalf of a protocol that
    /// is not the owner is denied.
    pub fn release(&self, protocol: ProtocolId) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let released = {
                let mut state = inner.borrow_mut();
                let callback = state.arbitration_callback(protocol)?;
                let active = state.active;
                match active {
                    Some(owner) if owner == protocol => {
                        state.lock_count -= 1;
                        if state.lock_count > 0 {
                            return Ok(());
                        }
                        state.active = None;
                        Some(callback)
                    }
                    Some(owner) => {
                        debug!("xcvr: {:?} cannot release, owned by {:?}", protocol, owner);
                        return Err(Error::Denied);
                    }
                    None => None,
                }
            };

            if let Some(callback) = released {
                trace!("xcvr: {:?} released", protocol);
                let ret = callback.notify(Event::Release);
                if !ret.is_success() {
                    warn!("xcvr: {:?} release sink returned {:?}", protocol, ret);
                }
            }
            self.fan_out_idle(inner, Some(protocol))
        })
    }

    /// Unconditionally end the current ownership.
    ///
    /// The owner, if any, gets `Abort`; the arbiter is idle afterwards whatever the sink returns.
    pub fn abort(&self) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let owner = {
                let state = inner.borrow();
                state
                    .active
                    .map(|owner| (owner, state.registry.callback(owner, Slot::Arbitration)))
            };

            let ret = match owner {
                Some((owner, callback)) => {
                    debug!("xcvr: aborting {:?}", owner);
                    callback.map_or(RetVal::SUCCESS, |cb| cb.notify(Event::Abort))
                }
                None => RetVal::SUCCESS,
            };

            {
                let mut state = inner.borrow_mut();
                state.active = None;
                state.lock_count = 0;
            }
            ret.to_result()
        })
    }

    /// Offer the idle transceiver to every registered protocol except `excluded`, in ascending
    /// priority order.
    ///
    /// The walk stops as soon as any protocol owns the transceiver, which happens when an `Idle`
    /// sink acquires it. Faults are collected and reported once the walk is over.
    pub fn signal_idle(&self, excluded: Option<ProtocolId>) -> Result<(), Error> {
        self.inner.lock(|inner| self.fan_out_idle(inner, excluded))
    }

    fn fan_out_idle(&self, inner: &RefCell<Shared<'a>>, excluded: Option<ProtocolId>) -> Result<(), Error> {
        let mut outcome = Outcome::new();
        let mut cursor = inner.borrow().registry.head();

        while let Some(protocol) = cursor {
            let callback = {
                let state = inner.borrow();
                if let Some(owner) = state.active {
                    trace!("xcvr: idle fan-out stopped, {:?} took over", owner);
                    break;
                }
                state.registry.callback(protocol, Slot::Arbitration)
            };

            if Some(protocol) != excluded {
                if let Some(callback) = callback {
                    outcome.record(callback.notify(Event::Idle));
                }
            }
            cursor = inner.borrow().registry.next(protocol);
        }

        outcome.into_result()
    }

    /// Deliver `event` to every registered coexistence sink in ascending priority order.
    ///
    /// Unlike the idle fan-out this walk never stops early and does not look at the current
    /// owner. Every sink is notified even if an earlier one faulted.
    pub fn broadcast_coex(&self, event: Event) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let mut outcome = Outcome::new();
            let mut cursor = inner.borrow().registry.head();

            while let Some(protocol) = cursor {
                let callback = inner.borrow().registry.callback(protocol, Slot::Coexistence);
                if let Some(callback) = callback {
                    outcome.record(callback.notify(event));
                }
                cursor = inner.borrow().registry.next(protocol);
            }

            outcome.into_result()
        })
    }

    /// Shortest inactivity reported by the registered protocols other than `current`, in
    /// microseconds. `None` means no other protocol is registered, so the time is unbounded.
    pub fn inactivity_duration(&self, current: ProtocolId) -> Option<u32> {
        self.inner.lock(|inner| {
            let mut shortest: Option<u32> = None;
            let mut cursor = inner.borrow().registry.head();

            while let Some(protocol) = cursor {
                let callback = inner.borrow().registry.callback(protocol, Slot::Arbitration);
                if protocol != current {
                    if let Some(callback) = callback {
                        let us = callback.notify(Event::GetInactivityDuration).duration_us();
                        shortest = Some(shortest.map_or(us, |s| s.min(us)));
                    }
                }
                cursor = inner.borrow().registry.next(protocol);
            }

            shortest
        })
    }

    /// Current owner of the transceiver.
    pub fn active_protocol(&self) -> Option<ProtocolId> {
        self.with_inner(|state| state.active)
    }

    /// Acquire depth of the current owner; zero when idle.
    pub fn lock_count(&self) -> u32 {
        self.with_inner(|state| state.lock_count)
    }

    /// Registered priority of `protocol`.
    pub fn priority(&self, protocol: ProtocolId) -> Option<u8> {
        self.with_inner(|state| state.registry.priority(protocol))
    }

    /// Snapshot of the priority chain, highest priority first.
    pub fn priority_order(&self) -> [Option<ProtocolId>; ProtocolId::COUNT] {
        self.with_inner(|state| {
            let mut order = [None; ProtocolId::COUNT];
            for (slot, protocol) in order.iter_mut().zip(state.registry.iter()) {
                *slot = Some(protocol);
            }
            order
        })
    }

    /// Enable or disable priority preemption.
    pub fn set_preemption(&self, enabled: bool) {
        self.with_inner(|state| state.preemption = enabled)
    }

    /// Returns `true` if priority preemption is enabled.
    pub fn preemption(&self) -> bool {
        self.with_inner(|state| state.preemption)
    }
}

fn activate(protocol: ProtocolId, callback: &dyn Notify) {
    let ret = callback.notify(Event::Active);
    if !ret.is_success() {
        warn!("xcvr: {:?} active sink returned {:?}", protocol, ret);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::OnceLock;
    use std::vec::Vec;

    use super::*;

    /// Records every notification together with the protocol it was sent to.
    struct Journal(StdMutex<Vec<(ProtocolId, Event)>>);

    impl Journal {
        fn new() -> &'static Journal {
            Box::leak(Box::new(Journal(StdMutex::new(Vec::new()))))
        }

        fn push(&self, protocol: ProtocolId, event: Event) {
            self.0.lock().unwrap().push((protocol, event));
        }

        fn take(&self) -> Vec<(ProtocolId, Event)> {
            core::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct Stack {
        id: ProtocolId,
        journal: &'static Journal,
        ret: RetVal,
        inactivity_us: u32,
    }

    impl Notify for Stack {
        fn notify(&self, event: Event) -> RetVal {
            self.journal.push(self.id, event);
            match event {
                Event::GetInactivityDuration => RetVal::from_duration_us(self.inactivity_us),
                Event::Init | Event::Active => RetVal::SUCCESS,
                _ => self.ret,
            }
        }
    }

    fn stack(id: ProtocolId, journal: &'static Journal) -> &'static Stack {
        Box::leak(Box::new(Stack {
            id,
            journal,
            ret: RetVal::SUCCESS,
            inactivity_us: 0,
        }))
    }

    fn arbiter(preemption: bool) -> &'static Arbiter<'static> {
        Box::leak(Box::new(Arbiter::new(Config { preemption })))
    }

    #[test]
    fn register_sends_init_once() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        let ble = stack(ProtocolId::Ble, journal);

        arbiter.register(ProtocolId::Ble, 1, ble).unwrap();
        arbiter.register(ProtocolId::Ble, 1, ble).unwrap();
        assert_eq!(journal.take(), [(ProtocolId::Ble, Event::Init)]);
    }

    #[test]
    fn acquire_requires_registration() {
        let arbiter = arbiter(true);
        assert_eq!(arbiter.acquire(ProtocolId::Ant, false), Err(Error::InvalidParameter));
        assert_eq!(arbiter.release(ProtocolId::Ant), Err(Error::InvalidParameter));
        assert_eq!(arbiter.active_protocol(), None);
    }

    #[test]
    fn nested_acquire_needs_matching_releases() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::GenFsk, 3, stack(ProtocolId::GenFsk, journal)).unwrap();
        journal.take();

        for depth in 1..=3 {
            arbiter.acquire(ProtocolId::GenFsk, false).unwrap();
            assert_eq!(arbiter.lock_count(), depth);
        }
        for depth in (0..3).rev() {
            arbiter.release(ProtocolId::GenFsk).unwrap();
            assert_eq!(arbiter.lock_count(), depth);
            assert_eq!(arbiter.active_protocol().is_some(), depth > 0);
        }
        assert_eq!(
            journal.take(),
            [(ProtocolId::GenFsk, Event::Active), (ProtocolId::GenFsk, Event::Release)]
        );
    }

    #[test]
    fn higher_priority_preempts() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.register(ProtocolId::Ieee802154, 2, stack(ProtocolId::Ieee802154, journal)).unwrap();
        assert_eq!(
            arbiter.priority_order(),
            [Some(ProtocolId::Ble), Some(ProtocolId::Ieee802154), None, None]
        );
        journal.take();

        arbiter.acquire(ProtocolId::Ieee802154, false).unwrap();
        arbiter.acquire(ProtocolId::Ble, false).unwrap();

        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ble));
        assert_eq!(arbiter.lock_count(), 1);
        assert_eq!(
            journal.take(),
            [
                (ProtocolId::Ieee802154, Event::Active),
                (ProtocolId::Ieee802154, Event::Abort),
                (ProtocolId::Ble, Event::Active),
            ]
        );
    }

    #[test]
    fn lower_priority_is_denied() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.register(ProtocolId::Ant, 2, stack(ProtocolId::Ant, journal)).unwrap();

        arbiter.acquire(ProtocolId::Ble, false).unwrap();
        assert_eq!(arbiter.acquire(ProtocolId::Ant, false), Err(Error::Denied));
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ble));
    }

    #[test]
    fn preemption_disabled_denies_without_force() {
        let journal = Journal::new();
        let arbiter = arbiter(false);
        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.register(ProtocolId::Ieee802154, 2, stack(ProtocolId::Ieee802154, journal)).unwrap();

        arbiter.acquire(ProtocolId::Ieee802154, false).unwrap();
        arbiter.acquire(ProtocolId::Ieee802154, false).unwrap();
        journal.take();

        assert_eq!(arbiter.acquire(ProtocolId::Ble, false), Err(Error::Denied));
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ieee802154));
        assert_eq!(arbiter.lock_count(), 2);
        assert!(journal.take().is_empty());

        // `force` overrides everything, even a lower priority requester.
        arbiter.set_preemption(true);
        arbiter.acquire(ProtocolId::Ble, false).unwrap();
        arbiter.register(ProtocolId::Ant, 9, stack(ProtocolId::Ant, journal)).unwrap();
        arbiter.acquire(ProtocolId::Ant, true).unwrap();
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ant));
    }

    #[test]
    fn abort_fault_is_reported_but_takeover_happens() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        let stubborn = Box::leak(Box::new(Stack {
            id: ProtocolId::GenFsk,
            journal,
            ret: RetVal::FAULT,
            inactivity_us: 0,
        }));
        arbiter.register(ProtocolId::GenFsk, 5, stubborn).unwrap();
        arbiter.register(ProtocolId::Ble, 0, stack(ProtocolId::Ble, journal)).unwrap();

        arbiter.acquire(ProtocolId::GenFsk, false).unwrap();
        assert_eq!(arbiter.acquire(ProtocolId::Ble, false), Err(Error::Callback));
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ble));
    }

    #[test]
    fn release_by_non_owner_is_denied() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.register(ProtocolId::Ant, 2, stack(ProtocolId::Ant, journal)).unwrap();

        arbiter.acquire(ProtocolId::Ble, false).unwrap();
        assert_eq!(arbiter.release(ProtocolId::Ant), Err(Error::Denied));
        assert_eq!(arbiter.lock_count(), 1);
    }

    #[test]
    fn release_fans_out_idle_to_others() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::Ant, 4, stack(ProtocolId::Ant, journal)).unwrap();
        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.register(ProtocolId::GenFsk, 2, stack(ProtocolId::GenFsk, journal)).unwrap();
        arbiter.acquire(ProtocolId::GenFsk, false).unwrap();
        journal.take();

        arbiter.release(ProtocolId::GenFsk).unwrap();
        assert_eq!(
            journal.take(),
            [
                (ProtocolId::GenFsk, Event::Release),
                (ProtocolId::Ble, Event::Idle),
                (ProtocolId::Ant, Event::Idle),
            ]
        );

        // Releasing again while idle repeats the fan-out.
        arbiter.release(ProtocolId::GenFsk).unwrap();
        assert_eq!(
            journal.take(),
            [(ProtocolId::Ble, Event::Idle), (ProtocolId::Ant, Event::Idle)]
        );
    }

    /// Grabs the transceiver as soon as it hears it is idle.
    struct Greedy {
        id: ProtocolId,
        journal: &'static Journal,
        arbiter: OnceLock<&'static Arbiter<'static>>,
    }

    impl Notify for Greedy {
        fn notify(&self, event: Event) -> RetVal {
            self.journal.push(self.id, event);
            if event == Event::Idle {
                let arbiter = self.arbiter.get().unwrap();
                return RetVal::from(arbiter.acquire(self.id, false).is_ok());
            }
            RetVal::SUCCESS
        }
    }

    #[test]
    fn idle_fan_out_stops_on_new_owner() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        let greedy = Box::leak(Box::new(Greedy {
            id: ProtocolId::Ieee802154,
            journal,
            arbiter: OnceLock::new(),
        }));
        greedy.arbiter.set(arbiter).ok().unwrap();

        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.register(ProtocolId::Ieee802154, 2, greedy).unwrap();
        arbiter.register(ProtocolId::Ant, 3, stack(ProtocolId::Ant, journal)).unwrap();
        arbiter.acquire(ProtocolId::Ble, false).unwrap();
        journal.take();

        arbiter.release(ProtocolId::Ble).unwrap();
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ieee802154));
        assert_eq!(
            journal.take(),
            [
                (ProtocolId::Ble, Event::Release),
                (ProtocolId::Ieee802154, Event::Idle),
                (ProtocolId::Ieee802154, Event::Active),
            ]
        );
    }

    /// Gives the transceiver back from inside its `Abort` sink.
    struct Yielding {
        id: ProtocolId,
        journal: &'static Journal,
        arbiter: OnceLock<&'static Arbiter<'static>>,
    }

    impl Notify for Yielding {
        fn notify(&self, event: Event) -> RetVal {
            self.journal.push(self.id, event);
            if event == Event::Abort {
                let arbiter = self.arbiter.get().unwrap();
                return RetVal::from(arbiter.release(self.id).is_ok());
            }
            RetVal::SUCCESS
        }
    }

    fn greedy(id: ProtocolId, journal: &'static Journal, arbiter: &'static Arbiter<'static>) -> &'static Greedy {
        let greedy = Box::leak(Box::new(Greedy {
            id,
            journal,
            arbiter: OnceLock::new(),
        }));
        greedy.arbiter.set(arbiter).ok().unwrap();
        greedy
    }

    fn yielding(id: ProtocolId, journal: &'static Journal, arbiter: &'static Arbiter<'static>) -> &'static Yielding {
        let yielding = Box::leak(Box::new(Yielding {
            id,
            journal,
            arbiter: OnceLock::new(),
        }));
        yielding.arbiter.set(arbiter).ok().unwrap();
        yielding
    }

    #[test]
    fn preemption_aborts_owner_that_slipped_in() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::Ant, 3, yielding(ProtocolId::Ant, journal, arbiter)).unwrap();
        arbiter.register(ProtocolId::GenFsk, 2, greedy(ProtocolId::GenFsk, journal, arbiter)).unwrap();
        arbiter.register(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        arbiter.acquire(ProtocolId::Ant, false).unwrap();
        journal.take();

        assert_eq!(arbiter.acquire(ProtocolId::Ble, false), Ok(()));
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ble));
        assert_eq!(arbiter.lock_count(), 1);
        assert_eq!(
            journal.take(),
            [
                (ProtocolId::Ant, Event::Abort),
                (ProtocolId::Ant, Event::Release),
                (ProtocolId::Ble, Event::Idle),
                (ProtocolId::GenFsk, Event::Idle),
                (ProtocolId::GenFsk, Event::Active),
                (ProtocolId::GenFsk, Event::Abort),
                (ProtocolId::Ble, Event::Active),
            ]
        );
    }

    #[test]
    fn preempter_acquiring_from_idle_is_not_activated_twice() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register(ProtocolId::Ant, 3, yielding(ProtocolId::Ant, journal, arbiter)).unwrap();
        arbiter.register(ProtocolId::Ble, 1, greedy(ProtocolId::Ble, journal, arbiter)).unwrap();
        arbiter.acquire(ProtocolId::Ant, false).unwrap();
        journal.take();

        assert_eq!(arbiter.acquire(ProtocolId::Ble, false), Ok(()));
        assert_eq!(arbiter.active_protocol(), Some(ProtocolId::Ble));
        // One level for the sink's own acquire, one for the preempting call.
        assert_eq!(arbiter.lock_count(), 2);
        assert_eq!(
            journal.take(),
            [
                (ProtocolId::Ant, Event::Abort),
                (ProtocolId::Ant, Event::Release),
                (ProtocolId::Ble, Event::Idle),
                (ProtocolId::Ble, Event::Active),
            ]
        );
    }

    #[test]
    fn idle_faults_do_not_stop_the_walk() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        let faulty = Box::leak(Box::new(Stack {
            id: ProtocolId::Ble,
            journal,
            ret: RetVal::FAULT,
            inactivity_us: 0,
        }));
        arbiter.register(ProtocolId::Ble, 1, faulty).unwrap();
        arbiter.register(ProtocolId::Ant, 2, stack(ProtocolId::Ant, journal)).unwrap();
        journal.take();

        assert_eq!(arbiter.signal_idle(None), Err(Error::Callback));
        assert_eq!(
            journal.take(),
            [(ProtocolId::Ble, Event::Idle), (ProtocolId::Ant, Event::Idle)]
        );
    }

    #[test]
    fn abort_resets_unconditionally() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        let faulty = Box::leak(Box::new(Stack {
            id: ProtocolId::Ant,
            journal,
            ret: RetVal::FAULT,
            inactivity_us: 0,
        }));
        arbiter.register(ProtocolId::Ant, 1, faulty).unwrap();
        arbiter.acquire(ProtocolId::Ant, false).unwrap();
        arbiter.acquire(ProtocolId::Ant, false).unwrap();

        assert_eq!(arbiter.abort(), Err(Error::Callback));
        assert_eq!(arbiter.active_protocol(), None);
        assert_eq!(arbiter.lock_count(), 0);
        assert_eq!(arbiter.abort(), Ok(()));
    }

    #[test]
    fn inactivity_is_minimum_of_others() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        let with_inactivity = |id, inactivity_us| {
            &*Box::leak(Box::new(Stack {
                id,
                journal,
                ret: RetVal::SUCCESS,
                inactivity_us,
            }))
        };
        arbiter.register(ProtocolId::Ble, 1, with_inactivity(ProtocolId::Ble, 100)).unwrap();
        assert_eq!(arbiter.inactivity_duration(ProtocolId::Ble), None);

        arbiter.register(ProtocolId::GenFsk, 2, with_inactivity(ProtocolId::GenFsk, 750)).unwrap();
        arbiter.register(ProtocolId::Ant, 3, with_inactivity(ProtocolId::Ant, 420)).unwrap();
        assert_eq!(arbiter.inactivity_duration(ProtocolId::Ble), Some(420));
        assert_eq!(arbiter.inactivity_duration(ProtocolId::Ant), Some(100));
    }

    #[test]
    fn coex_broadcast_reaches_every_coex_sink() {
        let journal = Journal::new();
        let arbiter = arbiter(true);
        arbiter.register_coex(ProtocolId::Ant, 2, stack(ProtocolId::Ant, journal)).unwrap();
        arbiter.register_coex(ProtocolId::Ble, 1, stack(ProtocolId::Ble, journal)).unwrap();
        // Arbitration-only protocols are not coexistence sinks.
        arbiter.register(ProtocolId::GenFsk, 0, stack(ProtocolId::GenFsk, journal)).unwrap();
        arbiter.acquire(ProtocolId::GenFsk, false).unwrap();
        journal.take();

        arbiter.broadcast_coex(Event::Idle).unwrap();
        assert_eq!(
            journal.take(),
            [(ProtocolId::Ble, Event::Idle), (ProtocolId::Ant, Event::Idle)]
        );
    }

    #[test]
    fn arbiter_is_sync_with_irq_mask() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<Arbiter<'static>>();
        assert_sync::<Arbiter<'static, crate::IrqMaskRawMutex<6>>>();
    }
}
