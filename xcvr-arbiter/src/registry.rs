//! The priority registry.
//!
//! Each protocol owns one fixed arena entry holding its priority, its two callback slots and the
//! index of the next protocol in the priority chain. The chain starts at `head` and is ordered by
//! non-decreasing priority value (a lower value is a higher priority).

use crate::{Notify, ProtocolId, Slot};

#[derive(Clone, Copy)]
struct Entry<'a> {
    priority: u8,
    next: Option<ProtocolId>,
    linked: bool,
    callback: Option<&'a dyn Notify>,
    coex_callback: Option<&'a dyn Notify>,
}

impl<'a> Entry<'a> {
    const EMPTY: Entry<'a> = Entry {
        priority: u8::MAX,
        next: None,
        linked: false,
        callback: None,
        coex_callback: None,
    };

    fn slot(&mut self, slot: Slot) -> &mut Option<&'a dyn Notify> {
        match slot {
            Slot::Arbitration => &mut self.callback,
            Slot::Coexistence => &mut self.coex_callback,
        }
    }
}

/// Priority-ordered table of registered protocols.
pub struct Registry<'a> {
    entries: [Entry<'a>; ProtocolId::COUNT],
    head: Option<ProtocolId>,
}

impl<'a> Default for Registry<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Registry<'a> {
    /// An empty registry.
    pub const fn new() -> Self {
        Registry {
            entries: [Entry::EMPTY; ProtocolId::COUNT],
            head: None,
        }
    }

    /// Store `callback` in `protocol`'s `slot`.
    ///
    /// If the slot was empty the callback is stored and, unless the other slot already linked the
    /// protocol, the protocol is spliced into the chain with `priority`. Returns `true` in that
    /// case, meaning the new sink is owed an `Init` notification.
    ///
    /// If the slot was already occupied only the callback is replaced and `false` is returned.
    pub fn attach(&mut self, protocol: ProtocolId, priority: u8, slot: Slot, callback: &'a dyn Notify) -> bool {
        let entry = &mut self.entries[protocol.index()];
        let cell = entry.slot(slot);
        let fresh = cell.is_none();
        *cell = Some(callback);

        if fresh && !entry.linked {
            entry.priority = priority;
            self.link(protocol);
        }
        fresh
    }

    // The new entry is only passed over entries it strictly outranks in value, so it lands in front
    // of any equal-priority entries registered before it.
    fn link(&mut self, protocol: ProtocolId) {
        let priority = self.entries[protocol.index()].priority;

        let mut prev: Option<ProtocolId> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if self.entries[current.index()].priority >= priority {
                break;
            }
            prev = Some(current);
            cursor = self.entries[current.index()].next;
        }

        let entry = &mut self.entries[protocol.index()];
        entry.next = cursor;
        entry.linked = true;
        match prev {
            Some(prev) => self.entries[prev.index()].next = Some(protocol),
            None => self.head = Some(protocol),
        }
    }

    /// First protocol in the chain.
    pub fn head(&self) -> Option<ProtocolId> {
        self.head
    }

    /// Protocol following `protocol` in the chain.
    pub fn next(&self, protocol: ProtocolId) -> Option<ProtocolId> {
        self.entries[protocol.index()].next
    }

    /// Priority of a linked protocol.
    pub fn priority(&self, protocol: ProtocolId) -> Option<u8> {
        let entry = &self.entries[protocol.index()];
        entry.linked.then_some(entry.priority)
    }

    /// Sink registered in `protocol`'s `slot`, if any.
    pub fn callback(&self, protocol: ProtocolId, slot: Slot) -> Option<&'a dyn Notify> {
        let entry = &self.entries[protocol.index()];
        match slot {
            Slot::Arbitration => entry.callback,
            Slot::Coexistence => entry.coex_callback,
        }
    }

    /// Walk the chain in ascending priority order.
    pub fn iter(&self) -> Iter<'_, 'a> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }
}

/// Iterator over the priority chain.
pub struct Iter<'r, 'a> {
    registry: &'r Registry<'a>,
    cursor: Option<ProtocolId>,
}

impl<'r, 'a> Iterator for Iter<'r, 'a> {
    type Item = ProtocolId;

    fn next(&mut self) -> Option<ProtocolId> {
        let current = self.cursor?;
        self.cursor = self.registry.next(current);
        Some(current)
    }
}
