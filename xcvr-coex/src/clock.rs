//! Time sources used by the coexistence engine.

/// A free-running hardware counter used to time the bits of a bit-banged frame.
pub trait TickSource {
    /// Current counter value.
    fn ticks(&mut self) -> u32;

    /// Ticks elapsed since `start`, tolerant of counter wraparound.
    fn ticks_elapsed(&mut self, start: u32) -> u32 {
        self.ticks().wrapping_sub(start)
    }
}

/// A monotonic timestamp service with microsecond resolution.
pub trait Timestamp {
    /// Prepare the underlying counter. Called once when the coexistence engine is created.
    fn init(&mut self) {}

    /// An opaque timestamp of the current instant.
    fn timestamp(&mut self) -> u32;

    /// Microseconds elapsed since `since`, tolerant of counter wraparound.
    fn elapsed_us(&mut self, since: u32) -> u32;
}

/// Busy-wait for `us` microseconds.
pub(crate) fn delay_us<T: Timestamp>(clock: &mut T, us: u32) {
    let start = clock.timestamp();
    while clock.elapsed_us(start) < us {
        core::hint::spin_loop();
    }
}

/// Both time sources backed by the Cortex-M DWT cycle counter.
///
/// Requires an Armv7-M or Armv8-M mainline core.
#[cfg(feature = "dwt")]
pub struct DwtClock {
    cycles_per_us: u32,
}

#[cfg(feature = "dwt")]
impl DwtClock {
    /// Create a clock for a core running at `core_hz`.
    pub const fn new(core_hz: u32) -> Self {
        let cycles_per_us = core_hz / 1_000_000;
        DwtClock {
            cycles_per_us: if cycles_per_us == 0 { 1 } else { cycles_per_us },
        }
    }
}

#[cfg(feature = "dwt")]
impl TickSource for DwtClock {
    fn ticks(&mut self) -> u32 {
        cortex_m::peripheral::DWT::cycle_count()
    }
}

#[cfg(feature = "dwt")]
impl Timestamp for DwtClock {
    fn init(&mut self) {
        // Safety: only the trace enable and cycle counter enable bits are touched.
        let mut p = unsafe { cortex_m::Peripherals::steal() };
        p.DCB.enable_trace();
        cortex_m::peripheral::DWT::unlock();
        p.DWT.enable_cycle_counter();
    }

    fn timestamp(&mut self) -> u32 {
        cortex_m::peripheral::DWT::cycle_count()
    }

    fn elapsed_us(&mut self, since: u32) -> u32 {
        self.timestamp().wrapping_sub(since) / self.cycles_per_us
    }
}
