#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;
use std::sync::Mutex;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use xcvr_coex::arbiter::{self, Arbiter};
use xcvr_coex::{
    BitBang, Coexistence, Config, EdgeInterrupt, Error, Event, Notify, Pins, ProtocolId, RetVal, TickSource, Timestamp,
    FRAME_UNITS,
};

pub type Coex = Coexistence<'static, RequestPin, DenyPin, DenyPin, Clock>;

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// One tick and one microsecond per read.
#[derive(Clone, Default)]
pub struct Clock {
    now: Rc<Cell<u32>>,
    pub initialized: Rc<Cell<bool>>,
}

impl Clock {
    fn read(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }
}

impl TickSource for Clock {
    fn ticks(&mut self) -> u32 {
        self.read()
    }
}

impl Timestamp for Clock {
    fn init(&mut self) {
        self.initialized.set(true);
    }

    fn timestamp(&mut self) -> u32 {
        self.read()
    }

    fn elapsed_us(&mut self, since: u32) -> u32 {
        self.read().wrapping_sub(since)
    }
}

/// Every level driven onto the request line.
#[derive(Clone, Default)]
pub struct Line {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl Line {
    pub fn level(&self) -> Option<bool> {
        self.levels.borrow().last().copied()
    }

    /// Decode and drain the frames sent so far.
    pub fn take_bytes(&self) -> Vec<u8> {
        let levels = std::mem::take(&mut *self.levels.borrow_mut());
        let mut bytes = Vec::new();
        let mut i = 0;
        while i < levels.len() {
            if levels[i] {
                // Idle level between frames.
                i += 1;
                continue;
            }
            let frame = &levels[i..i + FRAME_UNITS];
            assert!(frame[FRAME_UNITS - 1], "missing stop bit");
            let byte = (0..8).fold(0u8, |byte, bit| byte | (u8::from(frame[1 + bit]) << bit));
            assert_eq!(frame, BitBang::frame(byte));
            bytes.push(byte);
            i += FRAME_UNITS;
        }
        bytes
    }
}

pub struct RequestPin(pub Line);

impl ErrorType for RequestPin {
    type Error = Infallible;
}

impl OutputPin for RequestPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.levels.borrow_mut().push(true);
        Ok(())
    }
}

/// Shared view of a deny input and its edge interrupt.
#[derive(Clone, Default)]
pub struct Deny {
    high: Rc<Cell<bool>>,
    irq: Rc<Cell<bool>>,
    cleared: Rc<Cell<u32>>,
}

impl Deny {
    pub fn set_high(&self, high: bool) {
        self.high.set(high);
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq.get()
    }

    pub fn cleared(&self) -> u32 {
        self.cleared.get()
    }
}

pub struct DenyPin(pub Deny);

impl ErrorType for DenyPin {
    type Error = Infallible;
}

impl InputPin for DenyPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.high.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.high.get())
    }
}

impl EdgeInterrupt for DenyPin {
    fn enable_interrupt(&mut self) {
        self.0.irq.set(true);
    }

    fn disable_interrupt(&mut self) {
        self.0.irq.set(false);
    }

    fn clear_pending(&mut self) {
        self.0.cleared.set(self.0.cleared.get() + 1);
    }
}

/// Notifications seen by the sinks it hands out.
#[derive(Default)]
pub struct Journal(Mutex<Vec<(ProtocolId, Event)>>);

impl Journal {
    pub fn sink(&'static self, protocol: ProtocolId, ret: RetVal) -> &'static dyn Notify {
        leak(move |event: Event| {
            self.0.lock().unwrap().push((protocol, event));
            ret
        })
    }

    pub fn take(&self) -> Vec<(ProtocolId, Event)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub struct Bench {
    pub arbiter: &'static Arbiter<'static>,
    pub coex: Coex,
    pub line: Line,
    pub tx: Deny,
    pub rx: Deny,
    pub clock: Clock,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_config(Config::new()).unwrap()
    }

    pub fn with_config(config: Config) -> Result<Self, Error> {
        let arbiter: &'static Arbiter<'static> = leak(Arbiter::new(arbiter::Config::new()));
        let line = Line::default();
        let tx = Deny::default();
        let rx = Deny::default();
        let clock = Clock::default();

        let pins = Pins {
            request: RequestPin(line.clone()),
            tx_deny: DenyPin(tx.clone()),
            rx_deny: DenyPin(rx.clone()),
        };
        let coex = Coexistence::new(arbiter, pins, clock.clone(), config)?;

        Ok(Bench {
            arbiter,
            coex,
            line,
            tx,
            rx,
            clock,
        })
    }

    /// A bench past initialization with nothing recorded yet.
    pub fn settled() -> Self {
        let bench = Self::new();
        bench.line.take_bytes();
        #[cfg(feature = "stats")]
        bench.coex.reset_statistics();
        bench
    }
}
