//! Software serialization of single bytes onto the request line.
//!
//! A frame is ten bit periods long: a low start bit, the eight data bits LSB first, and a high
//! stop bit. Every period is timed against a [`TickSource`] and the whole frame is sent with
//! interrupts disabled.

use embedded_hal::digital::{OutputPin, PinState};

use crate::clock::TickSource;

/// Number of bit periods in one frame.
pub const FRAME_UNITS: usize = 10;

/// Bit-bang encoder for the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitBang {
    bit_ticks: u32,
}

impl BitBang {
    /// An encoder holding each bit for `bit_ticks` counter ticks.
    pub const fn new(bit_ticks: u32) -> Self {
        BitBang { bit_ticks }
    }

    /// Line levels of the frame carrying `byte`, `true` meaning high.
    pub const fn frame(byte: u8) -> [bool; FRAME_UNITS] {
        let mut levels = [false; FRAME_UNITS];
        let mut bit = 0;
        while bit < 8 {
            levels[1 + bit] = (byte >> bit) & 1 == 1;
            bit += 1;
        }
        levels[FRAME_UNITS - 1] = true;
        levels
    }

    /// Send `byte` on `pin`.
    pub fn send<P, T>(&self, pin: &mut P, ticks: &mut T, byte: u8) -> Result<(), P::Error>
    where
        P: OutputPin,
        T: TickSource,
    {
        let levels = Self::frame(byte);
        critical_section::with(|_| {
            for level in levels {
                let start = ticks.ticks();
                pin.set_state(PinState::from(level))?;
                while ticks.ticks_elapsed(start) < self.bit_ticks {
                    core::hint::spin_loop();
                }
            }
            Ok(())
        })
    }
}
