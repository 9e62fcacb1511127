//! Interrupt masking for the shared arbitration state.
use core::sync::atomic::{compiler_fence, Ordering};

use cortex_m::peripheral::NVIC;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// A `RawMutex` that masks a single NVIC interrupt line while locked.
///
/// Use the number of the interrupt that serves the coexistence deny lines (usually the GPIO
/// interrupt). Mainline code holding the lock can then not be interrupted by the deny-line
/// handler, while higher priority radio interrupts keep running.
///
/// Locks nest: the line is only unmasked again by the outermost lock, and only if it was enabled
/// when that lock was taken.
pub struct IrqMaskRawMutex<const IRQ: u16>;

unsafe impl<const IRQ: u16> RawMutex for IrqMaskRawMutex<IRQ> {
    const INIT: Self = IrqMaskRawMutex;

    fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let index = usize::from(IRQ / 32);
        let mask = 1u32 << (IRQ % 32);
        unsafe {
            let nvic = &*NVIC::PTR;
            let was_enabled = nvic.iser[index].read() & mask != 0;
            nvic.icer[index].write(mask);
            compiler_fence(Ordering::SeqCst);
            let r = f();
            compiler_fence(Ordering::SeqCst);
            if was_enabled {
                nvic.iser[index].write(mask);
            }
            r
        }
    }
}
