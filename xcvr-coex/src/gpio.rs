//! GPIO collaborators of the coexistence engine.

use embedded_hal::digital::InputPin;

use crate::Error;

/// Control of the edge interrupt attached to a deny line.
///
/// The interrupt must be configured to fire on the grant to deny transition of the line, and its
/// handler must call [`Coexistence::on_deny_interrupt`](crate::Coexistence::on_deny_interrupt).
pub trait EdgeInterrupt {
    /// Let the line's edge interrupt fire.
    fn enable_interrupt(&mut self);

    /// Stop the line's edge interrupt from firing.
    fn disable_interrupt(&mut self);

    /// Clear a pending edge interrupt.
    fn clear_pending(&mut self);
}

/// Level at which a deny line reads as "access denied".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DenyLevel {
    /// High means denied.
    High,
    /// Low means denied.
    Low,
}

/// Combined state of the deny lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DenyState {
    /// Neither line denies access.
    Granted,
    /// At least one line denies access.
    Denied,
}

pub(crate) fn gpio_fault<E>(_: E) -> Error {
    warn!("coex: gpio fault");
    Error::Gpio
}

/// Returns `true` if `pin` currently reads as denied.
pub(crate) fn is_denied<P: InputPin>(pin: &mut P, level: DenyLevel) -> Result<bool, Error> {
    let high = pin.is_high().map_err(gpio_fault)?;
    Ok(high == (level == DenyLevel::High))
}
