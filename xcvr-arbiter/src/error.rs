//! Error types for the arbitration crates.

/// The status or duration word returned from a notification sink.
///
/// For `Init`, `Active`, `Abort`, `Idle` and `Release` the word is a success flag: zero is
/// success and anything else is a fault. For `GetInactivityDuration` the word is a duration in
/// microseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RetVal(u32);

impl RetVal {
    /// A successful return value.
    pub const SUCCESS: RetVal = RetVal(0);

    /// A generic fault reported by a sink.
    pub const FAULT: RetVal = RetVal(1);

    /// Create a new `RetVal` from an integer.
    pub const fn new(n: u32) -> Self {
        RetVal(n)
    }

    /// Create a `RetVal` carrying an inactivity duration.
    pub const fn from_duration_us(us: u32) -> Self {
        RetVal(us)
    }

    /// Returns `true` when the word reads as a success flag.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Interpret the word as a duration in microseconds.
    pub const fn duration_us(self) -> u32 {
        self.0
    }

    /// Convert the `RetVal` to a `Result`.
    ///
    /// Zero is returned as `Ok(())`; anything else is a sink fault, returned as
    /// `Err(Error::Callback)`.
    pub const fn to_result(self) -> Result<(), Error> {
        if self.0 == 0 {
            Ok(())
        } else {
            Err(Error::Callback)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RetVal {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "RetVal({=u32})", self.0)
    }
}

impl core::fmt::Debug for RetVal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RetVal({})", self.0)
    }
}

impl From<u32> for RetVal {
    fn from(value: u32) -> Self {
        RetVal(value)
    }
}

impl From<RetVal> for u32 {
    fn from(value: RetVal) -> Self {
        value.0
    }
}

impl From<bool> for RetVal {
    /// `true` maps to success.
    fn from(ok: bool) -> Self {
        if ok {
            RetVal::SUCCESS
        } else {
            RetVal::FAULT
        }
    }
}

/// An error returned from an arbitration or coexistence operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The transceiver is not available under the current priority and force rules, or the
    /// external arbiter did not grant access before the sample window elapsed.
    Denied,
    /// Unknown or unregistered protocol, or a malformed configuration.
    InvalidParameter,
    /// A notification sink reported failure. The state transition still took place.
    Callback,
    /// A GPIO collaborator failed to drive or sample a line.
    Gpio,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Denied => f.write_str("access denied"),
            Error::InvalidParameter => f.write_str("invalid parameter"),
            Error::Callback => f.write_str("notification sink reported a fault"),
            Error::Gpio => f.write_str("gpio failure"),
        }
    }
}

impl core::error::Error for Error {}

/// Records the first fault seen during a broadcast without stopping it.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Outcome {
    faulted: bool,
}

impl Outcome {
    pub(crate) const fn new() -> Self {
        Outcome { faulted: false }
    }

    pub(crate) fn record(&mut self, ret: RetVal) {
        self.faulted |= !ret.is_success();
    }

    pub(crate) fn into_result(self) -> Result<(), Error> {
        if self.faulted {
            Err(Error::Callback)
        } else {
            Ok(())
        }
    }
}
