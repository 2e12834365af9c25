use std::time::Duration;

/// Readiness a descriptor is interested in.
///
/// Error and hang-up conditions are always reported by the wait
/// primitive and need not be requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    /// Interested in incoming data only.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    /// Interested in both incoming data and write capacity.
    ///
    /// Meant for sources with output pending: a writable socket makes every
    /// wait return immediately.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };
}

impl Default for Interest {
    fn default() -> Self {
        Self::READABLE
    }
}

/// Readiness decoded from one entry of the wait primitive's result array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    pub(crate) hangup: bool,
    pub(crate) errored: bool,
}

impl Readiness {
    pub(crate) fn is_empty(&self) -> bool {
        !(self.readable || self.writable || self.hangup || self.errored)
    }
}

/// Converts a wait bound into the millisecond argument of `poll(2)` /
/// `WSAPoll`, rounding up so a sub-millisecond bound never turns into a
/// non-blocking poll.
pub(crate) fn timeout_millis(timeout: Duration) -> i32 {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(i32::MAX as u128) as i32
}
