//! Error taxonomy for the GPIB controller core.
//!
//! All errors here are reported synchronously to the caller, either from
//! [`enqueue_command`](crate::controller::Controller::enqueue_command) or
//! from [`step`](crate::controller::Controller::step). None of them unwind:
//! the FSM either rejects the request with state unchanged, drops a byte, or
//! self-recovers via a cleanup state transition. See module docs on
//! [`controller`](crate::controller) for which case applies where.

use core::fmt;

/// Errors that can occur while driving the GPIB controller core.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GpibError {
    /// An INIT address fell outside `1..=30`.
    InvalidAddress(u8),

    /// A WRITE was requested with no non-whitespace payload.
    EmptyPayload,

    /// A WRITE payload exceeded [`MAX_WRITE_STRING_LENGTH`](crate::config::MAX_WRITE_STRING_LENGTH).
    PayloadTooLong(usize),

    /// LISTEN was requested before any successful INIT.
    ListenBeforeInit,

    /// WRITE was requested before any successful INIT. The original
    /// firmware this crate is grounded on does not guard this case (it
    /// addresses whatever stale sentinel address is lying around); this
    /// crate rejects it instead. See `DESIGN.md`.
    WriteBeforeInit,

    /// A command was enqueued while the controller was not idle.
    NotIdle,

    /// The send FIFO was full; the byte that triggered this was dropped.
    FifoFull,

    /// A LISTEN transaction timed out waiting for a byte from the talker.
    /// The partial receive buffer is still surfaced as a result.
    ListenTimeout,
}

impl fmt::Display for GpibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpibError::InvalidAddress(addr) => {
                write!(f, "invalid GPIB address {addr} (must be 1..=30)")
            }
            GpibError::EmptyPayload => write!(f, "WRITE requires a non-empty payload"),
            GpibError::PayloadTooLong(len) => {
                write!(f, "WRITE payload of {len} bytes exceeds the maximum")
            }
            GpibError::ListenBeforeInit => write!(f, "must run INIT before LISTEN"),
            GpibError::WriteBeforeInit => write!(f, "must run INIT before WRITE"),
            GpibError::NotIdle => write!(f, "a transaction is already in progress"),
            GpibError::FifoFull => write!(f, "send queue is full, byte dropped"),
            GpibError::ListenTimeout => write!(f, "LISTEN timed out waiting for the talker"),
        }
    }
}
