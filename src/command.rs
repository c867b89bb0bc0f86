//! The parsed command surface drained by [`Controller::step`](crate::controller::Controller::step).
//!
//! The text parser that turns a serial line like `*INIT 22` into one of
//! these variants lives outside this crate (see the crate-level docs); this
//! module only defines the already-parsed shape and the validation every
//! command goes through before it is allowed to arm a transaction.

use crate::config::{MAX_ADDRESS, MAX_WRITE_STRING_LENGTH, MIN_ADDRESS};
use crate::error::GpibError;

/// A single-shot GPIB transaction request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Address the bus as System Controller and target instrument `addr`
    /// (`1..=30`) for subsequent WRITE/LISTEN.
    Init(u8),
    /// Send `text` to the most recently INIT'd instrument.
    Write(&'a str),
    /// Receive a response from the most recently INIT'd instrument.
    Listen,
}

impl<'a> Command<'a> {
    /// Validates this command against the current controller state,
    /// returning the trimmed write payload for [`Command::Write`] so the
    /// caller doesn't have to trim twice.
    ///
    /// `has_valid_target` is `true` once at least one INIT has completed
    /// successfully; LISTEN is rejected without it.
    pub(crate) fn validate(&self, has_valid_target: bool) -> Result<(), GpibError> {
        match *self {
            Command::Init(addr) => {
                if (MIN_ADDRESS..=MAX_ADDRESS).contains(&addr) {
                    Ok(())
                } else {
                    Err(GpibError::InvalidAddress(addr))
                }
            }
            Command::Write(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Err(GpibError::EmptyPayload)
                } else if trimmed.len() > MAX_WRITE_STRING_LENGTH {
                    Err(GpibError::PayloadTooLong(trimmed.len()))
                } else if !has_valid_target {
                    Err(GpibError::WriteBeforeInit)
                } else {
                    Ok(())
                }
            }
            Command::Listen => {
                if has_valid_target {
                    Ok(())
                } else {
                    Err(GpibError::ListenBeforeInit)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_rejects_out_of_range_address() {
        assert_eq!(
            Command::Init(0).validate(false),
            Err(GpibError::InvalidAddress(0))
        );
        assert_eq!(
            Command::Init(31).validate(false),
            Err(GpibError::InvalidAddress(31))
        );
        assert_eq!(Command::Init(22).validate(false), Ok(()));
    }

    #[test]
    fn write_rejects_empty_or_whitespace_only_payload() {
        assert_eq!(Command::Write("").validate(true), Err(GpibError::EmptyPayload));
        assert_eq!(
            Command::Write("   ").validate(true),
            Err(GpibError::EmptyPayload)
        );
        assert_eq!(Command::Write("X").validate(true), Ok(()));
    }

    #[test]
    fn write_rejects_payload_too_long() {
        let long = "X".repeat(MAX_WRITE_STRING_LENGTH + 1);
        assert!(matches!(
            Command::Write(&long).validate(true),
            Err(GpibError::PayloadTooLong(_))
        ));
    }

    #[test]
    fn write_requires_prior_init() {
        assert_eq!(
            Command::Write("X").validate(false),
            Err(GpibError::WriteBeforeInit)
        );
    }

    #[test]
    fn listen_requires_prior_init() {
        assert_eq!(Command::Listen.validate(false), Err(GpibError::ListenBeforeInit));
        assert_eq!(Command::Listen.validate(true), Ok(()));
    }
}
