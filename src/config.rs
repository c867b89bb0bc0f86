//! Compile-time sizing and timing constants.
//!
//! These mirror the `#define`d constants in the original GPIB controller
//! firmware: conservative buffer sizes because everything here is static
//! storage, not heap allocation.

/// Maximum length of a parsed command line, including the leading `*` and
/// any argument. Used by the external parser to size its own line buffer;
/// [`MAX_WRITE_STRING_LENGTH`] is derived from it.
pub const MAX_COMMAND_LENGTH: usize = 32;

/// `*WRITE ` is the longest keyword prefix a command line can carry before
/// the payload; the write payload can be at most the command budget minus
/// that prefix.
const WRITE_PREFIX_LEN: usize = "*WRITE ".len();

/// Maximum number of bytes in a single WRITE payload.
pub const MAX_WRITE_STRING_LENGTH: usize = MAX_COMMAND_LENGTH - WRITE_PREFIX_LEN;

/// Maximum number of bytes latched by a single LISTEN transaction.
pub const MAX_RECEIVE_LENGTH: usize = 32;

/// Capacity of the send FIFO. Must be at least as large as the largest
/// number of bytes a single transaction can enqueue (the WRITE payload, the
/// addressing sequence is always drained before the payload starts).
pub const QUEUE_SIZE: usize = MAX_WRITE_STRING_LENGTH;

/// Inactivity timeout for a LISTEN transaction, in milliseconds.
pub const LISTEN_TIMEOUT_MS: u32 = 3000;

/// Minimum duration of the IFC pulse asserted during INIT, in milliseconds.
pub const IFC_PULSE_MS: u32 = 1;

/// Sentinel value for `last_talker`/`last_listener`, meaning "unknown" (no
/// addressing has been cached yet).
pub const UNKNOWN_ADDRESS: u8 = 0xFF;

/// Lowest valid primary GPIB address.
pub const MIN_ADDRESS: u8 = 1;

/// Highest valid primary GPIB address (0..30 inclusive is the full range;
/// INIT targets are restricted to 1..=30, address 0 is reserved for the
/// controller itself).
pub const MAX_ADDRESS: u8 = 30;
