//! The byte-level sender FSM ("Talker").
//!
//! Transmits one byte at a time from the [`SendFifo`] onto the DIO lines,
//! observing NRFD/NDAC from listeners. The Talker never touches ATN, EOI,
//! IFC, or REN — management lines are the [`Controller`](crate::controller::Controller)'s
//! responsibility — and it never times out: the strict interlock is what
//! makes GPIB work with arbitrarily slow listeners.

use crate::bus::{BusSnapshot, GpibPins, Line};
use crate::fifo::{QueuedByte, SendFifo};

/// The state of the Talker FSM. The byte currently being handshaken is
/// carried by the three non-idle variants, so it can never be read while
/// stale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TalkerState {
    /// No byte in flight.
    Idle,
    /// Byte is on DIO; waiting for a listener to assert NDAC.
    WaitNdacAsserted {
        /// The byte being handshaken.
        byte: QueuedByte,
    },
    /// NDAC seen asserted; waiting for NRFD to release before asserting DAV.
    WaitNrfdReleased {
        /// The byte being handshaken.
        byte: QueuedByte,
    },
    /// DAV asserted; waiting for the listener to release NDAC before
    /// releasing DAV and returning to idle.
    WaitNdacReleased {
        /// The byte being handshaken.
        byte: QueuedByte,
    },
}

/// The byte-level sender FSM. See module docs for the handshake it drives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Talker {
    state: TalkerState,
}

impl Default for Talker {
    fn default() -> Self {
        Self::new()
    }
}

impl Talker {
    /// Creates a new, idle Talker.
    pub const fn new() -> Self {
        Self {
            state: TalkerState::Idle,
        }
    }

    /// The current state, for inspection by tests and the controller's
    /// "Talker ready" guard.
    pub fn state(&self) -> TalkerState {
        self.state
    }

    /// The Controller's gate for every command/data enqueue and for every
    /// management-line edge that follows a byte: the Talker is idle with
    /// nothing left queued behind it.
    pub fn is_ready(&self, fifo_is_empty: bool) -> bool {
        matches!(self.state, TalkerState::Idle) && fifo_is_empty
    }

    /// Runs one transition of the Talker FSM against the current bus
    /// snapshot, popping a byte from `fifo` and driving `pins` as needed.
    pub fn step<const N: usize>(
        &mut self,
        snapshot: BusSnapshot,
        fifo: &mut SendFifo<N>,
        pins: &mut impl GpibPins,
    ) {
        self.state = match self.state {
            TalkerState::Idle => match fifo.dequeue() {
                Some(queued) => {
                    pins.drive_dio(queued.byte);
                    TalkerState::WaitNdacAsserted { byte: queued }
                }
                None => TalkerState::Idle,
            },
            TalkerState::WaitNdacAsserted { byte } => {
                if snapshot.is_asserted(Line::Ndac) {
                    TalkerState::WaitNrfdReleased { byte }
                } else {
                    TalkerState::WaitNdacAsserted { byte }
                }
            }
            TalkerState::WaitNrfdReleased { byte } => {
                if !snapshot.is_asserted(Line::Nrfd) {
                    pins.assert(Line::Dav);
                    TalkerState::WaitNdacReleased { byte }
                } else {
                    TalkerState::WaitNrfdReleased { byte }
                }
            }
            TalkerState::WaitNdacReleased { byte } => {
                if !snapshot.is_asserted(Line::Ndac) {
                    pins.release(Line::Dav);
                    TalkerState::Idle
                } else {
                    TalkerState::WaitNdacReleased { byte }
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPins;

    #[test]
    fn full_handshake_returns_to_idle_and_drains_one_byte() {
        let mut talker = Talker::new();
        let mut fifo: SendFifo<4> = SendFifo::new();
        let mut pins = MockPins::new();
        fifo.enqueue(0xAA, false).unwrap();

        // idle -> wait_ndac_asserted: byte appears on DIO.
        talker.step(pins.snapshot(), &mut fifo, &mut pins);
        assert!(matches!(talker.state(), TalkerState::WaitNdacAsserted { .. }));
        assert_eq!(pins.snapshot().dio_byte(), 0xAA);
        assert_eq!(fifo.count(), 0);

        // listener asserts NDAC.
        pins.assert(Line::Ndac);
        talker.step(pins.snapshot(), &mut fifo, &mut pins);
        assert!(matches!(talker.state(), TalkerState::WaitNrfdReleased { .. }));

        // listener releases NRFD -> Talker asserts DAV.
        pins.release(Line::Nrfd);
        talker.step(pins.snapshot(), &mut fifo, &mut pins);
        assert!(matches!(talker.state(), TalkerState::WaitNdacReleased { .. }));
        assert!(pins.snapshot().is_asserted(Line::Dav));

        // listener releases NDAC -> Talker releases DAV, returns to idle.
        pins.release(Line::Ndac);
        talker.step(pins.snapshot(), &mut fifo, &mut pins);
        assert_eq!(talker.state(), TalkerState::Idle);
        assert!(!pins.snapshot().is_asserted(Line::Dav));
    }

    #[test]
    fn dav_never_asserted_while_nrfd_asserted() {
        let mut talker = Talker::new();
        let mut fifo: SendFifo<4> = SendFifo::new();
        let mut pins = MockPins::new();
        fifo.enqueue(0x01, false).unwrap();

        talker.step(pins.snapshot(), &mut fifo, &mut pins); // idle -> wait_ndac_asserted
        pins.assert(Line::Ndac);
        talker.step(pins.snapshot(), &mut fifo, &mut pins); // -> wait_nrfd_released

        // NRFD is still asserted: stepping must not assert DAV yet.
        talker.step(pins.snapshot(), &mut fifo, &mut pins);
        assert!(!pins.snapshot().is_asserted(Line::Dav));
        assert!(matches!(talker.state(), TalkerState::WaitNrfdReleased { .. }));
    }

    #[test]
    fn idle_with_empty_fifo_is_ready() {
        let talker = Talker::new();
        assert!(talker.is_ready(true));
        assert!(!talker.is_ready(false));
    }
}
