//! The outer transaction FSM ("Controller").
//!
//! Sequences INIT, WRITE, and LISTEN transactions by asserting/releasing
//! management lines (ATN, EOI, IFC, REN), enqueuing command and data bytes
//! into the [`Talker`]'s FIFO, and — while listening — performing its own
//! DAV/NRFD/NDAC handshake as an acceptor.
//!
//! # State ordering
//!
//! [`ControllerState`] is declared in exactly the order the LISTEN states
//! need: all LISTEN states eligible for the inactivity timeout
//! (`ListenSetupAddresses` through `ListenFinishByteHandshake`) are declared
//! before `ListenUnaddressStartAtn`, and `#[derive(PartialOrd, Ord)]`
//! compares fieldless enum variants by declaration order. That turns the
//! timeout guard into the single comparison `state < ListenUnaddressStartAtn`.
//! Do not reorder these variants without preserving that property.

use heapless::Vec;

use crate::bus::{self, elapsed_since, BusSnapshot, GpibPins, Line, MillisClock};
use crate::command::Command;
use crate::config;
use crate::error::GpibError;
use crate::fifo::SendFifo;
use crate::result::ReceiveBuffer;
use crate::talker::Talker;

/// The state of the Controller FSM.
///
/// See the module docs for why the declaration order here is load-bearing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControllerState {
    // --- LISTEN phase 1: configure the bus ---
    /// Assert ATN and run the addressing sequence for `target_address` as
    /// talker, `controller_address` as listener.
    ListenSetupAddresses,
    /// Release ATN; pre-assert NRFD and NDAC as acceptor.
    ListenBeginHandshake,
    // --- LISTEN phase 2: three-wire acceptor loop ---
    /// Release NRFD: ready to accept the next byte.
    ListenReadyForData,
    /// Wait for DAV asserted by the talker.
    ListenWaitForDav,
    /// Sample DIO, latch EOI, append to the receive buffer, ack the byte.
    ListenDataReceived,
    /// Wait for the talker to release DAV.
    ListenWaitForDavRelease,
    /// Re-arm NDAC; loop back for another byte unless EOI was seen.
    ListenFinishByteHandshake,
    // --- LISTEN phase 3: self-handshake to unaddress the talker ---
    /// Assert ATN and enqueue UNT (not timeout-eligible: self-driven).
    ListenUnaddressStartAtn,
    /// Release NRFD; wait for our own Talker to assert DAV.
    ListenUnaddressWaitForDav,
    /// Release NDAC; wait for our own Talker to release DAV.
    ListenUnaddressAck,
    /// Wait for the Talker to finish its 4-state cycle.
    ListenUnaddressWaitForIdle,
    /// Latch the result, release ATN/NRFD/NDAC.
    ListenUnaddressFinish,
    // --- WRITE ---
    /// Assert ATN and run the addressing sequence for `controller_address`
    /// as talker, `target_address` as listener.
    WriteSetupAddresses,
    /// Release ATN; enqueue every payload byte but the last.
    WriteSendBody,
    /// Assert EOI; enqueue the last payload byte.
    WriteSendFinalChar,
    /// Release EOI; drive DIO idle.
    WriteFinish,
    // --- INIT ---
    /// Assert IFC and stamp the pulse start time.
    InitIfcStart,
    /// Hold until the IFC pulse has lasted at least [`config::IFC_PULSE_MS`].
    InitIfcWait,
    /// Release IFC.
    InitIfcEnd,
    /// Assert REN and ATN.
    InitAssertRenAtn,
    /// Enqueue UNL.
    InitSendUnl,
    /// Enqueue UNT.
    InitSendUnt,
    /// Release ATN; drive DIO idle; commit `target_address`.
    InitFinish,
    /// Terminal state for any transaction; falls through to `Idle` on the
    /// next tick.
    Complete,
    /// Resting state; accepts a new command.
    Idle,
}

/// The outer transaction FSM. Owns the send FIFO, the [`Talker`], the
/// receive buffer, and the addressing cache, and exposes the
/// [`step`](Controller::step) entry point the bare-metal loop calls every
/// tick, plus [`enqueue_command`](Controller::enqueue_command) for the
/// external command parser.
pub struct Controller {
    state: ControllerState,
    talker: Talker,
    fifo: SendFifo<{ config::QUEUE_SIZE }>,
    receive: ReceiveBuffer<{ config::MAX_RECEIVE_LENGTH }>,
    controller_address: u8,
    target_address: Option<u8>,
    pending_init_target: u8,
    last_talker: u8,
    last_listener: u8,
    write_payload: Vec<u8, { config::MAX_WRITE_STRING_LENGTH }>,
    listen_deadline: u32,
    ifc_pulse_start: u32,
    eoi_seen: bool,
    last_error: Option<GpibError>,
}

impl Controller {
    /// Creates a new, idle controller addressed as `controller_address`
    /// (`0..=30`) on the bus.
    pub fn new(controller_address: u8) -> Result<Self, GpibError> {
        if controller_address > config::MAX_ADDRESS {
            return Err(GpibError::InvalidAddress(controller_address));
        }
        Ok(Self {
            state: ControllerState::Idle,
            talker: Talker::new(),
            fifo: SendFifo::new(),
            receive: ReceiveBuffer::new(),
            controller_address,
            target_address: None,
            pending_init_target: 0,
            last_talker: config::UNKNOWN_ADDRESS,
            last_listener: config::UNKNOWN_ADDRESS,
            write_payload: Vec::new(),
            listen_deadline: 0,
            ifc_pulse_start: 0,
            eoi_seen: false,
            last_error: None,
        })
    }

    /// The current FSM state, for tests and diagnostics.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Whether the controller is idle and ready to accept a new command.
    pub fn is_idle(&self) -> bool {
        self.state == ControllerState::Idle
    }

    /// The target address established by the most recent successful INIT,
    /// or `None` if no INIT has completed yet.
    pub fn target_address(&self) -> Option<u8> {
        self.target_address
    }

    /// Returns, without clearing, whether a LISTEN result is ready.
    pub fn has_result(&self) -> bool {
        self.receive.has_result()
    }

    /// Returns the bytes received by the most recent LISTEN and clears the
    /// result latch.
    pub fn take_result(&mut self) -> Vec<u8, { config::MAX_RECEIVE_LENGTH }> {
        self.receive.take_result()
    }

    /// Returns, without clearing, the last error reported during `step`.
    /// Errors reported synchronously from [`enqueue_command`](Self::enqueue_command)
    /// are returned directly by that call and never land here.
    pub fn last_error(&self) -> Option<GpibError> {
        self.last_error
    }

    /// Returns and clears the last error reported during `step`.
    pub fn take_last_error(&mut self) -> Option<GpibError> {
        self.last_error.take()
    }

    /// Validates and arms `cmd` as the next transaction. Rejected
    /// synchronously, with state unchanged, if the controller is not idle
    /// or the command fails validation (see [`Command::validate`]).
    pub fn enqueue_command(
        &mut self,
        cmd: Command<'_>,
        clock: &impl MillisClock,
    ) -> Result<(), GpibError> {
        if self.state != ControllerState::Idle {
            return Err(GpibError::NotIdle);
        }
        cmd.validate(self.target_address.is_some())?;

        match cmd {
            Command::Init(addr) => {
                self.pending_init_target = addr;
                self.state = ControllerState::InitIfcStart;
            }
            Command::Write(text) => {
                let trimmed = text.trim();
                self.write_payload.clear();
                // `validate` already checked the trimmed length fits.
                let _ = self.write_payload.extend_from_slice(trimmed.as_bytes());
                self.state = ControllerState::WriteSetupAddresses;
            }
            Command::Listen => {
                self.receive.reset();
                self.listen_deadline = clock.millis();
                self.state = ControllerState::ListenSetupAddresses;
            }
        }
        Ok(())
    }

    /// Runs one tick: snapshots the bus, runs one Controller transition,
    /// then one Talker transition, both against the same snapshot.
    pub fn step(&mut self, pins: &mut impl GpibPins, clock: &impl MillisClock) {
        let snapshot = pins.snapshot();
        self.step_controller(snapshot, pins, clock);
        self.talker.step(snapshot, &mut self.fifo, pins);
    }

    fn talker_ready(&self) -> bool {
        self.talker.is_ready(self.fifo.is_empty())
    }

    fn enqueue(&mut self, byte: u8, is_cmd: bool) {
        if let Err(e) = self.fifo.enqueue(byte, is_cmd) {
            self.last_error = Some(e);
        }
    }

    /// Enqueues UNL, UNT, MTA, MLA in order unless the bus is already
    /// configured as requested, then updates the addressing cache.
    /// The caller must have ATN asserted already and must not release it
    /// until the FIFO has drained.
    fn set_talker_listener(&mut self, talker_addr: u8, listener_addr: u8) {
        if talker_addr == self.last_talker && listener_addr == self.last_listener {
            return;
        }
        self.enqueue(bus::UNL, true);
        self.enqueue(bus::UNT, true);
        self.enqueue(bus::mta(talker_addr), true);
        self.enqueue(bus::mla(listener_addr), true);
        self.last_talker = talker_addr;
        self.last_listener = listener_addr;
    }

    fn step_controller(
        &mut self,
        snapshot: BusSnapshot,
        pins: &mut impl GpibPins,
        clock: &impl MillisClock,
    ) {
        // Cleanup states (>= ListenUnaddressStartAtn) are self-driven and
        // excluded from this check by construction: see module docs.
        if self.state < ControllerState::ListenUnaddressStartAtn
            && elapsed_since(clock.millis(), self.listen_deadline) > config::LISTEN_TIMEOUT_MS
        {
            self.last_error = Some(GpibError::ListenTimeout);
            pins.release(Line::Atn);
            self.state = ControllerState::ListenUnaddressFinish;
            return;
        }

        let talker_ready = self.talker_ready();

        self.state = match self.state {
            ControllerState::ListenSetupAddresses => {
                if talker_ready {
                    pins.assert(Line::Atn);
                    let target = self
                        .target_address
                        .expect("LISTEN armed without a valid target address");
                    self.set_talker_listener(target, self.controller_address);
                    ControllerState::ListenBeginHandshake
                } else {
                    ControllerState::ListenSetupAddresses
                }
            }
            ControllerState::ListenBeginHandshake => {
                if talker_ready {
                    pins.release(Line::Atn);
                    pins.assert(Line::Nrfd);
                    pins.assert(Line::Ndac);
                    self.eoi_seen = false;
                    ControllerState::ListenReadyForData
                } else {
                    ControllerState::ListenBeginHandshake
                }
            }
            ControllerState::ListenReadyForData => {
                pins.release(Line::Nrfd);
                ControllerState::ListenWaitForDav
            }
            ControllerState::ListenWaitForDav => {
                if snapshot.is_asserted(Line::Dav) {
                    ControllerState::ListenDataReceived
                } else {
                    ControllerState::ListenWaitForDav
                }
            }
            ControllerState::ListenDataReceived => {
                let data = snapshot.dio_byte();
                self.eoi_seen = snapshot.is_asserted(Line::Eoi);
                self.receive.push(data);
                pins.assert(Line::Nrfd);
                pins.release(Line::Ndac);
                ControllerState::ListenWaitForDavRelease
            }
            ControllerState::ListenWaitForDavRelease => {
                if !snapshot.is_asserted(Line::Dav) {
                    ControllerState::ListenFinishByteHandshake
                } else {
                    ControllerState::ListenWaitForDavRelease
                }
            }
            ControllerState::ListenFinishByteHandshake => {
                pins.assert(Line::Ndac);
                if self.eoi_seen {
                    ControllerState::ListenUnaddressStartAtn
                } else {
                    ControllerState::ListenReadyForData
                }
            }
            ControllerState::ListenUnaddressStartAtn => {
                if talker_ready {
                    pins.assert(Line::Atn);
                    self.enqueue(bus::UNT, true);
                    ControllerState::ListenUnaddressWaitForDav
                } else {
                    ControllerState::ListenUnaddressStartAtn
                }
            }
            ControllerState::ListenUnaddressWaitForDav => {
                pins.release(Line::Nrfd);
                if snapshot.is_asserted(Line::Dav) {
                    ControllerState::ListenUnaddressAck
                } else {
                    ControllerState::ListenUnaddressWaitForDav
                }
            }
            ControllerState::ListenUnaddressAck => {
                pins.release(Line::Ndac);
                if !snapshot.is_asserted(Line::Dav) {
                    ControllerState::ListenUnaddressWaitForIdle
                } else {
                    ControllerState::ListenUnaddressAck
                }
            }
            ControllerState::ListenUnaddressWaitForIdle => {
                if talker_ready {
                    ControllerState::ListenUnaddressFinish
                } else {
                    ControllerState::ListenUnaddressWaitForIdle
                }
            }
            ControllerState::ListenUnaddressFinish => {
                if talker_ready {
                    self.receive.mark_ready();
                    pins.release(Line::Atn);
                    pins.release(Line::Nrfd);
                    pins.release(Line::Ndac);
                    ControllerState::Complete
                } else {
                    ControllerState::ListenUnaddressFinish
                }
            }
            ControllerState::WriteSetupAddresses => {
                if talker_ready {
                    pins.assert(Line::Atn);
                    let target = self
                        .target_address
                        .expect("WRITE armed without a valid target address");
                    self.set_talker_listener(self.controller_address, target);
                    ControllerState::WriteSendBody
                } else {
                    ControllerState::WriteSetupAddresses
                }
            }
            ControllerState::WriteSendBody => {
                if talker_ready {
                    pins.release(Line::Atn);
                    let body_len = self.write_payload.len().saturating_sub(1);
                    for i in 0..body_len {
                        self.enqueue(self.write_payload[i], false);
                    }
                    ControllerState::WriteSendFinalChar
                } else {
                    ControllerState::WriteSendBody
                }
            }
            ControllerState::WriteSendFinalChar => {
                if talker_ready {
                    pins.assert(Line::Eoi);
                    if let Some(&last) = self.write_payload.last() {
                        self.enqueue(last, false);
                    }
                    ControllerState::WriteFinish
                } else {
                    ControllerState::WriteSendFinalChar
                }
            }
            ControllerState::WriteFinish => {
                if talker_ready {
                    pins.release(Line::Eoi);
                    pins.drive_dio(0x00);
                    ControllerState::Complete
                } else {
                    ControllerState::WriteFinish
                }
            }
            ControllerState::InitIfcStart => {
                pins.assert(Line::Ifc);
                self.ifc_pulse_start = clock.millis();
                ControllerState::InitIfcWait
            }
            ControllerState::InitIfcWait => {
                if elapsed_since(clock.millis(), self.ifc_pulse_start) >= config::IFC_PULSE_MS {
                    ControllerState::InitIfcEnd
                } else {
                    ControllerState::InitIfcWait
                }
            }
            ControllerState::InitIfcEnd => {
                pins.release(Line::Ifc);
                ControllerState::InitAssertRenAtn
            }
            ControllerState::InitAssertRenAtn => {
                pins.assert(Line::Ren);
                pins.assert(Line::Atn);
                ControllerState::InitSendUnl
            }
            ControllerState::InitSendUnl => {
                if talker_ready {
                    self.enqueue(bus::UNL, true);
                    ControllerState::InitSendUnt
                } else {
                    ControllerState::InitSendUnl
                }
            }
            ControllerState::InitSendUnt => {
                if talker_ready {
                    self.enqueue(bus::UNT, true);
                    ControllerState::InitFinish
                } else {
                    ControllerState::InitSendUnt
                }
            }
            ControllerState::InitFinish => {
                if talker_ready {
                    pins.release(Line::Atn);
                    pins.drive_dio(0x00);
                    self.target_address = Some(self.pending_init_target);
                    ControllerState::Complete
                } else {
                    ControllerState::InitFinish
                }
            }
            ControllerState::Complete => ControllerState::Idle,
            ControllerState::Idle => ControllerState::Idle,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClock, MockPins};

    fn run_until_idle(ctrl: &mut Controller, pins: &mut MockPins, clock: &MockClock, max_ticks: u32) {
        for _ in 0..max_ticks {
            if ctrl.is_idle() {
                return;
            }
            ctrl.step(pins, clock);
        }
        panic!("controller did not return to idle within {max_ticks} ticks");
    }

    #[test]
    fn init_sequence_reaches_idle_with_target_set() {
        let mut ctrl = Controller::new(0).unwrap();
        let mut pins = MockPins::new();
        let clock = MockClock::new();

        ctrl.enqueue_command(Command::Init(22), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);

        assert_eq!(ctrl.target_address(), Some(22));
        assert!(pins.snapshot().is_asserted(Line::Ren));
        assert!(!pins.snapshot().is_asserted(Line::Atn));
        assert_eq!(pins.snapshot().dio_byte(), 0x00);
    }

    #[test]
    fn init_is_idempotent() {
        let mut ctrl = Controller::new(0).unwrap();
        let mut pins = MockPins::new();
        let clock = MockClock::new();

        ctrl.enqueue_command(Command::Init(22), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        let first = pins.snapshot();
        assert!(!ctrl.has_result());

        ctrl.enqueue_command(Command::Init(22), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        let second = pins.snapshot();

        assert_eq!(first.is_asserted(Line::Ren), second.is_asserted(Line::Ren));
        assert_eq!(first.is_asserted(Line::Atn), second.is_asserted(Line::Atn));
        assert!(!ctrl.has_result());
    }

    #[test]
    fn write_reuses_cached_addressing_for_same_target() {
        let mut ctrl = Controller::new(0).unwrap();
        let mut pins = MockPins::new();
        let clock = MockClock::new();

        ctrl.enqueue_command(Command::Init(22), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        pins.drain_command_bytes(); // discard INIT's own UNL/UNT

        ctrl.enqueue_command(Command::Write("X"), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        let first_cmd_bytes = pins.drain_command_bytes();
        assert_eq!(first_cmd_bytes, [0x3F, 0x5F, 0x40, 22 | 0x20]);

        ctrl.enqueue_command(Command::Write("X"), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        let second_cmd_bytes = pins.drain_command_bytes();
        assert!(
            second_cmd_bytes.is_empty(),
            "cache hit must enqueue zero addressing bytes"
        );
    }

    #[test]
    fn write_readdresses_for_a_different_target() {
        let mut ctrl = Controller::new(0).unwrap();
        let mut pins = MockPins::new();
        let clock = MockClock::new();

        ctrl.enqueue_command(Command::Init(22), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        ctrl.enqueue_command(Command::Write("X"), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        pins.drain_command_bytes();

        ctrl.enqueue_command(Command::Init(5), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);
        pins.drain_command_bytes(); // discard the second INIT's own UNL/UNT
        ctrl.enqueue_command(Command::Write("Y"), &clock).unwrap();
        run_until_idle(&mut ctrl, &mut pins, &clock, 100);

        let cmd_bytes = pins.drain_command_bytes();
        assert_eq!(cmd_bytes, [0x3F, 0x5F, 0x40, 5 | 0x20]);
    }

    #[test]
    fn command_rejected_while_a_transaction_is_in_progress() {
        let mut ctrl = Controller::new(0).unwrap();
        let clock = MockClock::new();
        ctrl.enqueue_command(Command::Init(22), &clock).unwrap();
        assert_eq!(
            ctrl.enqueue_command(Command::Init(1), &clock),
            Err(GpibError::NotIdle)
        );
    }
}
