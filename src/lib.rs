//! A bit-banged driver for the IEEE-488 (GPIB) instrumentation bus.
//!
//! This crate implements the two-level cooperative state machine that drives
//! a GPIB bus as the sole System Controller: a byte-level [`Talker`](talker::Talker)
//! handshake FSM, and an outer [`Controller`](controller::Controller) FSM that
//! sequences INIT / WRITE / LISTEN transactions on top of it.
//!
//! Nothing in this crate blocks or owns an interrupt: [`GpibController::step`]
//! is meant to be called repeatedly from a bare-metal main loop (or any other
//! cooperative scheduler) alongside other work. Every wait is expressed as a
//! state that re-checks its guard predicate on the next call.
//!
//! The GPIO driver, the monotonic time source, and the text command parser
//! that would normally sit in front of this crate are all external
//! collaborators, represented here by the [`GpibPins`](bus::GpibPins) and
//! [`MillisClock`](bus::MillisClock) traits and the [`Command`](command::Command)
//! enum.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod bus;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod fifo;
pub mod result;
pub mod talker;

#[cfg(test)]
pub mod mock;

pub use bus::{GpibPins, Line, MillisClock};
pub use command::Command;
pub use controller::Controller as GpibController;
pub use error::GpibError;
