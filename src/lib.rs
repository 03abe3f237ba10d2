//! EchoNode library — portable ultrasonic ranging engine.
//!
//! Times HC-SR04 style echo pulses from an edge interrupt, turns them into
//! distances, keeps the ones inside the trusted proximity band, and reports
//! each as a sequenced crossing event to a local log and a remote collector.
//! Several nodes with distinct device ids feed one collector, which does the
//! cross-node correlation.
//!
//! Everything here is `no_std`, allocation-free and testable on any host with
//! `cargo test`. The firmware binaries (Embassy in `src/main.rs`, ESP-IDF in
//! `firmware-std/`) are thin consumers that provide the GPIO interrupt, the
//! trigger pin, the clock and the TCP link.
//!
//! Module layering, leaves first:
//! - `capture` — interrupt-side echo edge capture
//! - `ranging` — pulse width to distance, range filter
//! - `cycle` — trigger / await / timeout state machine
//! - `emitter` — sequence numbers, local + remote records
//! - `node` — node context tying the above together, run statistics
//! - `protocol`, `comm` — wire records, formatting, collector-side parsing
//! - `collector` — per-connection collector session (id check, wrap widening)
//! - `config`, `board`, `defaults`, `error` — ambient plumbing

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod capture;
pub mod collector;
pub mod comm;
pub mod config;
pub mod cycle;
pub mod defaults;
pub mod emitter;
pub mod error;
pub mod node;
pub mod protocol;
pub mod ranging;

#[cfg(test)]
mod testing;
