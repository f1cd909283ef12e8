#![no_std]

// Shared logic for the altitude-triggered micro-meteorite collector.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware adapters live in the firmware and emulator
// crates and plug into the capability traits exposed by `collector`.

pub mod collector;
pub mod config;
pub mod sensors;
pub mod servo;
pub mod telemetry;
