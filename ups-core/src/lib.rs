#![no_std]

#[cfg(feature = "std")]
extern crate std;

// Flicker detection and escalation logic shared by the daemon and the emulator.
//
// Nothing in here sleeps, logs, or touches hardware. Callers own the clock and
// hand every collaborator in through the traits in `power` and `supervisor`.

pub mod detector;
pub mod policy;
pub mod power;
pub mod session;
pub mod supervisor;
pub mod telemetry;
pub mod time;
