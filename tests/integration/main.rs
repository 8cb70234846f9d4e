//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem through
//! the full `PinHub` facade against the in-crate mock adapters. All tests
//! run on the host with no real hardware required.

mod eint_flow_tests;
mod gpio_flow_tests;
mod hal_adapter_tests;
mod pwm_flow_tests;
