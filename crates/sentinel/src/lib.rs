//! Baseline Sentinel daemon
//!
//! HTTP surface and wiring shared by the `baseline-sentinel` binary and its
//! integration tests.

pub mod api;
