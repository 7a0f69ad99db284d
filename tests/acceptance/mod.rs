//! Integration tests for scan driver acceptance testing.

mod common;
mod config_test;
mod debug_bridge_test;
mod lifecycle_test;
mod overrun_test;
mod timing_test;
