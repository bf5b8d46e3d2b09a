//! Testing utilities
//!
//! Mock producer transport implementations used by unit and integration
//! tests to exercise the connection registry and publish path without a
//! broker.

pub mod mocks;
