//! Test harness for the domain mapper
//!
//! A [`TestHost`] wires the in-process state store and service registry
//! into a [`Host`](dm_core::Host) and captures every service call.

mod test_host;

pub use test_host::*;
