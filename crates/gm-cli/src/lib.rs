//! gmash: share a shell over SSH
//!
//! Support code for the `gmash` binary: console output and local address
//! discovery.

pub mod address;
pub mod output;
