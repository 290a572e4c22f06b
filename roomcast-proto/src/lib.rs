//! Shared protocol definitions for the roomcast relay and its socket adapter.

pub mod frame;
pub mod socket;
