//! Capture parsing and flow analysis.
//! Packet sizes and timing only; payload contents are never inspected.
pub mod containers;
pub mod core;
pub mod fingerprint;
pub mod flows;
pub mod pcap;
pub mod utils;
