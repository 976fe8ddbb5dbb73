//! Port traits: the seams between the scan engine and the outside world.

pub mod config_port;
pub mod price_port;
pub mod sink_port;
pub mod universe_port;
