//! stockscan: rule-based stock screener.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod diagnostics;
pub mod domain;
pub mod logging;
pub mod ports;
