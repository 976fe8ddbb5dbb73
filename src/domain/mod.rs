//! Core domain types and logic.

pub mod aggregate;
pub mod categories;
pub mod error;
pub mod evaluator;
pub mod indicator;
pub mod ohlcv;
pub mod regime;
pub mod scan;
pub mod settings;
pub mod snapshot;
pub mod strategy;
pub mod universe;
