//! Domain types for the ventilator task distribution system.
//!
//! Pure data, validation and effort generation. Nothing in this crate
//! spawns tasks or touches channels; that lives in `ventilator-worker`.

pub mod config;
pub mod effort;
pub mod error;
pub mod summary;
pub mod task;
pub mod types;
