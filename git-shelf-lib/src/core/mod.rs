//! Core algorithms and data structures.

pub mod config;
pub mod effects;
pub mod formatting;
pub mod shelf;
