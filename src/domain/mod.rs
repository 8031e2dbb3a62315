//! Core domain types and logic.

pub mod error;
pub mod observation;
pub mod signal;
pub mod symbols;
pub mod window;
