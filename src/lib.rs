//! meanrev: mean-reversion signals over daily equity closes.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], command-line wrapper in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
