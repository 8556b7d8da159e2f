//! rstrader: relative-strength rotation trader.
//!
//! Hexagonal architecture: signal, ranking and rotation logic in [`domain`],
//! collaborator traits in [`ports`], concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
