//! Domain layer for the convergence engine
//!
//! Models, the state machine, collaborator ports and errors. Nothing here
//! performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
