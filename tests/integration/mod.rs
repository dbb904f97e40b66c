//! Integration tests for the silo.
//!
//! Every test opens its own silo, in memory unless it is about persistence,
//! so tests never share state.

pub mod groups;
pub mod index_consistency;
pub mod patch;
pub mod replace;
pub mod search;
pub mod silo_crud;
pub mod uniqueness;
