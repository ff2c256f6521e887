//! Shared primitives used by all `perch` crates.
//!
//! This crate is intentionally minimal and dependency-light, so it can sit at the bottom of the
//! dependency graph: identifier aliases, the resource enumeration, the unified error model, and
//! the solve-time configuration bundle.

pub mod config;
pub mod error;
pub mod ids;
