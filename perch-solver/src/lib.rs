//! Constraint model construction and deterministic search.
//!
//! This crate exposes a CP-SAT-shaped surface: a [`CpModel`] grows integer variables over
//! finite domains, literals, intervals, and a fixed family of constraints, then
//! [`CpModel::solve`] runs a propagate-and-branch search (branch-and-bound when the model
//! carries a minimization objective) under a wall-clock limit. The search is fully
//! deterministic: identical models produce identical responses.

pub mod domain;
pub mod model;
pub mod search;

pub use domain::Domain;
pub use model::{CpModel, IntVar, Interval, LinearExpr, Literal, ModelError};
pub use search::{Solution, SolveParams, SolveResponse, SolveStats, SolveStatus};
