//! Refinement-aware type checking for Skarn
//!
//! Assigns every expression a canonical type, checks call/assignment/return
//! compatibility, and statically proves the four hazard classes impossible:
//! division/modulo by zero, integer overflow on constant folds, array index
//! out of bounds, and unguarded nullable pointer access.

mod check;
mod types;

pub use check::{typecheck, typecheck_with, TypeChecker, TypeOptions, TypeResult};
pub use types::*;
