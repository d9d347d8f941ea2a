//! Move and borrow checking for Skarn
//!
//! Tracks ownership per place, enforces shared-xor-mutable loans over
//! lexical scopes, and validates explicit destructor calls.

mod state;
mod check;

pub use check::{borrowcheck, BorrowChecker, BorrowResult};
pub use state::*;
